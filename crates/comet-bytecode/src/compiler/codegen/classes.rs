//! Class lowering.
//!
//! Instance fields hoist into a single synthetic per-class initializer
//! function, invoked once per construction: at constructor entry in base
//! classes, right after `super()` in derived ones. Static fields evaluate
//! against the class object once it exists. Methods attach after the class
//! object is created, so method bodies close over the finished prototype.

use crate::Error;
use crate::ast;

use super::{Compiler, compile_function_record};
use super::super::bytecode::{Op, PropertyKind};
use super::super::ir::{FunctionInfo, RECEIVER_SLOT};

fn property_kind(kind: ast::MethodKind) -> PropertyKind {
    match kind {
        ast::MethodKind::Method => PropertyKind::Method,
        ast::MethodKind::Getter => PropertyKind::Getter,
        ast::MethodKind::Setter => PropertyKind::Setter,
    }
}

impl Compiler {
    /// Lowers a class expression or declaration body, leaving the class
    /// object on the stack.
    pub(super) fn compile_class(&mut self, class: &ast::Class) -> Result<(), Error> {
        let has_parent = class.parent.is_some();
        if let Some(parent) = &class.parent {
            self.compile_expression(parent)?;
        }

        let instance_fields: Vec<(&ast::PropertyKey, &Option<ast::Expression>)> = class
            .members
            .iter()
            .filter_map(|member| match member {
                ast::ClassMember::Field {
                    is_static: false,
                    key,
                    value,
                } => Some((key, value)),
                _ => None,
            })
            .collect();
        let field_init = if instance_fields.is_empty() {
            None
        } else {
            let info = build_field_initializer(&instance_fields)?;
            Some(self.b.add_inner(info))
        };

        let ctor_info = match &class.constructor {
            Some(ctor) => compile_function_record(ctor, field_init.is_some() && !has_parent)?,
            None => build_default_constructor(class, has_parent, field_init.is_some())?,
        };
        let ctor = self.b.add_inner(ctor_info);

        self.b.emit(Op::CreateClass {
            ctor,
            field_init,
            has_parent,
        })?;

        for member in &class.members {
            match member {
                ast::ClassMember::Method {
                    kind,
                    is_static,
                    key,
                    function,
                } => {
                    let kind = property_kind(*kind);
                    match key {
                        ast::PropertyKey::Identifier(name) | ast::PropertyKey::String(name) => {
                            let name = self.b.string_constant(name);
                            let index = self.compile_inner_function(function)?;
                            self.b.emit(Op::Closure(index))?;
                            self.b.emit(Op::DefineMethod {
                                name,
                                kind,
                                is_static: *is_static,
                            })?;
                        }
                        ast::PropertyKey::Number(n) => {
                            let index = self.b.number_constant(*n);
                            self.b.emit(Op::LoadConst(index))?;
                            let function = self.compile_inner_function(function)?;
                            self.b.emit(Op::Closure(function))?;
                            self.b.emit(Op::DefineMethodDyn {
                                kind,
                                is_static: *is_static,
                            })?;
                        }
                        ast::PropertyKey::Computed(key) => {
                            self.compile_expression(key)?;
                            let function = self.compile_inner_function(function)?;
                            self.b.emit(Op::Closure(function))?;
                            self.b.emit(Op::DefineMethodDyn {
                                kind,
                                is_static: *is_static,
                            })?;
                        }
                    }
                }
                ast::ClassMember::Field {
                    is_static: true,
                    key,
                    value,
                } => {
                    self.b.emit(Op::Dup)?;
                    match key {
                        ast::PropertyKey::Identifier(name) | ast::PropertyKey::String(name) => {
                            let name = self.b.string_constant(name);
                            self.compile_field_value(value)?;
                            self.b.emit(Op::SetProp(name))?;
                        }
                        ast::PropertyKey::Number(n) => {
                            let index = self.b.number_constant(*n);
                            self.b.emit(Op::LoadConst(index))?;
                            self.compile_field_value(value)?;
                            self.b.emit(Op::SetPropDyn)?;
                        }
                        ast::PropertyKey::Computed(key) => {
                            self.compile_expression(key)?;
                            self.compile_field_value(value)?;
                            self.b.emit(Op::SetPropDyn)?;
                        }
                    }
                    self.b.emit(Op::Pop)?;
                }
                // instance fields live in the synthetic initializer
                ast::ClassMember::Field { is_static: false, .. } => {}
            }
        }
        Ok(())
    }

    fn compile_field_value(&mut self, value: &Option<ast::Expression>) -> Result<(), Error> {
        match value {
            Some(value) => self.compile_expression(value),
            None => self.b.emit(Op::LoadUndefined),
        }
    }
}

/// Builds the synthetic instance-field initializer: each field stores into
/// the receiver, in declaration order.
fn build_field_initializer(
    fields: &[(&ast::PropertyKey, &Option<ast::Expression>)],
) -> Result<FunctionInfo, Error> {
    let mut c = Compiler::new(0, 0, false);
    for &(key, value) in fields {
        c.b.emit(Op::LoadLocal(RECEIVER_SLOT))?;
        match key {
            ast::PropertyKey::Identifier(name) | ast::PropertyKey::String(name) => {
                let name = c.b.string_constant(name);
                c.compile_field_value(value)?;
                c.b.emit(Op::SetProp(name))?;
            }
            ast::PropertyKey::Number(n) => {
                let index = c.b.number_constant(*n);
                c.b.emit(Op::LoadConst(index))?;
                c.compile_field_value(value)?;
                c.b.emit(Op::SetPropDyn)?;
            }
            ast::PropertyKey::Computed(_) => {
                // class-definition-time key evaluation is not modeled
                return Err(Error::Unsupported("computed instance field names".into()));
            }
        }
        c.b.emit(Op::Pop)?;
    }
    c.emit_default_return()?;
    Ok(FunctionInfo {
        name: None,
        program: c.finish()?,
        is_strict: true,
        param_count: 0,
        is_script: false,
    })
}

/// The implicit constructor: a derived class forwards its arguments to the
/// parent; both shapes run the field initializer when one exists.
fn build_default_constructor(
    class: &ast::Class,
    has_parent: bool,
    has_fields: bool,
) -> Result<FunctionInfo, Error> {
    let mut c = Compiler::new(0, 0, false);
    if has_parent {
        c.b.emit(Op::LoadArguments)?;
        c.b.emit(Op::CallSuperVarargs)?;
        c.b.emit(Op::StoreLocal(RECEIVER_SLOT))?;
    }
    if has_fields {
        c.b.emit(Op::InitInstanceFields)?;
    }
    c.emit_default_return()?;
    Ok(FunctionInfo {
        name: class.name.clone(),
        program: c.finish()?,
        is_strict: true,
        param_count: 0,
        is_script: false,
    })
}
