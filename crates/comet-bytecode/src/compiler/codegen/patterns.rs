//! Destructuring lowering.
//!
//! Array patterns drive the iteration protocol (`IteratorNext` plus named
//! reads of `done` and `value`); object patterns read named properties and,
//! when a rest element is present, collect the already-consumed keys into an
//! exclusion array that `CopyDataProperties` skips. Defaults apply only when
//! the extracted value is exactly undefined.

use crate::Error;
use crate::ast;

use super::Compiler;
use super::super::bytecode::Op;
use super::super::ir::SlotKind;

impl Compiler {
    /// Consumes the value on top of the stack, binding it to the pattern.
    pub(super) fn compile_pattern_assign(&mut self, pattern: &ast::Pattern) -> Result<(), Error> {
        match pattern {
            ast::Pattern::Identifier(var) => self.store_var(var),
            ast::Pattern::Array(array) => self.compile_array_pattern(array),
            ast::Pattern::Object(object) => self.compile_object_pattern(object),
        }
    }

    /// Replaces the value on top of the stack with the default when it is
    /// exactly undefined.
    pub(super) fn compile_default(&mut self, default: &ast::Expression) -> Result<(), Error> {
        self.b.emit(Op::Dup)?;
        self.b.emit(Op::LoadUndefined)?;
        self.b.emit(Op::StrictEq)?;
        self.if_true_helper(|c| {
            c.b.emit(Op::Pop)?;
            c.compile_expression(default)
        })
    }

    fn compile_array_pattern(&mut self, pattern: &ast::ArrayPattern) -> Result<(), Error> {
        let done_name = self.b.string_constant("done");
        let value_name = self.b.string_constant("value");
        self.b.emit(Op::GetIterator)?;
        for element in &pattern.elements {
            self.b.emit(Op::IteratorNext)?;
            match element {
                // elision hole: advance the iterator, drop the step
                None => self.b.emit(Op::Pop)?,
                Some(element) => {
                    self.b.emit(Op::Dup)?;
                    self.b.emit(Op::GetProp(done_name))?;
                    // an exhausted iterator binds undefined
                    self.if_else_helper(
                        |c| {
                            c.b.emit(Op::Pop)?;
                            c.b.emit(Op::LoadUndefined)
                        },
                        |c| c.b.emit(Op::GetProp(value_name)),
                    )?;
                    if let Some(default) = &element.default {
                        self.compile_default(default)?;
                    }
                    self.compile_pattern_assign(&element.pattern)?;
                }
            }
        }
        match &pattern.rest {
            Some(rest) => {
                self.b.emit(Op::NewArray(0))?;
                self.b.emit(Op::Swap)?;
                self.drain_iterator()?;
                self.compile_pattern_assign(rest)
            }
            None => self.b.emit(Op::Pop),
        }
    }

    fn compile_object_pattern(&mut self, pattern: &ast::ObjectPattern) -> Result<(), Error> {
        // rest needs the consumed keys; collect them as the walk goes
        let excluded = match &pattern.rest {
            Some(_) => {
                let slot = self.b.new_local_slot(SlotKind::Value);
                self.b.emit(Op::NewArray(0))?;
                self.b.emit(Op::StoreLocal(slot))?;
                Some(slot)
            }
            None => None,
        };

        for property in &pattern.properties {
            self.b.emit(Op::Dup)?;
            match &property.key {
                ast::PropertyKey::Identifier(name) | ast::PropertyKey::String(name) => {
                    let name = self.b.string_constant(name);
                    self.b.emit(Op::GetProp(name))?;
                    if let Some(slot) = excluded {
                        self.b.emit(Op::LoadLocal(slot))?;
                        self.b.emit(Op::LoadConst(name))?;
                        self.b.emit(Op::Append)?;
                        self.b.emit(Op::Pop)?;
                    }
                }
                ast::PropertyKey::Number(n) => {
                    let index = self.b.number_constant(*n);
                    self.b.emit(Op::LoadConst(index))?;
                    if let Some(slot) = excluded {
                        self.record_excluded_key(slot)?;
                    }
                    self.b.emit(Op::GetPropDyn)?;
                }
                ast::PropertyKey::Computed(key) => {
                    self.compile_expression(key)?;
                    if let Some(slot) = excluded {
                        self.record_excluded_key(slot)?;
                    }
                    self.b.emit(Op::GetPropDyn)?;
                }
            }
            if let Some(default) = &property.default {
                self.compile_default(default)?;
            }
            self.compile_pattern_assign(&property.value)?;
        }

        match &pattern.rest {
            Some(rest) => {
                let slot = excluded.expect("exclusion array allocated above");
                self.b.emit(Op::NewObject)?;
                self.b.emit(Op::Swap)?;
                self.b.emit(Op::LoadLocal(slot))?;
                self.b.emit(Op::CopyDataProperties)?;
                self.compile_pattern_assign(rest)
            }
            None => self.b.emit(Op::Pop),
        }
    }

    /// Appends the key on top of the stack to the exclusion array, leaving
    /// the key in place.
    fn record_excluded_key(&mut self, slot: u16) -> Result<(), Error> {
        self.b.emit(Op::Dup)?;
        self.b.emit(Op::LoadLocal(slot))?;
        self.b.emit(Op::Swap)?;
        self.b.emit(Op::Append)?;
        self.b.emit(Op::Pop)
    }
}
