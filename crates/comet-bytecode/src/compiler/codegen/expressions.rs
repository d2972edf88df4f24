//! Expression compilation.
//!
//! Every method leaves exactly one value on the operand stack. Targets of
//! assignments and updates are evaluated once: the object reference (and
//! computed key) are duplicated beneath the computed value rather than
//! re-evaluated, since re-running a target with side effects would be
//! observable.

use crate::Error;
use crate::ast;

use super::Compiler;
use super::super::bytecode::{Const, Op};
use super::super::ir::{NEW_TARGET_SLOT, RECEIVER_SLOT, SlotKind};

fn has_spread(arguments: &[ast::Argument]) -> bool {
    arguments
        .iter()
        .any(|argument| matches!(argument, ast::Argument::Spread(_)))
}

impl Compiler {
    pub(super) fn compile_expression(&mut self, expression: &ast::Expression) -> Result<(), Error> {
        match expression {
            ast::Expression::Literal(literal) => self.compile_literal(literal),
            ast::Expression::Identifier(var) => self.load_var(var),
            ast::Expression::This => self.b.emit(Op::LoadLocal(RECEIVER_SLOT)),
            ast::Expression::NewTarget => self.b.emit(Op::LoadLocal(NEW_TARGET_SLOT)),
            ast::Expression::Array(array) => self.compile_array(array),
            ast::Expression::Object(object) => self.compile_object(object),
            ast::Expression::Function(function) => {
                let index = self.compile_inner_function(function)?;
                self.b.emit(Op::Closure(index))
            }
            ast::Expression::Class(class) => self.compile_class(class),
            ast::Expression::Unary(unary) => self.compile_unary(unary),
            ast::Expression::Update(update) => self.compile_update(update),
            ast::Expression::Binary(binary) => self.compile_binary(binary),
            ast::Expression::Logical(logical) => self.compile_logical(logical),
            ast::Expression::Assignment(assignment) => self.compile_assignment(assignment),
            ast::Expression::Conditional(conditional) => self.compile_conditional(conditional),
            ast::Expression::Call(call) => self.compile_call(call),
            ast::Expression::New(new) => self.compile_new(new),
            ast::Expression::SuperCall(arguments) => self.compile_super_call(arguments),
            ast::Expression::Member(member) => {
                self.compile_expression(&member.object)?;
                self.compile_property_get(&member.property)
            }
            ast::Expression::Sequence(expressions) => self.compile_sequence(expressions),
            ast::Expression::Yield(yield_expr) => {
                if !self.suspends {
                    return Err(Error::Unsupported("yield outside a generator".into()));
                }
                if yield_expr.delegate {
                    return Err(Error::Unsupported("yield* delegation".into()));
                }
                self.compile_suspend(yield_expr.argument.as_deref(), false)
            }
            ast::Expression::Await(argument) => {
                if !self.suspends {
                    return Err(Error::Unsupported("await outside an async function".into()));
                }
                self.compile_suspend(Some(argument), true)
            }
        }
    }

    // ========================================================================
    // Variables and literals
    // ========================================================================

    pub(super) fn load_var(&mut self, var: &ast::VarRef) -> Result<(), Error> {
        match &var.binding {
            ast::Binding::Local(index) => {
                let slot = self.b.local_slot(*index);
                self.b.emit(Op::LoadLocal(slot))
            }
            ast::Binding::Env { index, depth } => self.b.emit(Op::LoadEnv {
                index: *index,
                depth: *depth,
            }),
            ast::Binding::Global => {
                let name = self.b.string_constant(&var.name);
                self.b.emit(Op::LoadGlobal(name))
            }
        }
    }

    pub(super) fn store_var(&mut self, var: &ast::VarRef) -> Result<(), Error> {
        match &var.binding {
            ast::Binding::Local(index) => {
                let slot = self.b.local_slot(*index);
                self.b.emit(Op::StoreLocal(slot))
            }
            ast::Binding::Env { index, depth } => self.b.emit(Op::StoreEnv {
                index: *index,
                depth: *depth,
            }),
            ast::Binding::Global => {
                let name = self.b.string_constant(&var.name);
                self.b.emit(Op::StoreGlobal(name))
            }
        }
    }

    fn compile_literal(&mut self, literal: &ast::Literal) -> Result<(), Error> {
        match literal {
            ast::Literal::Number(n) => {
                let index = self.b.number_constant(*n);
                self.b.emit(Op::LoadConst(index))
            }
            ast::Literal::String(s) => {
                let index = self.b.string_constant(s);
                self.b.emit(Op::LoadConst(index))
            }
            ast::Literal::Boolean(true) => self.b.emit(Op::LoadTrue),
            ast::Literal::Boolean(false) => self.b.emit(Op::LoadFalse),
            ast::Literal::Null => self.b.emit(Op::LoadNull),
            ast::Literal::Undefined => self.b.emit(Op::LoadUndefined),
            ast::Literal::BigInt(value) => {
                let index = self.b.add_constant(Const::BigInt(value.clone()));
                self.b.emit(Op::LoadConst(index))
            }
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn compile_unary(&mut self, unary: &ast::UnaryExpression) -> Result<(), Error> {
        if unary.operator == ast::UnaryOperator::Delete {
            if let ast::Expression::Member(member) = unary.argument.as_ref() {
                self.compile_expression(&member.object)?;
                return match &member.property {
                    ast::MemberProperty::Identifier(name) => {
                        let name = self.b.string_constant(name);
                        self.b.emit(Op::DeleteProp(name))
                    }
                    ast::MemberProperty::Computed(key) => {
                        self.compile_expression(key)?;
                        self.b.emit(Op::DeletePropDyn)
                    }
                };
            }
            // deleting a non-reference evaluates the operand and yields true
            self.compile_expression(&unary.argument)?;
            self.b.emit(Op::Pop)?;
            return self.b.emit(Op::LoadTrue);
        }

        self.compile_expression(&unary.argument)?;
        match unary.operator {
            ast::UnaryOperator::Minus => self.b.emit(Op::Neg),
            ast::UnaryOperator::Plus => self.b.emit(Op::ToNumber),
            ast::UnaryOperator::LogicalNot => self.b.emit(Op::Not),
            ast::UnaryOperator::BitwiseNot => self.b.emit(Op::BitNot),
            ast::UnaryOperator::Typeof => self.b.emit(Op::TypeOf),
            ast::UnaryOperator::Void => {
                self.b.emit(Op::Pop)?;
                self.b.emit(Op::LoadUndefined)
            }
            ast::UnaryOperator::Delete => unreachable!("handled above"),
        }
    }

    fn compile_binary(&mut self, binary: &ast::BinaryExpression) -> Result<(), Error> {
        self.compile_expression(&binary.left)?;
        self.compile_expression(&binary.right)?;
        let op = match binary.operator {
            ast::BinaryOperator::Add => Op::Add,
            ast::BinaryOperator::Sub => Op::Sub,
            ast::BinaryOperator::Mul => Op::Mul,
            ast::BinaryOperator::Div => Op::Div,
            ast::BinaryOperator::Mod => Op::Mod,
            ast::BinaryOperator::Pow => Op::Pow,
            ast::BinaryOperator::Eq => Op::Eq,
            ast::BinaryOperator::Ne => Op::Ne,
            ast::BinaryOperator::StrictEq => Op::StrictEq,
            ast::BinaryOperator::StrictNe => Op::StrictNe,
            ast::BinaryOperator::Lt => Op::Lt,
            ast::BinaryOperator::Le => Op::Le,
            ast::BinaryOperator::Gt => Op::Gt,
            ast::BinaryOperator::Ge => Op::Ge,
            ast::BinaryOperator::BitAnd => Op::BitAnd,
            ast::BinaryOperator::BitOr => Op::BitOr,
            ast::BinaryOperator::BitXor => Op::BitXor,
            ast::BinaryOperator::Shl => Op::Shl,
            ast::BinaryOperator::Shr => Op::Shr,
            ast::BinaryOperator::Ushr => Op::Ushr,
            ast::BinaryOperator::InstanceOf => Op::InstanceOf,
            ast::BinaryOperator::In => Op::In,
        };
        self.b.emit(op)
    }

    /// Short-circuit lowering: the left operand is duplicated, the branch
    /// decides on the duplicate, and the taken path pops it before the
    /// right operand is evaluated. The right operand never runs eagerly.
    fn compile_logical(&mut self, logical: &ast::LogicalExpression) -> Result<(), Error> {
        self.compile_expression(&logical.left)?;
        self.b.emit(Op::Dup)?;
        match logical.operator {
            ast::LogicalOperator::And => self.if_true_helper(|c| {
                c.b.emit(Op::Pop)?;
                c.compile_expression(&logical.right)
            }),
            ast::LogicalOperator::Or => self.if_false_helper(|c| {
                c.b.emit(Op::Pop)?;
                c.compile_expression(&logical.right)
            }),
            ast::LogicalOperator::Nullish => {
                // null == undefined, and nothing else (ES2020 Section 13.13)
                self.b.emit(Op::LoadNull)?;
                self.b.emit(Op::Eq)?;
                self.if_true_helper(|c| {
                    c.b.emit(Op::Pop)?;
                    c.compile_expression(&logical.right)
                })
            }
        }
    }

    fn compile_conditional(&mut self, conditional: &ast::ConditionalExpression) -> Result<(), Error> {
        self.compile_expression(&conditional.test)?;
        self.if_else_helper(
            |c| c.compile_expression(&conditional.consequent),
            |c| c.compile_expression(&conditional.alternate),
        )
    }

    fn compile_update(&mut self, update: &ast::UpdateExpression) -> Result<(), Error> {
        let step = match update.operator {
            ast::UpdateOperator::Increment => Op::Add,
            ast::UpdateOperator::Decrement => Op::Sub,
        };
        match &update.target {
            ast::UpdateTarget::Identifier(var) => {
                self.load_var(var)?;
                self.b.emit(Op::ToNumber)?;
                let one = self.b.number_constant(1.0);
                if update.prefix {
                    self.b.emit(Op::LoadConst(one))?;
                    self.b.emit(step)?;
                    self.b.emit(Op::Dup)?;
                    self.store_var(var)
                } else {
                    // the converted old value is the expression's result
                    self.b.emit(Op::Dup)?;
                    self.b.emit(Op::LoadConst(one))?;
                    self.b.emit(step)?;
                    self.store_var(var)
                }
            }
            ast::UpdateTarget::Member(member) => self.compile_member_update(member, step, update.prefix),
        }
    }

    /// `obj.p++` and friends: the object (and computed key) are duplicated
    /// beneath the computed value, so the target is evaluated exactly once.
    fn compile_member_update(
        &mut self,
        member: &ast::MemberExpression,
        step: Op,
        prefix: bool,
    ) -> Result<(), Error> {
        self.compile_expression(&member.object)?;
        let one = self.b.number_constant(1.0);
        match &member.property {
            ast::MemberProperty::Identifier(name) => {
                let name = self.b.string_constant(name);
                self.b.emit(Op::Dup)?;
                self.b.emit(Op::GetProp(name))?;
                self.b.emit(Op::ToNumber)?;
                if prefix {
                    self.b.emit(Op::LoadConst(one))?;
                    self.b.emit(step)?;
                    self.b.emit(Op::SetProp(name))
                } else {
                    let old = self.b.new_local_slot(SlotKind::Number);
                    self.b.emit(Op::Dup)?;
                    self.b.emit(Op::StoreLocal(old))?;
                    self.b.emit(Op::LoadConst(one))?;
                    self.b.emit(step)?;
                    self.b.emit(Op::SetProp(name))?;
                    self.b.emit(Op::Pop)?;
                    self.b.emit(Op::LoadLocal(old))
                }
            }
            ast::MemberProperty::Computed(key) => {
                self.compile_expression(key)?;
                self.b.emit(Op::Dup2)?;
                self.b.emit(Op::GetPropDyn)?;
                self.b.emit(Op::ToNumber)?;
                if prefix {
                    self.b.emit(Op::LoadConst(one))?;
                    self.b.emit(step)?;
                    self.b.emit(Op::SetPropDyn)
                } else {
                    let old = self.b.new_local_slot(SlotKind::Number);
                    self.b.emit(Op::Dup)?;
                    self.b.emit(Op::StoreLocal(old))?;
                    self.b.emit(Op::LoadConst(one))?;
                    self.b.emit(step)?;
                    self.b.emit(Op::SetPropDyn)?;
                    self.b.emit(Op::Pop)?;
                    self.b.emit(Op::LoadLocal(old))
                }
            }
        }
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    fn compile_assignment(&mut self, assignment: &ast::AssignmentExpression) -> Result<(), Error> {
        match assignment.operator {
            ast::AssignmentOperator::Assign => self.compile_plain_assignment(assignment),
            ast::AssignmentOperator::And
            | ast::AssignmentOperator::Or
            | ast::AssignmentOperator::Nullish => self.compile_logical_assignment(assignment),
            _ => self.compile_compound_assignment(assignment),
        }
    }

    fn compile_plain_assignment(&mut self, assignment: &ast::AssignmentExpression) -> Result<(), Error> {
        match &assignment.target {
            ast::AssignmentTarget::Identifier(var) => {
                self.compile_expression(&assignment.value)?;
                self.b.emit(Op::Dup)?;
                self.store_var(var)
            }
            ast::AssignmentTarget::Member(member) => {
                self.compile_expression(&member.object)?;
                match &member.property {
                    ast::MemberProperty::Identifier(name) => {
                        let name = self.b.string_constant(name);
                        self.compile_expression(&assignment.value)?;
                        self.b.emit(Op::SetProp(name))
                    }
                    ast::MemberProperty::Computed(key) => {
                        self.compile_expression(key)?;
                        self.compile_expression(&assignment.value)?;
                        self.b.emit(Op::SetPropDyn)
                    }
                }
            }
            ast::AssignmentTarget::Pattern(pattern) => {
                self.compile_expression(&assignment.value)?;
                self.b.emit(Op::Dup)?;
                self.compile_pattern_assign(pattern)
            }
        }
    }

    fn compile_compound_assignment(&mut self, assignment: &ast::AssignmentExpression) -> Result<(), Error> {
        let op = match assignment.operator {
            ast::AssignmentOperator::Add => Op::Add,
            ast::AssignmentOperator::Sub => Op::Sub,
            ast::AssignmentOperator::Mul => Op::Mul,
            ast::AssignmentOperator::Div => Op::Div,
            ast::AssignmentOperator::Mod => Op::Mod,
            ast::AssignmentOperator::Pow => Op::Pow,
            ast::AssignmentOperator::Shl => Op::Shl,
            ast::AssignmentOperator::Shr => Op::Shr,
            ast::AssignmentOperator::Ushr => Op::Ushr,
            ast::AssignmentOperator::BitAnd => Op::BitAnd,
            ast::AssignmentOperator::BitOr => Op::BitOr,
            ast::AssignmentOperator::BitXor => Op::BitXor,
            _ => unreachable!("plain and logical assignment handled separately"),
        };
        match &assignment.target {
            ast::AssignmentTarget::Identifier(var) => {
                self.load_var(var)?;
                self.compile_expression(&assignment.value)?;
                self.b.emit(op)?;
                self.b.emit(Op::Dup)?;
                self.store_var(var)
            }
            ast::AssignmentTarget::Member(member) => {
                self.compile_expression(&member.object)?;
                match &member.property {
                    ast::MemberProperty::Identifier(name) => {
                        let name = self.b.string_constant(name);
                        self.b.emit(Op::Dup)?;
                        self.b.emit(Op::GetProp(name))?;
                        self.compile_expression(&assignment.value)?;
                        self.b.emit(op)?;
                        self.b.emit(Op::SetProp(name))
                    }
                    ast::MemberProperty::Computed(key) => {
                        self.compile_expression(key)?;
                        self.b.emit(Op::Dup2)?;
                        self.b.emit(Op::GetPropDyn)?;
                        self.compile_expression(&assignment.value)?;
                        self.b.emit(op)?;
                        self.b.emit(Op::SetPropDyn)
                    }
                }
            }
            ast::AssignmentTarget::Pattern(_) => Err(Error::Unsupported(
                "compound assignment to a destructuring pattern".into(),
            )),
        }
    }

    /// `&&=`, `||=` and `??=`: the store (and the right operand) only run
    /// when the current value does not already decide the result.
    fn compile_logical_assignment(&mut self, assignment: &ast::AssignmentExpression) -> Result<(), Error> {
        let operator = assignment.operator;
        match &assignment.target {
            ast::AssignmentTarget::Identifier(var) => {
                self.load_var(var)?;
                self.emit_logical_condition(operator)?;
                let assign = |c: &mut Self| {
                    c.b.emit(Op::Pop)?;
                    c.compile_expression(&assignment.value)?;
                    c.b.emit(Op::Dup)?;
                    c.store_var(var)
                };
                match operator {
                    ast::AssignmentOperator::Or => self.if_false_helper(assign),
                    _ => self.if_true_helper(assign),
                }
            }
            ast::AssignmentTarget::Member(member) => {
                self.compile_expression(&member.object)?;
                match &member.property {
                    ast::MemberProperty::Identifier(name) => {
                        let name = self.b.string_constant(name);
                        self.b.emit(Op::Dup)?;
                        self.b.emit(Op::GetProp(name))?;
                        self.emit_logical_condition(operator)?;
                        let assign = |c: &mut Self| {
                            c.b.emit(Op::Pop)?;
                            c.compile_expression(&assignment.value)?;
                            c.b.emit(Op::SetProp(name))
                        };
                        let keep = |c: &mut Self| {
                            c.b.emit(Op::Swap)?;
                            c.b.emit(Op::Pop)
                        };
                        match operator {
                            ast::AssignmentOperator::Or => self.if_else_helper(keep, assign),
                            _ => self.if_else_helper(assign, keep),
                        }
                    }
                    ast::MemberProperty::Computed(key) => {
                        self.compile_expression(key)?;
                        self.b.emit(Op::Dup2)?;
                        self.b.emit(Op::GetPropDyn)?;
                        self.emit_logical_condition(operator)?;
                        let assign = |c: &mut Self| {
                            c.b.emit(Op::Pop)?;
                            c.compile_expression(&assignment.value)?;
                            c.b.emit(Op::SetPropDyn)
                        };
                        let keep = |c: &mut Self| {
                            c.b.emit(Op::Swap)?;
                            c.b.emit(Op::Pop)?;
                            c.b.emit(Op::Swap)?;
                            c.b.emit(Op::Pop)
                        };
                        match operator {
                            ast::AssignmentOperator::Or => self.if_else_helper(keep, assign),
                            _ => self.if_else_helper(assign, keep),
                        }
                    }
                }
            }
            ast::AssignmentTarget::Pattern(_) => Err(Error::Unsupported(
                "logical assignment to a destructuring pattern".into(),
            )),
        }
    }

    /// Duplicates the current value and reduces it to the branch condition:
    /// truthiness for `&&=`/`||=`, nullishness for `??=`.
    fn emit_logical_condition(&mut self, operator: ast::AssignmentOperator) -> Result<(), Error> {
        self.b.emit(Op::Dup)?;
        if operator == ast::AssignmentOperator::Nullish {
            self.b.emit(Op::LoadNull)?;
            self.b.emit(Op::Eq)?;
        }
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn compile_call(&mut self, call: &ast::CallExpression) -> Result<(), Error> {
        if let ast::Expression::Member(member) = call.callee.as_ref() {
            // keep the receiver below the callee for the method call
            self.compile_expression(&member.object)?;
            self.b.emit(Op::Dup)?;
            self.compile_property_get(&member.property)?;
            return if has_spread(&call.arguments) {
                self.compile_arguments_array(&call.arguments)?;
                self.b.emit(Op::CallMethodVarargs)
            } else {
                for argument in &call.arguments {
                    self.compile_plain_argument(argument)?;
                }
                self.b.emit(Op::CallMethod(call.arguments.len() as u16))
            };
        }

        self.compile_expression(&call.callee)?;
        if has_spread(&call.arguments) {
            self.compile_arguments_array(&call.arguments)?;
            self.b.emit(Op::CallVarargs)
        } else {
            for argument in &call.arguments {
                self.compile_plain_argument(argument)?;
            }
            self.b.emit(Op::Call(call.arguments.len() as u16))
        }
    }

    fn compile_new(&mut self, new: &ast::CallExpression) -> Result<(), Error> {
        self.compile_expression(&new.callee)?;
        if has_spread(&new.arguments) {
            self.compile_arguments_array(&new.arguments)?;
            self.b.emit(Op::NewVarargs)
        } else {
            for argument in &new.arguments {
                self.compile_plain_argument(argument)?;
            }
            self.b.emit(Op::New(new.arguments.len() as u16))
        }
    }

    /// `super(...)` binds the receiver and runs the instance-field
    /// initializer; its value is the constructed `this`.
    fn compile_super_call(&mut self, arguments: &[ast::Argument]) -> Result<(), Error> {
        if has_spread(arguments) {
            self.compile_arguments_array(arguments)?;
            self.b.emit(Op::CallSuperVarargs)?;
        } else {
            for argument in arguments {
                self.compile_plain_argument(argument)?;
            }
            self.b.emit(Op::CallSuper(arguments.len() as u16))?;
        }
        self.b.emit(Op::Dup)?;
        self.b.emit(Op::StoreLocal(RECEIVER_SLOT))?;
        self.b.emit(Op::InitInstanceFields)
    }

    fn compile_plain_argument(&mut self, argument: &ast::Argument) -> Result<(), Error> {
        match argument {
            ast::Argument::Expression(expression) => self.compile_expression(expression),
            ast::Argument::Spread(_) => unreachable!("spread arguments take the varargs path"),
        }
    }

    /// Builds the arguments array for a call with spread arguments.
    fn compile_arguments_array(&mut self, arguments: &[ast::Argument]) -> Result<(), Error> {
        self.b.emit(Op::NewArray(0))?;
        for argument in arguments {
            match argument {
                ast::Argument::Expression(expression) => {
                    self.compile_expression(expression)?;
                    self.b.emit(Op::Append)?;
                }
                ast::Argument::Spread(expression) => {
                    self.compile_expression(expression)?;
                    self.append_iterable()?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn compile_property_get(&mut self, property: &ast::MemberProperty) -> Result<(), Error> {
        match property {
            ast::MemberProperty::Identifier(name) => {
                let name = self.b.string_constant(name);
                self.b.emit(Op::GetProp(name))
            }
            ast::MemberProperty::Computed(key) => {
                self.compile_expression(key)?;
                self.b.emit(Op::GetPropDyn)
            }
        }
    }

    // ========================================================================
    // Object and array literals
    // ========================================================================

    fn compile_array(&mut self, array: &ast::ArrayExpression) -> Result<(), Error> {
        let spread = array
            .elements
            .iter()
            .any(|element| matches!(element, ast::ArrayElement::Spread(_)));
        if !spread {
            for element in &array.elements {
                match element {
                    ast::ArrayElement::Hole => self.b.emit(Op::LoadUndefined)?,
                    ast::ArrayElement::Expression(expression) => {
                        self.compile_expression(expression)?
                    }
                    ast::ArrayElement::Spread(_) => unreachable!(),
                }
            }
            return self.b.emit(Op::NewArray(array.elements.len() as u16));
        }

        self.b.emit(Op::NewArray(0))?;
        for element in &array.elements {
            match element {
                ast::ArrayElement::Hole => {
                    self.b.emit(Op::LoadUndefined)?;
                    self.b.emit(Op::Append)?;
                }
                ast::ArrayElement::Expression(expression) => {
                    self.compile_expression(expression)?;
                    self.b.emit(Op::Append)?;
                }
                ast::ArrayElement::Spread(expression) => {
                    self.compile_expression(expression)?;
                    self.append_iterable()?;
                }
            }
        }
        Ok(())
    }

    fn compile_object(&mut self, object: &ast::ObjectExpression) -> Result<(), Error> {
        self.b.emit(Op::NewObject)?;
        for property in &object.properties {
            match property {
                ast::ObjectProperty::KeyValue { key, value } => {
                    self.b.emit(Op::Dup)?;
                    match key {
                        ast::PropertyKey::Identifier(name) | ast::PropertyKey::String(name) => {
                            let name = self.b.string_constant(name);
                            self.compile_expression(value)?;
                            self.b.emit(Op::SetProp(name))?;
                        }
                        ast::PropertyKey::Number(n) => {
                            let index = self.b.number_constant(*n);
                            self.b.emit(Op::LoadConst(index))?;
                            self.compile_expression(value)?;
                            self.b.emit(Op::SetPropDyn)?;
                        }
                        ast::PropertyKey::Computed(key) => {
                            self.compile_expression(key)?;
                            self.compile_expression(value)?;
                            self.b.emit(Op::SetPropDyn)?;
                        }
                    }
                    // the store leaves the value; the object stays below
                    self.b.emit(Op::Pop)?;
                }
                ast::ObjectProperty::Spread(expression) => {
                    self.b.emit(Op::Dup)?;
                    self.compile_expression(expression)?;
                    self.b.emit(Op::NewArray(0))?;
                    self.b.emit(Op::CopyDataProperties)?;
                    self.b.emit(Op::Pop)?;
                }
            }
        }
        Ok(())
    }

    fn compile_sequence(&mut self, expressions: &[ast::Expression]) -> Result<(), Error> {
        for (index, expression) in expressions.iter().enumerate() {
            self.compile_expression(expression)?;
            if index + 1 < expressions.len() {
                self.b.emit(Op::Pop)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Iterator draining
    // ========================================================================

    /// `[.., array, iterable]` to `[.., array]`: appends every value the
    /// iterable produces. Shared by spread arguments, spread elements and
    /// rest patterns.
    pub(super) fn append_iterable(&mut self) -> Result<(), Error> {
        self.b.emit(Op::GetIterator)?;
        self.drain_iterator()
    }

    /// `[.., array, iterator]` to `[.., array]`: the drain loop itself. The
    /// iterator lives in a scratch slot so the array stays appendable on
    /// top of the stack.
    pub(super) fn drain_iterator(&mut self) -> Result<(), Error> {
        let done_name = self.b.string_constant("done");
        let value_name = self.b.string_constant("value");
        let iterator = self.b.new_local_slot(SlotKind::Value);
        self.b.emit(Op::StoreLocal(iterator))?;
        let base = self.b.height();

        let head = self.b.start_block()?;
        self.b.emit(Op::LoadLocal(iterator))?;
        self.b.emit(Op::IteratorNext)?;
        self.b.emit(Op::Swap)?;
        self.b.emit(Op::StoreLocal(iterator))?;
        self.b.emit(Op::Dup)?;
        self.b.emit(Op::GetProp(done_name))?;
        let body = self.b.new_block();
        let exit_patch = self.b.emit_branch_false(body)?;
        self.b.switch_to(body);
        self.b.emit(Op::GetProp(value_name))?;
        self.b.emit(Op::Append)?;
        self.b.emit(Op::Jump { target: head })?;

        let exit = self.b.new_block();
        self.b.patch_jump(exit_patch, exit);
        self.b.switch_to_at(exit, base + 1);
        self.b.emit(Op::Pop)
    }
}
