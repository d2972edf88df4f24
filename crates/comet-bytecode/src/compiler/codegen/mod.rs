//! Code generation from the scope-resolved AST to bytecode.
//!
//! One recursive visit method per node kind. Every expression visit leaves
//! exactly one value on the operand stack; every statement visit is
//! stack-neutral. Structured control flow is lowered to flat branches
//! through a small set of jump-patch helpers, so no visit method manages
//! block offsets by hand; break and continue are collected as pending jumps
//! on a loop-scope stack and resolved when the construct ends.
//!
//! Each nested function is lowered by a fresh compiler instance with its own
//! builder and slot table; the finished template is attached to the outer
//! program's nested-function list. After lowering, every program runs
//! through the graph pass (dead-block removal and the stack-height proof),
//! and through the instruction validator in debug builds.

mod classes;
mod expressions;
mod generators;
mod patterns;

#[cfg(test)]
mod tests;

use crate::Error;
use crate::ast;

use super::builder::{Builder, JumpPatch};
use super::bytecode::{Op, PHASE_EXHAUSTED};
use super::cfg;
use super::ir::{BlockId, FunctionInfo, Program, SlotKind};
#[cfg(debug_assertions)]
use super::validate;

/// Compiles a top-level script body into its callable record.
pub fn compile_script(script: &ast::Program) -> Result<FunctionInfo, Error> {
    let mut c = Compiler::new(0, script.scope.local_count, false);
    c.compile_body(&script.body, &script.scope)?;
    c.emit_default_return()?;
    Ok(FunctionInfo {
        name: None,
        program: c.finish()?,
        is_strict: script.is_strict,
        param_count: 0,
        is_script: true,
    })
}

/// Compiles a single function into its callable record.
pub fn compile_function(function: &ast::Function) -> Result<FunctionInfo, Error> {
    compile_function_record(function, false)
}

/// Compiles a function body; `init_fields_at_entry` is set for base-class
/// constructors, whose instance fields initialize before any user code.
pub(super) fn compile_function_record(
    function: &ast::Function,
    init_fields_at_entry: bool,
) -> Result<FunctionInfo, Error> {
    let param_count = function.params.len() as u16;
    let suspends = function.is_generator || function.is_async;
    let mut c = Compiler::new(param_count, function.scope.local_count, suspends);
    if suspends {
        c.emit_dispatch_prologue()?;
    }
    if init_fields_at_entry {
        c.b.emit(Op::InitInstanceFields)?;
    }
    c.compile_params(function)?;
    c.compile_body(&function.body, &function.scope)?;
    c.emit_default_return()?;
    Ok(FunctionInfo {
        name: function.name.clone(),
        program: c.finish()?,
        is_strict: function.is_strict,
        param_count,
        is_script: false,
    })
}

/// One entry of the break/continue resolution stack.
struct LoopScope {
    /// Label of the construct, from an enclosing labeled statement
    label: Option<String>,
    /// Whether `continue` may target this scope (loops yes, switch no)
    allow_continue: bool,
    /// Pending break jumps, patched to the exit block at scope end
    break_patches: Vec<JumpPatch>,
    /// Pending continue jumps, patched to the continuation point
    continue_patches: Vec<JumpPatch>,
}

impl LoopScope {
    fn new(label: Option<String>, allow_continue: bool) -> Self {
        Self {
            label,
            allow_continue,
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        }
    }
}

/// Lowers one function or script body.
pub(super) struct Compiler {
    pub(super) b: Builder,
    loops: Vec<LoopScope>,
    /// Generator or async body: suspension points allowed, exhausted phase
    /// recorded on return
    suspends: bool,
}

impl Compiler {
    fn new(param_count: u16, local_count: u16, suspends: bool) -> Self {
        Self {
            b: Builder::new(param_count, local_count, suspends),
            loops: Vec::new(),
            suspends,
        }
    }

    /// Finalizes the program: builder checks, the graph pass, and (in debug
    /// builds) the instruction validator.
    fn finish(self) -> Result<Program, Error> {
        let mut program = self.b.finish()?;
        cfg::optimize(&mut program)?;
        #[cfg(debug_assertions)]
        validate::validate(&program)?;
        Ok(program)
    }

    // ========================================================================
    // Prologue and epilogue
    // ========================================================================

    /// Binds declared parameters and the rest parameter to their slots.
    fn compile_params(&mut self, function: &ast::Function) -> Result<(), Error> {
        for (index, param) in function.params.iter().enumerate() {
            let ast::Pattern::Identifier(var) = &param.pattern else {
                // these need a separate parameter evaluation scope
                return Err(Error::Unsupported("destructuring parameters".into()));
            };
            self.b.emit(Op::LoadArgument(index as u16))?;
            if let Some(default) = &param.default {
                self.compile_default(default)?;
            }
            self.store_var(var)?;
        }
        if let Some(rest) = &function.rest {
            self.b
                .emit(Op::LoadRestArguments(function.params.len() as u16))?;
            self.store_var(rest)?;
        }
        Ok(())
    }

    /// Lowers a statement list with its scope's hoisting applied: hoisted
    /// `var`s are pre-initialized to undefined and hoisted function
    /// declarations are materialized before the first statement runs.
    fn compile_body(&mut self, body: &[ast::Statement], scope: &ast::ScopeInfo) -> Result<(), Error> {
        for &slot in &scope.hoisted_vars {
            self.b.emit(Op::LoadUndefined)?;
            self.b.emit(Op::StoreLocal(self.b.local_slot(slot)))?;
        }
        for &index in &scope.hoisted_functions {
            let Some(ast::Statement::FunctionDeclaration(decl)) = body.get(index) else {
                return Err(Error::Unsupported(
                    "hoisted index does not name a function declaration".into(),
                ));
            };
            self.compile_function_declaration(decl)?;
        }
        for (index, statement) in body.iter().enumerate() {
            if scope.hoisted_functions.contains(&index) {
                continue;
            }
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// The implicit completion: return undefined, flagging the generator as
    /// exhausted first so a later resumption cannot re-enter the body.
    fn emit_default_return(&mut self) -> Result<(), Error> {
        if self.b.is_terminated() {
            return Ok(());
        }
        self.b.emit(Op::LoadUndefined)?;
        if self.suspends {
            self.b.emit(Op::SetPhase(PHASE_EXHAUSTED))?;
        }
        self.b.emit(Op::Return)
    }

    // ========================================================================
    // Statement compilation
    // ========================================================================

    fn compile_statement(&mut self, statement: &ast::Statement) -> Result<(), Error> {
        match statement {
            ast::Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.b.emit(Op::Pop)
            }
            ast::Statement::VariableDeclaration(decl) => self.compile_variable_declaration(decl),
            ast::Statement::FunctionDeclaration(decl) => self.compile_function_declaration(decl),
            ast::Statement::ClassDeclaration(decl) => {
                self.compile_class(&decl.class)?;
                self.store_var(&decl.var)
            }
            ast::Statement::Block(body) => {
                for statement in body {
                    self.compile_statement(statement)?;
                }
                Ok(())
            }
            ast::Statement::If(stmt) => self.compile_if_statement(stmt),
            ast::Statement::While(stmt) => self.compile_while(stmt, None),
            ast::Statement::DoWhile(stmt) => self.compile_do_while(stmt, None),
            ast::Statement::For(stmt) => self.compile_for(stmt, None),
            ast::Statement::ForIn(stmt) => self.compile_for_each(stmt, None, true),
            ast::Statement::ForOf(stmt) => self.compile_for_each(stmt, None, false),
            ast::Statement::Switch(stmt) => self.compile_switch(stmt, None),
            ast::Statement::Return(argument) => self.compile_return(argument.as_ref()),
            ast::Statement::Break(label) => self.compile_break(label.as_deref()),
            ast::Statement::Continue(label) => self.compile_continue(label.as_deref()),
            ast::Statement::Throw(argument) => {
                self.compile_expression(argument)?;
                self.b.emit(Op::Throw)
            }
            ast::Statement::Try(stmt) => self.compile_try(stmt),
            ast::Statement::Labeled(stmt) => self.compile_labeled(stmt),
            // breakpoints are a host concern; no code
            ast::Statement::Debugger => Ok(()),
            ast::Statement::Empty => Ok(()),
        }
    }

    fn compile_variable_declaration(&mut self, decl: &ast::VariableDeclaration) -> Result<(), Error> {
        for declarator in &decl.declarations {
            match &declarator.init {
                Some(init) => self.compile_expression(init)?,
                None => {
                    if decl.kind == ast::VariableKind::Var {
                        // hoisting already initialized the slot
                        continue;
                    }
                    self.b.emit(Op::LoadUndefined)?;
                }
            }
            self.compile_pattern_assign(&declarator.pattern)?;
        }
        Ok(())
    }

    fn compile_function_declaration(&mut self, decl: &ast::FunctionDeclaration) -> Result<(), Error> {
        let index = self.compile_inner_function(&decl.function)?;
        self.b.emit(Op::Closure(index))?;
        self.store_var(&decl.var)
    }

    /// Lowers a nested function with its own builder and attaches the
    /// template, returning its nested-function index.
    pub(super) fn compile_inner_function(&mut self, function: &ast::Function) -> Result<u16, Error> {
        let info = compile_function_record(function, false)?;
        Ok(self.b.add_inner(info))
    }

    fn compile_if_statement(&mut self, stmt: &ast::IfStatement) -> Result<(), Error> {
        self.compile_expression(&stmt.test)?;
        match &stmt.alternate {
            Some(alternate) => self.if_else_helper(
                |c| c.compile_statement(&stmt.consequent),
                |c| c.compile_statement(alternate),
            ),
            None => self.if_true_helper(|c| c.compile_statement(&stmt.consequent)),
        }
    }

    fn compile_return(&mut self, argument: Option<&ast::Expression>) -> Result<(), Error> {
        match argument {
            Some(argument) => self.compile_expression(argument)?,
            None => self.b.emit(Op::LoadUndefined)?,
        }
        if self.suspends {
            self.b.emit(Op::SetPhase(PHASE_EXHAUSTED))?;
        }
        self.b.emit(Op::Return)
    }

    // ========================================================================
    // Loops, switch, labels
    // ========================================================================

    fn compile_while(&mut self, stmt: &ast::WhileStatement, label: Option<String>) -> Result<(), Error> {
        let head = self.b.start_block()?;
        self.loops.push(LoopScope::new(label, true));
        self.compile_expression(&stmt.test)?;
        let body_block = self.b.new_block();
        let exit_patch = self.b.emit_branch_true(body_block)?;
        self.b.switch_to(body_block);
        self.compile_statement(&stmt.body)?;
        if !self.b.is_terminated() {
            self.b.emit(Op::Jump { target: head })?;
        }
        let exit = self.b.new_block();
        self.b.patch_jump(exit_patch, exit);
        let scope = self.loops.pop().expect("loop scope pushed above");
        for patch in scope.break_patches {
            self.b.patch_jump(patch, exit);
        }
        for patch in scope.continue_patches {
            self.b.patch_jump(patch, head);
        }
        self.b.switch_to_at(exit, 0);
        Ok(())
    }

    fn compile_do_while(&mut self, stmt: &ast::DoWhileStatement, label: Option<String>) -> Result<(), Error> {
        let head = self.b.start_block()?;
        self.loops.push(LoopScope::new(label, true));
        self.compile_statement(&stmt.body)?;
        // continue re-tests the condition, so it lands on the test block
        let test_block = self.b.new_block();
        if !self.b.is_terminated() {
            self.b.emit(Op::Jump { target: test_block })?;
        }
        let scope = self.loops.pop().expect("loop scope pushed above");
        for patch in scope.continue_patches {
            self.b.patch_jump(patch, test_block);
        }
        self.b.switch_to_at(test_block, 0);
        self.compile_expression(&stmt.test)?;
        let exit_patch = self.b.emit_branch_true(head)?;
        let exit = self.b.new_block();
        self.b.patch_jump(exit_patch, exit);
        for patch in scope.break_patches {
            self.b.patch_jump(patch, exit);
        }
        self.b.switch_to_at(exit, 0);
        Ok(())
    }

    fn compile_for(&mut self, stmt: &ast::ForStatement, label: Option<String>) -> Result<(), Error> {
        match &stmt.init {
            Some(ast::ForInit::Declaration(decl)) => self.compile_variable_declaration(decl)?,
            Some(ast::ForInit::Expression(init)) => {
                self.compile_expression(init)?;
                self.b.emit(Op::Pop)?;
            }
            None => {}
        }
        let head = self.b.start_block()?;
        self.loops.push(LoopScope::new(label, true));
        let exit_patch = match &stmt.test {
            Some(test) => {
                self.compile_expression(test)?;
                let body_block = self.b.new_block();
                let patch = self.b.emit_branch_true(body_block)?;
                self.b.switch_to(body_block);
                Some(patch)
            }
            None => None,
        };
        self.compile_statement(&stmt.body)?;
        // continue lands on the update clause
        let update_block = self.b.new_block();
        if !self.b.is_terminated() {
            self.b.emit(Op::Jump {
                target: update_block,
            })?;
        }
        self.b.switch_to_at(update_block, 0);
        if let Some(update) = &stmt.update {
            self.compile_expression(update)?;
            self.b.emit(Op::Pop)?;
        }
        self.b.emit(Op::Jump { target: head })?;
        let exit = self.b.new_block();
        if let Some(patch) = exit_patch {
            self.b.patch_jump(patch, exit);
        }
        let scope = self.loops.pop().expect("loop scope pushed above");
        for patch in scope.break_patches {
            self.b.patch_jump(patch, exit);
        }
        for patch in scope.continue_patches {
            self.b.patch_jump(patch, update_block);
        }
        self.b.switch_to_at(exit, 0);
        Ok(())
    }

    /// Shared lowering of for-in and for-of: both drive an iterator through
    /// `IteratorNext` and named reads of `done`/`value`; for-in iterates the
    /// enumerable property keys instead of the iteration protocol. The
    /// iterator lives in a scratch slot, not on the operand stack, so every
    /// statement boundary in the body sits at height 0 and break/continue
    /// can unwind from any nesting depth.
    fn compile_for_each(
        &mut self,
        stmt: &ast::ForEachStatement,
        label: Option<String>,
        keys: bool,
    ) -> Result<(), Error> {
        self.compile_expression(&stmt.right)?;
        self.b.emit(if keys {
            Op::GetPropertyIterator
        } else {
            Op::GetIterator
        })?;
        let done_name = self.b.string_constant("done");
        let value_name = self.b.string_constant("value");
        let iterator = self.b.new_local_slot(SlotKind::Value);
        self.b.emit(Op::StoreLocal(iterator))?;

        let head = self.b.start_block()?;
        self.loops.push(LoopScope::new(label, true));
        self.b.emit(Op::LoadLocal(iterator))?;
        self.b.emit(Op::IteratorNext)?;
        self.b.emit(Op::Swap)?;
        self.b.emit(Op::Pop)?;
        self.b.emit(Op::Dup)?;
        self.b.emit(Op::GetProp(done_name))?;
        let body_block = self.b.new_block();
        let exit_patch = self.b.emit_branch_false(body_block)?;
        self.b.switch_to(body_block);
        self.b.emit(Op::GetProp(value_name))?;
        let target = match &stmt.left {
            ast::ForTarget::Declaration(pattern) | ast::ForTarget::Pattern(pattern) => pattern,
        };
        self.compile_pattern_assign(target)?;
        self.compile_statement(&stmt.body)?;
        if !self.b.is_terminated() {
            self.b.emit(Op::Jump { target: head })?;
        }

        // the exhausted step object is still on the stack at the exit
        let exit = self.b.new_block();
        self.b.patch_jump(exit_patch, exit);
        self.b.switch_to_at(exit, 1);
        self.b.emit(Op::Pop)?;
        let scope = self.loops.pop().expect("loop scope pushed above");
        for patch in scope.continue_patches {
            self.b.patch_jump(patch, head);
        }
        if !scope.break_patches.is_empty() {
            let after = self.b.start_block()?;
            for patch in scope.break_patches {
                self.b.patch_jump(patch, after);
            }
        }
        Ok(())
    }

    /// The discriminant lives in a scratch slot: every case test reloads it
    /// for its strict comparison, and case bodies (like all statement
    /// positions) run at stack height 0, so break unwinds cleanly even from
    /// a switch nested in other control flow.
    fn compile_switch(&mut self, stmt: &ast::SwitchStatement, label: Option<String>) -> Result<(), Error> {
        self.compile_expression(&stmt.discriminant)?;
        let discriminant = self.b.new_local_slot(SlotKind::Value);
        self.b.emit(Op::StoreLocal(discriminant))?;
        self.loops.push(LoopScope::new(label, false));

        // first pass: tests, each falling to the next test block
        let mut case_patches: Vec<Option<JumpPatch>> = Vec::with_capacity(stmt.cases.len());
        let mut default_index = None;
        for (index, case) in stmt.cases.iter().enumerate() {
            match &case.test {
                Some(test) => {
                    self.b.emit(Op::LoadLocal(discriminant))?;
                    self.compile_expression(test)?;
                    self.b.emit(Op::StrictEq)?;
                    let next_test = self.b.new_block();
                    case_patches.push(Some(self.b.emit_branch_false(next_test)?));
                    self.b.switch_to(next_test);
                }
                None => {
                    default_index = Some(index);
                    case_patches.push(None);
                }
            }
        }
        let default_patch = self.b.emit_jump_forward()?;

        // second pass: bodies, in source order, with explicit fallthrough
        let mut body_blocks = Vec::with_capacity(stmt.cases.len());
        let mut fallthrough: Option<JumpPatch> = None;
        for case in &stmt.cases {
            let body_block = self.b.new_block();
            body_blocks.push(body_block);
            if let Some(patch) = fallthrough.take() {
                self.b.patch_jump(patch, body_block);
            }
            self.b.switch_to_at(body_block, 0);
            for statement in &case.body {
                self.compile_statement(statement)?;
            }
            if !self.b.is_terminated() {
                fallthrough = Some(self.b.emit_jump_forward()?);
            }
        }

        let exit = self.b.new_block();
        if let Some(patch) = fallthrough {
            self.b.patch_jump(patch, exit);
        }
        for (patch, &body_block) in case_patches.into_iter().zip(&body_blocks) {
            if let Some(patch) = patch {
                self.b.patch_jump(patch, body_block);
            }
        }
        match default_index {
            Some(index) => self.b.patch_jump(default_patch, body_blocks[index]),
            None => self.b.patch_jump(default_patch, exit),
        }
        let scope = self.loops.pop().expect("switch scope pushed above");
        for patch in scope.break_patches {
            self.b.patch_jump(patch, exit);
        }
        self.b.switch_to_at(exit, 0);
        Ok(())
    }

    fn compile_labeled(&mut self, stmt: &ast::LabeledStatement) -> Result<(), Error> {
        let label = Some(stmt.label.clone());
        match stmt.body.as_ref() {
            ast::Statement::While(body) => self.compile_while(body, label),
            ast::Statement::DoWhile(body) => self.compile_do_while(body, label),
            ast::Statement::For(body) => self.compile_for(body, label),
            ast::Statement::ForIn(body) => self.compile_for_each(body, label, true),
            ast::Statement::ForOf(body) => self.compile_for_each(body, label, false),
            ast::Statement::Switch(body) => self.compile_switch(body, label),
            body => {
                // plain labeled statement: only `break label` can target it
                self.loops.push(LoopScope::new(label, false));
                self.compile_statement(body)?;
                let scope = self.loops.pop().expect("label scope pushed above");
                if scope.break_patches.is_empty() {
                    return Ok(());
                }
                let exit = self.b.new_block();
                if !self.b.is_terminated() {
                    self.b.emit(Op::Jump { target: exit })?;
                }
                for patch in scope.break_patches {
                    self.b.patch_jump(patch, exit);
                }
                self.b.switch_to_at(exit, 0);
                Ok(())
            }
        }
    }

    fn compile_break(&mut self, label: Option<&str>) -> Result<(), Error> {
        let index = self
            .loops
            .iter()
            .rposition(|scope| match label {
                Some(label) => scope.label.as_deref() == Some(label),
                None => true,
            })
            .ok_or_else(|| Error::Unsupported("break outside a breakable statement".into()))?;
        let patch = self.b.emit_jump_forward()?;
        self.loops[index].break_patches.push(patch);
        Ok(())
    }

    fn compile_continue(&mut self, label: Option<&str>) -> Result<(), Error> {
        let index = self
            .loops
            .iter()
            .rposition(|scope| {
                scope.allow_continue
                    && match label {
                        Some(label) => scope.label.as_deref() == Some(label),
                        None => true,
                    }
            })
            .ok_or_else(|| Error::Unsupported("continue outside a loop".into()))?;
        let patch = self.b.emit_jump_forward()?;
        self.loops[index].continue_patches.push(patch);
        Ok(())
    }

    // ========================================================================
    // try/catch
    // ========================================================================

    fn compile_try(&mut self, stmt: &ast::TryStatement) -> Result<(), Error> {
        if stmt.finalizer.is_some() {
            return Err(Error::Unsupported("finally blocks".into()));
        }
        let Some(handler) = &stmt.handler else {
            return Err(Error::Unsupported("try without catch".into()));
        };

        let try_start = self.b.start_block()?;
        for statement in &stmt.block {
            self.compile_statement(statement)?;
        }
        // every block created while lowering the body is inside the region
        let try_end = BlockId(self.b.block_count() - 1);
        let skip = if self.b.is_terminated() {
            None
        } else {
            Some(self.b.emit_jump_forward()?)
        };

        let catch_block = self.b.new_block();
        self.b.add_handler(try_start, try_end, catch_block);
        self.b.switch_to_handler(catch_block);
        match &handler.param {
            Some(pattern) => self.compile_pattern_assign(pattern)?,
            None => self.b.emit(Op::Pop)?,
        }
        for statement in &handler.body {
            self.compile_statement(statement)?;
        }
        let catch_done = if self.b.is_terminated() {
            None
        } else {
            Some(self.b.emit_jump_forward()?)
        };

        let join = self.b.new_block();
        if let Some(patch) = skip {
            self.b.patch_jump(patch, join);
        }
        if let Some(patch) = catch_done {
            self.b.patch_jump(patch, join);
        }
        self.b.switch_to_at(join, 0);
        Ok(())
    }

    // ========================================================================
    // Jump-patch helpers
    // ========================================================================

    /// Pops the condition on top of the stack and runs `body` only when it
    /// is truthy, patching the skip jump to the merged continuation. The
    /// body must leave the post-branch height unchanged.
    pub(super) fn if_true_helper<F>(&mut self, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let body_block = self.b.new_block();
        let skip = self.b.emit_branch_true(body_block)?;
        self.guarded_body(body_block, skip, body)
    }

    /// Pops the condition on top of the stack and runs `body` only when it
    /// is falsy.
    pub(super) fn if_false_helper<F>(&mut self, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let body_block = self.b.new_block();
        let skip = self.b.emit_branch_false(body_block)?;
        self.guarded_body(body_block, skip, body)
    }

    fn guarded_body<F>(&mut self, body_block: BlockId, skip: JumpPatch, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let base = self.b.height();
        self.b.switch_to(body_block);
        body(self)?;
        let done = if self.b.is_terminated() {
            None
        } else {
            Some(self.b.emit_jump_forward()?)
        };
        let join = self.b.new_block();
        self.b.patch_jump(skip, join);
        if let Some(done) = done {
            self.b.patch_jump(done, join);
        }
        self.b.switch_to_at(join, base);
        Ok(())
    }

    /// Pops the condition on top of the stack and runs one of two bodies,
    /// merging both at a fresh continuation block. Live arms must leave the
    /// same stack height; the graph pass proves it.
    pub(super) fn if_else_helper<F, G>(&mut self, then_body: F, else_body: G) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
        G: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let then_block = self.b.new_block();
        let else_patch = self.b.emit_branch_true(then_block)?;
        let base = self.b.height();

        self.b.switch_to(then_block);
        then_body(self)?;
        let then_done = if self.b.is_terminated() {
            None
        } else {
            Some(self.b.emit_jump_forward()?)
        };
        let then_height = self.b.height();

        let else_block = self.b.new_block();
        self.b.patch_jump(else_patch, else_block);
        self.b.switch_to_at(else_block, base);
        else_body(self)?;
        let else_done = if self.b.is_terminated() {
            None
        } else {
            Some(self.b.emit_jump_forward()?)
        };
        let else_height = self.b.height();

        let join = self.b.new_block();
        let join_height = if then_done.is_some() {
            then_height
        } else {
            else_height
        };
        if let Some(patch) = then_done {
            self.b.patch_jump(patch, join);
        }
        if let Some(patch) = else_done {
            self.b.patch_jump(patch, join);
        }
        self.b.switch_to_at(join, join_height);
        Ok(())
    }
}
