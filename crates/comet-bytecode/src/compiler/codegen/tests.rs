//! Tests for the lowering pass.
//!
//! There is no parser in this crate, so fixtures are hand-built
//! scope-resolved trees. Every compiled fixture has already been through
//! the graph pass; the validator is additionally run explicitly so the
//! stack invariants are asserted in release builds too.

use crate::Error;
use crate::ast::*;
use crate::compiler::bytecode::{Op, PHASE_EXHAUSTED};
use crate::compiler::ir::{FunctionInfo, PHASE_SLOT};
use crate::compiler::validate;

use super::{compile_function, compile_script};

// ============================================================================
// Fixture helpers
// ============================================================================

fn num(n: f64) -> Expression {
    Expression::Literal(Literal::Number(n))
}

fn local(name: &str, slot: u16) -> VarRef {
    VarRef {
        name: name.to_string(),
        binding: Binding::Local(slot),
    }
}

fn local_ident(name: &str, slot: u16) -> Expression {
    Expression::Identifier(local(name, slot))
}

fn expr_stmt(expression: Expression) -> Statement {
    Statement::Expression(expression)
}

fn let_decl(name: &str, slot: u16, init: Expression) -> Statement {
    let_pattern(Pattern::Identifier(local(name, slot)), init)
}

fn let_pattern(pattern: Pattern, init: Expression) -> Statement {
    Statement::VariableDeclaration(VariableDeclaration {
        kind: VariableKind::Let,
        declarations: vec![VariableDeclarator {
            pattern,
            init: Some(init),
        }],
    })
}

fn script(body: Vec<Statement>, local_count: u16) -> Program {
    Program {
        body,
        scope: ScopeInfo {
            local_count,
            ..ScopeInfo::default()
        },
        is_strict: false,
    }
}

fn function(body: Vec<Statement>, local_count: u16) -> Function {
    Function {
        name: Some("f".to_string()),
        params: Vec::new(),
        rest: None,
        body,
        scope: ScopeInfo {
            local_count,
            ..ScopeInfo::default()
        },
        is_strict: false,
        is_generator: false,
        is_async: false,
        is_arrow: false,
        is_derived_constructor: false,
    }
}

fn yield_expr(argument: Expression) -> Expression {
    Expression::Yield(YieldExpression {
        argument: Some(Box::new(argument)),
        delegate: false,
    })
}

fn compile_script_ok(body: Vec<Statement>, local_count: u16) -> FunctionInfo {
    let info = compile_script(&script(body, local_count)).expect("script should compile");
    validate::validate(&info.program).expect("script should validate");
    info
}

fn compile_function_ok(func: &Function) -> FunctionInfo {
    let info = compile_function(func).expect("function should compile");
    validate::validate(&info.program).expect("function should validate");
    info
}

fn all_ops(info: &FunctionInfo) -> impl Iterator<Item = &Op> {
    info.program.blocks.iter().flat_map(|block| block.ops.iter())
}

fn count_ops(info: &FunctionInfo, predicate: impl Fn(&Op) -> bool) -> usize {
    all_ops(info).filter(|op| predicate(op)).count()
}

// ============================================================================
// Basics
// ============================================================================

#[test]
fn test_compile_empty_script() {
    let info = compile_script_ok(vec![], 0);
    assert!(info.is_script);
    assert_eq!(info.program.blocks.len(), 1);
    assert_eq!(
        info.program.blocks[0].ops,
        vec![Op::LoadUndefined, Op::Return]
    );
}

#[test]
fn test_expression_statement_pops_its_value() {
    let info = compile_script_ok(vec![expr_stmt(num(42.0))], 0);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Pop)), 1);
}

#[test]
fn test_function_record_flags() {
    let info = compile_function_ok(&function(vec![Statement::Return(Some(num(1.0)))], 0));
    assert!(!info.is_script);
    assert_eq!(info.name.as_deref(), Some("f"));
    assert_eq!(info.param_count, 0);
}

#[test]
fn test_variable_declaration_stores_local() {
    let info = compile_script_ok(vec![let_decl("x", 0, num(1.0))], 1);
    // slot 0 is biased past the two reserved slots
    assert_eq!(count_ops(&info, |op| matches!(op, Op::StoreLocal(2))), 1);
}

#[test]
fn test_hoisted_vars_initialized_undefined() {
    let program = Program {
        body: vec![expr_stmt(local_ident("x", 0))],
        scope: ScopeInfo {
            local_count: 1,
            hoisted_vars: vec![0],
            hoisted_functions: vec![],
        },
        is_strict: false,
    };
    let info = compile_script(&program).unwrap();
    assert_eq!(info.program.blocks[0].ops[0], Op::LoadUndefined);
    assert_eq!(info.program.blocks[0].ops[1], Op::StoreLocal(2));
}

#[test]
fn test_hoisted_function_compiled_before_body() {
    let decl = Statement::FunctionDeclaration(FunctionDeclaration {
        var: local("g", 0),
        function: function(vec![], 0),
    });
    let program = Program {
        body: vec![expr_stmt(local_ident("g", 0)), decl],
        scope: ScopeInfo {
            local_count: 1,
            hoisted_vars: vec![],
            hoisted_functions: vec![1],
        },
        is_strict: false,
    };
    let info = compile_script(&program).unwrap();
    validate::validate(&info.program).unwrap();
    // the closure materializes before the use, and only once
    assert_eq!(info.program.blocks[0].ops[0], Op::Closure(0));
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Closure(_))), 1);
    assert_eq!(info.program.inner.len(), 1);
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_if_else_yields_one_branch_with_distinct_targets() {
    let info = compile_script_ok(
        vec![Statement::If(IfStatement {
            test: local_ident("x", 0),
            consequent: Box::new(expr_stmt(num(1.0))),
            alternate: Some(Box::new(expr_stmt(num(2.0)))),
        })],
        1,
    );
    let branches: Vec<&Op> = all_ops(&info)
        .filter(|op| matches!(op, Op::Branch { .. }))
        .collect();
    assert_eq!(branches.len(), 1);
    let Op::Branch { if_true, if_false } = branches[0] else {
        unreachable!();
    };
    assert_ne!(if_true, if_false);
}

#[test]
fn test_logical_and_short_circuits() {
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Logical(LogicalExpression {
            operator: LogicalOperator::And,
            left: Box::new(local_ident("a", 0)),
            right: Box::new(local_ident("b", 1)),
        }))],
        2,
    );
    // evaluate a, duplicate, branch on the duplicate
    assert_eq!(
        &info.program.blocks[0].ops[..2],
        &[Op::LoadLocal(2), Op::Dup]
    );
    assert!(matches!(
        info.program.blocks[0].ops[2],
        Op::Branch { .. }
    ));
    // the taken path pops the duplicate before evaluating b
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Pop)), 2);
}

#[test]
fn test_nullish_tests_against_null() {
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Logical(LogicalExpression {
            operator: LogicalOperator::Nullish,
            left: Box::new(local_ident("a", 0)),
            right: Box::new(num(1.0)),
        }))],
        1,
    );
    assert_eq!(count_ops(&info, |op| matches!(op, Op::LoadNull)), 1);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Eq)), 1);
}

#[test]
fn test_conditional_expression_merges() {
    let info = compile_script_ok(
        vec![let_decl(
            "r",
            0,
            Expression::Conditional(ConditionalExpression {
                test: Box::new(local_ident("x", 1)),
                consequent: Box::new(num(1.0)),
                alternate: Box::new(num(2.0)),
            }),
        )],
        2,
    );
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Branch { .. })), 1);
}

#[test]
fn test_while_loop_has_back_edge() {
    let info = compile_script_ok(
        vec![Statement::While(WhileStatement {
            test: local_ident("x", 0),
            body: Box::new(expr_stmt(num(1.0))),
        })],
        1,
    );
    let has_back_edge = info.program.blocks.iter().enumerate().any(|(index, block)| {
        matches!(block.terminator(), Some(Op::Jump { target }) if target.index() <= index)
    });
    assert!(has_back_edge);
}

#[test]
fn test_do_while_branches_back_to_head() {
    let info = compile_script_ok(
        vec![Statement::DoWhile(DoWhileStatement {
            body: Box::new(expr_stmt(num(1.0))),
            test: local_ident("x", 0),
        })],
        1,
    );
    let has_back_branch = info.program.blocks.iter().enumerate().any(|(index, block)| {
        matches!(block.terminator(), Some(Op::Branch { if_true, .. }) if if_true.index() <= index)
    });
    assert!(has_back_branch);
}

#[test]
fn test_for_loop_with_break_and_continue() {
    // for (let i = 0; i < 3; i = i + 1) { if (i) { continue; } break; }
    let body = Statement::Block(vec![
        Statement::If(IfStatement {
            test: local_ident("i", 0),
            consequent: Box::new(Statement::Continue(None)),
            alternate: None,
        }),
        Statement::Break(None),
    ]);
    let info = compile_script_ok(
        vec![Statement::For(ForStatement {
            init: Some(ForInit::Declaration(VariableDeclaration {
                kind: VariableKind::Let,
                declarations: vec![VariableDeclarator {
                    pattern: Pattern::Identifier(local("i", 0)),
                    init: Some(num(0.0)),
                }],
            })),
            test: Some(Expression::Binary(BinaryExpression {
                operator: BinaryOperator::Lt,
                left: Box::new(local_ident("i", 0)),
                right: Box::new(num(3.0)),
            })),
            update: Some(Expression::Assignment(AssignmentExpression {
                operator: AssignmentOperator::Assign,
                target: AssignmentTarget::Identifier(local("i", 0)),
                value: Box::new(Expression::Binary(BinaryExpression {
                    operator: BinaryOperator::Add,
                    left: Box::new(local_ident("i", 0)),
                    right: Box::new(num(1.0)),
                })),
            })),
            body: Box::new(body),
        })],
        1,
    );
    assert!(count_ops(&info, |op| matches!(op, Op::Jump { .. })) >= 3);
}

#[test]
fn test_labeled_break_targets_outer_loop() {
    // outer: while (x) { while (y) { break outer; } }
    let inner = Statement::While(WhileStatement {
        test: local_ident("y", 1),
        body: Box::new(Statement::Break(Some("outer".to_string()))),
    });
    let info = compile_script_ok(
        vec![Statement::Labeled(LabeledStatement {
            label: "outer".to_string(),
            body: Box::new(Statement::While(WhileStatement {
                test: local_ident("x", 0),
                body: Box::new(inner),
            })),
        })],
        2,
    );
    validate::validate(&info.program).unwrap();
}

#[test]
fn test_break_outside_loop_fails_fast() {
    let err = compile_script(&script(vec![Statement::Break(None)], 0)).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn test_switch_compares_strictly_against_scratch_slot() {
    let case = |n: f64, body: Vec<Statement>| SwitchCase {
        test: Some(num(n)),
        body,
    };
    let info = compile_script_ok(
        vec![Statement::Switch(SwitchStatement {
            discriminant: local_ident("x", 0),
            cases: vec![
                case(1.0, vec![Statement::Break(None)]),
                case(2.0, vec![expr_stmt(num(9.0))]),
                SwitchCase {
                    test: None,
                    body: vec![expr_stmt(num(0.0))],
                },
            ],
        })],
        1,
    );
    assert_eq!(count_ops(&info, |op| matches!(op, Op::StrictEq)), 2);
    // the discriminant is reloaded from its scratch slot for each test
    assert_eq!(count_ops(&info, |op| matches!(op, Op::LoadLocal(3))), 2);
}

// ============================================================================
// try/catch
// ============================================================================

#[test]
fn test_try_catch_registers_handler_region() {
    let info = compile_script_ok(
        vec![Statement::Try(TryStatement {
            block: vec![Statement::Throw(num(1.0))],
            handler: Some(CatchClause {
                param: Some(Pattern::Identifier(local("e", 0))),
                body: vec![],
            }),
            finalizer: None,
        })],
        1,
    );
    let handlers: Vec<_> = info
        .program
        .blocks
        .iter()
        .filter_map(|block| block.handler)
        .collect();
    assert!(!handlers.is_empty());
    // the handler entry consumes the raised value into the catch binding
    let handler = handlers[0];
    assert_eq!(info.program.block(handler).ops[0], Op::StoreLocal(2));
}

#[test]
fn test_catch_without_param_pops_raised_value() {
    let info = compile_script_ok(
        vec![Statement::Try(TryStatement {
            block: vec![expr_stmt(num(1.0))],
            handler: Some(CatchClause {
                param: None,
                body: vec![],
            }),
            finalizer: None,
        })],
        0,
    );
    let handler = info
        .program
        .blocks
        .iter()
        .find_map(|block| block.handler)
        .expect("handler registered");
    assert_eq!(info.program.block(handler).ops[0], Op::Pop);
}

#[test]
fn test_finally_fails_fast() {
    let err = compile_script(&script(
        vec![Statement::Try(TryStatement {
            block: vec![],
            handler: Some(CatchClause {
                param: None,
                body: vec![],
            }),
            finalizer: Some(vec![]),
        })],
        0,
    ))
    .unwrap_err();
    assert_eq!(err, Error::Unsupported("finally blocks".into()));
}

// ============================================================================
// Generators and async
// ============================================================================

#[test]
fn test_generator_single_yield_dispatch_shape() {
    let mut func = function(vec![expr_stmt(yield_expr(num(1.0)))], 0);
    func.is_generator = true;
    let info = compile_function_ok(&func);

    // prologue: load the saved phase, jump through the table
    assert_eq!(info.program.blocks[0].ops[0], Op::LoadLocal(PHASE_SLOT));
    assert_eq!(info.program.blocks[0].ops[1], Op::Dispatch);

    let dispatch = info.program.dispatch.as_ref().expect("dispatch table");
    assert_eq!(dispatch.len(), 3);
    assert!(dispatch.contains_key(&0));
    assert!(dispatch.contains_key(&1));
    assert!(dispatch.contains_key(&PHASE_EXHAUSTED));

    // the suspend records phase 1 and resumes where it registered
    let resume = all_ops(&info)
        .find_map(|op| match op {
            Op::Yield { resume } => Some(*resume),
            _ => None,
        })
        .expect("yield emitted");
    assert_eq!(dispatch[&1], resume);
    // at suspension the stack held only the argument, so the resume point
    // restores nothing and pushes the sent value
    assert_eq!(info.program.block(resume).ops[0], Op::ResumedValue);
    assert_eq!(info.program.saved_operand_count, 1);
}

#[test]
fn test_yield_spills_and_restores_deep_stack() {
    // 1 + (yield 2): one operand is live across the suspension
    let mut func = function(
        vec![expr_stmt(Expression::Binary(BinaryExpression {
            operator: BinaryOperator::Add,
            left: Box::new(num(1.0)),
            right: Box::new(yield_expr(num(2.0))),
        }))],
        0,
    );
    func.is_generator = true;
    let info = compile_function_ok(&func);

    assert_eq!(info.program.saved_operand_count, 2);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Stash(_))), 2);
    let resume = all_ops(&info)
        .find_map(|op| match op {
            Op::Yield { resume } => Some(*resume),
            _ => None,
        })
        .expect("yield emitted");
    assert_eq!(
        &info.program.block(resume).ops[..2],
        &[Op::Unstash(0), Op::ResumedValue]
    );
}

#[test]
fn test_generator_return_marks_exhausted() {
    let mut func = function(vec![Statement::Return(Some(num(1.0)))], 0);
    func.is_generator = true;
    let info = compile_function_ok(&func);
    assert!(count_ops(&info, |op| matches!(op, Op::SetPhase(PHASE_EXHAUSTED))) >= 1);
}

#[test]
fn test_await_lowers_like_yield() {
    let mut func = function(
        vec![expr_stmt(Expression::Await(Box::new(num(1.0))))],
        0,
    );
    func.is_async = true;
    let info = compile_function_ok(&func);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Await { .. })), 1);
    assert!(info.program.dispatch.is_some());
}

#[test]
fn test_yield_outside_generator_fails_fast() {
    let err = compile_function(&function(vec![expr_stmt(yield_expr(num(1.0)))], 0)).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn test_yield_delegation_fails_fast() {
    let mut func = function(
        vec![expr_stmt(Expression::Yield(YieldExpression {
            argument: Some(Box::new(num(1.0))),
            delegate: true,
        }))],
        0,
    );
    func.is_generator = true;
    let err = compile_function(&func).unwrap_err();
    assert_eq!(err, Error::Unsupported("yield* delegation".into()));
}

// ============================================================================
// Dead code
// ============================================================================

#[test]
fn test_code_after_return_is_removed() {
    let info = compile_function_ok(&function(
        vec![Statement::Return(Some(num(1.0))), expr_stmt(num(2.0))],
        0,
    ));
    assert_eq!(info.program.blocks.len(), 1);
    assert_eq!(info.program.blocks[0].ops.last(), Some(&Op::Return));
}

// ============================================================================
// Assignment and update targets
// ============================================================================

fn member(object: Expression, name: &str) -> MemberExpression {
    MemberExpression {
        object: Box::new(object),
        property: MemberProperty::Identifier(name.to_string()),
    }
}

#[test]
fn test_member_update_evaluates_object_once() {
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Update(UpdateExpression {
            operator: UpdateOperator::Increment,
            prefix: false,
            target: UpdateTarget::Member(member(local_ident("o", 0), "p")),
        }))],
        1,
    );
    assert_eq!(count_ops(&info, |op| matches!(op, Op::LoadLocal(2))), 1);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::SetProp(_))), 1);
}

#[test]
fn test_compound_member_assignment_duplicates_target() {
    // o.p += 1 reads and writes through one evaluation of o
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Assignment(AssignmentExpression {
            operator: AssignmentOperator::Add,
            target: AssignmentTarget::Member(member(local_ident("o", 0), "p")),
            value: Box::new(num(1.0)),
        }))],
        1,
    );
    assert_eq!(count_ops(&info, |op| matches!(op, Op::LoadLocal(2))), 1);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::GetProp(_))), 1);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::SetProp(_))), 1);
}

#[test]
fn test_logical_assignment_skips_store() {
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Assignment(AssignmentExpression {
            operator: AssignmentOperator::Nullish,
            target: AssignmentTarget::Identifier(local("x", 0)),
            value: Box::new(num(1.0)),
        }))],
        1,
    );
    // the store sits behind a branch
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Branch { .. })), 1);
}

// ============================================================================
// Destructuring
// ============================================================================

#[test]
fn test_array_destructuring_uses_iterator_protocol() {
    // let [a, b = 1, ...rest] = xs;
    let pattern = Pattern::Array(ArrayPattern {
        elements: vec![
            Some(PatternElement {
                pattern: Pattern::Identifier(local("a", 0)),
                default: None,
            }),
            Some(PatternElement {
                pattern: Pattern::Identifier(local("b", 1)),
                default: Some(num(1.0)),
            }),
        ],
        rest: Some(Box::new(Pattern::Identifier(local("rest", 2)))),
    });
    let info = compile_script_ok(vec![let_pattern(pattern, local_ident("xs", 3))], 4);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::GetIterator)), 1);
    // one step per positional element plus the rest drain loop
    assert_eq!(count_ops(&info, |op| matches!(op, Op::IteratorNext)), 3);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Append)), 1);
    // the default applies only on exactly undefined
    assert!(count_ops(&info, |op| matches!(op, Op::StrictEq)) >= 1);
}

#[test]
fn test_object_destructuring_rest_excludes_consumed_keys() {
    // let {a, ...r} = o;
    let pattern = Pattern::Object(ObjectPattern {
        properties: vec![ObjectPatternProperty {
            key: PropertyKey::Identifier("a".to_string()),
            value: Pattern::Identifier(local("a", 0)),
            default: None,
        }],
        rest: Some(Box::new(Pattern::Identifier(local("r", 1)))),
    });
    let info = compile_script_ok(vec![let_pattern(pattern, local_ident("o", 2))], 3);
    assert_eq!(
        count_ops(&info, |op| matches!(op, Op::CopyDataProperties)),
        1
    );
    // the consumed key lands in the exclusion array
    assert!(count_ops(&info, |op| matches!(op, Op::Append)) >= 1);
}

// ============================================================================
// Calls and spread
// ============================================================================

#[test]
fn test_method_call_keeps_receiver() {
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Call(CallExpression {
            callee: Box::new(Expression::Member(member(local_ident("o", 0), "m"))),
            arguments: vec![Argument::Expression(num(1.0))],
        }))],
        1,
    );
    assert_eq!(count_ops(&info, |op| matches!(op, Op::CallMethod(1))), 1);
    assert!(count_ops(&info, |op| matches!(op, Op::Dup)) >= 1);
}

#[test]
fn test_spread_call_builds_argument_array() {
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Call(CallExpression {
            callee: Box::new(local_ident("f", 0)),
            arguments: vec![
                Argument::Expression(num(1.0)),
                Argument::Spread(local_ident("xs", 1)),
            ],
        }))],
        2,
    );
    assert_eq!(count_ops(&info, |op| matches!(op, Op::CallVarargs)), 1);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::NewArray(0))), 1);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::GetIterator)), 1);
}

// ============================================================================
// for-in / for-of
// ============================================================================

fn for_each(left_slot: u16, right_slot: u16, body: Vec<Statement>) -> ForEachStatement {
    ForEachStatement {
        left: ForTarget::Declaration(Pattern::Identifier(local("v", left_slot))),
        right: local_ident("xs", right_slot),
        body: Box::new(Statement::Block(body)),
    }
}

#[test]
fn test_for_of_drives_iterator() {
    let info = compile_script_ok(
        vec![Statement::ForOf(for_each(0, 1, vec![expr_stmt(local_ident("v", 0))]))],
        2,
    );
    assert_eq!(count_ops(&info, |op| matches!(op, Op::GetIterator)), 1);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::IteratorNext)), 1);
}

#[test]
fn test_for_in_iterates_property_keys() {
    let info = compile_script_ok(
        vec![Statement::ForIn(for_each(0, 1, vec![]))],
        2,
    );
    assert_eq!(
        count_ops(&info, |op| matches!(op, Op::GetPropertyIterator)),
        1
    );
}

#[test]
fn test_for_of_break_unwinds_cleanly() {
    let info = compile_script_ok(
        vec![Statement::ForOf(for_each(0, 1, vec![Statement::Break(None)]))],
        2,
    );
    // the iterator lives in a scratch slot, so break leaves no residue;
    // the heights were already proven by the graph pass
    assert!(count_ops(&info, |op| matches!(op, Op::StoreLocal(_))) >= 2);
}

#[test]
fn test_break_from_nested_loop_inside_for_of() {
    // for (v of xs) { while (y) { break; } } plus an outer labeled break
    let inner = Statement::While(WhileStatement {
        test: local_ident("y", 2),
        body: Box::new(Statement::Break(None)),
    });
    let info = compile_script_ok(
        vec![Statement::ForOf(for_each(0, 1, vec![inner, Statement::Break(None)]))],
        3,
    );
    validate::validate(&info.program).unwrap();
}

// ============================================================================
// Functions and parameters
// ============================================================================

#[test]
fn test_parameter_default_applies_on_undefined() {
    let mut func = function(vec![], 1);
    func.params = vec![Param {
        pattern: Pattern::Identifier(local("a", 0)),
        default: Some(num(1.0)),
    }];
    let info = compile_function_ok(&func);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::LoadArgument(0))), 1);
    assert!(count_ops(&info, |op| matches!(op, Op::StrictEq)) >= 1);
}

#[test]
fn test_rest_parameter_collects_tail() {
    let mut func = function(vec![], 2);
    func.params = vec![Param {
        pattern: Pattern::Identifier(local("a", 0)),
        default: None,
    }];
    func.rest = Some(local("rest", 1));
    let info = compile_function_ok(&func);
    assert_eq!(
        count_ops(&info, |op| matches!(op, Op::LoadRestArguments(1))),
        1
    );
}

#[test]
fn test_destructuring_parameter_fails_fast() {
    let mut func = function(vec![], 1);
    func.params = vec![Param {
        pattern: Pattern::Array(ArrayPattern {
            elements: vec![],
            rest: None,
        }),
        default: None,
    }];
    let err = compile_function(&func).unwrap_err();
    assert_eq!(err, Error::Unsupported("destructuring parameters".into()));
}

#[test]
fn test_nested_function_gets_own_program() {
    let inner = function(vec![Statement::Return(Some(num(1.0)))], 0);
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Function(Box::new(inner)))],
        0,
    );
    assert_eq!(info.program.inner.len(), 1);
    assert_eq!(count_ops(&info, |op| matches!(op, Op::Closure(0))), 1);
    // the nested program is balanced on its own
    validate::validate(&info.program.inner[0].program).unwrap();
}

// ============================================================================
// Classes
// ============================================================================

#[test]
fn test_class_lowering_shape() {
    // class C { constructor() {} m() {} static s() {} x = 1; static y = 2; }
    let class = Class {
        name: Some("C".to_string()),
        parent: None,
        constructor: Some(function(vec![], 0)),
        members: vec![
            ClassMember::Method {
                kind: MethodKind::Method,
                is_static: false,
                key: PropertyKey::Identifier("m".to_string()),
                function: function(vec![], 0),
            },
            ClassMember::Method {
                kind: MethodKind::Method,
                is_static: true,
                key: PropertyKey::Identifier("s".to_string()),
                function: function(vec![], 0),
            },
            ClassMember::Field {
                is_static: false,
                key: PropertyKey::Identifier("x".to_string()),
                value: Some(num(1.0)),
            },
            ClassMember::Field {
                is_static: true,
                key: PropertyKey::Identifier("y".to_string()),
                value: Some(num(2.0)),
            },
        ],
    };
    let info = compile_script_ok(
        vec![Statement::ClassDeclaration(ClassDeclaration {
            var: local("C", 0),
            class,
        })],
        1,
    );
    let create = all_ops(&info)
        .find_map(|op| match op {
            Op::CreateClass {
                field_init,
                has_parent,
                ..
            } => Some((*field_init, *has_parent)),
            _ => None,
        })
        .expect("class created");
    assert_eq!(create, (Some(0), false));
    assert_eq!(
        count_ops(&info, |op| matches!(op, Op::DefineMethod { .. })),
        2
    );
    // static field stored against the class object itself
    assert!(count_ops(&info, |op| matches!(op, Op::SetProp(_))) >= 1);
    // field initializer, constructor, two methods
    assert_eq!(info.program.inner.len(), 4);
}

#[test]
fn test_derived_default_constructor_forwards_arguments() {
    let class = Class {
        name: Some("D".to_string()),
        parent: Some(Box::new(local_ident("B", 1))),
        constructor: None,
        members: vec![],
    };
    let info = compile_script_ok(
        vec![Statement::ClassDeclaration(ClassDeclaration {
            var: local("D", 0),
            class,
        })],
        2,
    );
    let ctor = &info.program.inner[0];
    let ops: Vec<&Op> = ctor.program.blocks.iter().flat_map(|b| b.ops.iter()).collect();
    assert!(ops.contains(&&Op::LoadArguments));
    assert!(ops.contains(&&Op::CallSuperVarargs));
}

#[test]
fn test_super_call_binds_receiver_and_runs_field_init() {
    let mut ctor = function(
        vec![expr_stmt(Expression::SuperCall(vec![Argument::Expression(
            num(1.0),
        )]))],
        0,
    );
    ctor.is_derived_constructor = true;
    let class = Class {
        name: Some("D".to_string()),
        parent: Some(Box::new(local_ident("B", 1))),
        constructor: Some(ctor),
        members: vec![],
    };
    let info = compile_script_ok(
        vec![Statement::ClassDeclaration(ClassDeclaration {
            var: local("D", 0),
            class,
        })],
        2,
    );
    let ctor = &info.program.inner[0];
    let ops: Vec<&Op> = ctor.program.blocks.iter().flat_map(|b| b.ops.iter()).collect();
    assert!(ops.contains(&&Op::CallSuper(1)));
    assert!(ops.contains(&&Op::StoreLocal(0)));
    assert!(ops.contains(&&Op::InitInstanceFields));
}

// ============================================================================
// Disassembly
// ============================================================================

#[test]
fn test_disassembly_covers_dispatch_and_nested_functions() {
    let mut generator = function(vec![expr_stmt(yield_expr(num(1.0)))], 0);
    generator.is_generator = true;
    let info = compile_script_ok(
        vec![expr_stmt(Expression::Function(Box::new(generator)))],
        0,
    );
    let text = info.to_string();
    assert!(text.contains("dispatch:"));
    assert!(text.contains("phase exhausted"));
    assert!(text.contains("Yield"));
}
