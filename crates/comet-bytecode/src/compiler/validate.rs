//! Instruction-granular validation of a finished program.
//!
//! This is an independent re-derivation of the invariant the graph pass
//! already proved: the abstract stack height is single-valued at every
//! program point, handler entry implies height 1, and `return`/`throw`
//! consume exactly the one value they need. The walk here is per
//! instruction, not per block delta, so it additionally catches underflow
//! inside a block, missing terminators and shuffle opcodes running against
//! too-short stacks.
//!
//! The compile entry points run this automatically in debug builds; it can
//! be invoked explicitly in release builds as a defense-in-depth gate.

use crate::Error;

use super::bytecode::Op;
use super::ir::Program;

/// Minimum stack height an instruction needs before it executes.
fn required_height(op: &Op) -> i32 {
    match op {
        Op::Swap | Op::Dup2 => 2,
        Op::Dup => 1,
        // every other requirement follows from not going negative
        _ => -op.stack_effect().min(0),
    }
}

/// Checks the stack invariants of every reachable instruction.
pub fn validate(program: &Program) -> Result<(), Error> {
    let count = program.blocks.len();
    let mut entry_heights: Vec<Option<i32>> = vec![None; count];
    let mut worklist = vec![(program.entry(), 0i32)];

    for block in &program.blocks {
        if let Some(handler) = block.handler {
            worklist.push((handler, 1));
        }
    }

    while let Some((block_id, entry)) = worklist.pop() {
        match entry_heights[block_id.index()] {
            None => entry_heights[block_id.index()] = Some(entry),
            Some(expected) if expected == entry => continue,
            Some(expected) => {
                return Err(Error::HeightMismatch {
                    block: block_id.0,
                    expected,
                    found: entry,
                });
            }
        }

        let block = program.block(block_id);
        let mut height = entry;
        for (index, op) in block.ops.iter().enumerate() {
            if op.is_terminator() && index + 1 != block.ops.len() {
                return Err(Error::MalformedBlock(format!(
                    "terminator at instruction {} of block {}",
                    index, block_id
                )));
            }
            if height < required_height(op) {
                return Err(Error::StackUnderflow {
                    block: block_id.0,
                    index,
                });
            }
            // return and throw hand over exactly one value
            if matches!(op, Op::Return | Op::Throw) && height != 1 {
                return Err(Error::UnbalancedExit {
                    block: block_id.0,
                    height,
                });
            }
            height += op.stack_effect();
        }

        match block.terminator() {
            None => {
                return Err(Error::MalformedBlock(format!(
                    "reachable block {} has no terminator",
                    block_id
                )));
            }
            Some(Op::Dispatch) => {
                let Some(dispatch) = &program.dispatch else {
                    return Err(Error::BadDispatch(
                        "dispatch instruction without a dispatch table".into(),
                    ));
                };
                for &target in dispatch.values() {
                    worklist.push((target, height));
                }
            }
            // return and throw were already held to height 1 above, so a
            // successor-less block necessarily ends at 0
            Some(op) => {
                for target in op.targets() {
                    worklist.push((target, height));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::builder::Builder;
    use crate::compiler::cfg;
    use crate::compiler::ir::BasicBlock;

    fn finished(mut b: Builder) -> Program {
        b.emit(Op::LoadUndefined).unwrap();
        b.emit(Op::Return).unwrap();
        let mut program = b.finish().unwrap();
        cfg::optimize(&mut program).unwrap();
        program
    }

    #[test]
    fn test_accepts_optimizer_approved_program() {
        let mut b = Builder::new(0, 0, false);
        b.emit(Op::LoadTrue).unwrap();
        b.emit(Op::Pop).unwrap();
        let program = finished(b);
        validate(&program).unwrap();
    }

    #[test]
    fn test_rejects_underflow_inside_block() {
        // Pop then push nets zero per block, which the block-delta walk of
        // the graph pass cannot distinguish from a balanced body.
        let program = Program {
            blocks: vec![BasicBlock {
                ops: vec![Op::Pop, Op::LoadUndefined, Op::LoadUndefined, Op::Return],
                handler: None,
            }],
            ..Program::default()
        };
        assert!(matches!(
            validate(&program),
            Err(Error::StackUnderflow { block: 0, index: 0 })
        ));
    }

    #[test]
    fn test_rejects_swap_on_single_value() {
        let program = Program {
            blocks: vec![BasicBlock {
                ops: vec![Op::LoadNull, Op::Swap, Op::Return],
                handler: None,
            }],
            ..Program::default()
        };
        assert!(matches!(
            validate(&program),
            Err(Error::StackUnderflow { block: 0, index: 1 })
        ));
    }

    #[test]
    fn test_rejects_return_with_extra_values() {
        let program = Program {
            blocks: vec![BasicBlock {
                ops: vec![Op::LoadNull, Op::LoadNull, Op::Return],
                handler: None,
            }],
            ..Program::default()
        };
        assert!(matches!(
            validate(&program),
            Err(Error::UnbalancedExit { block: 0, height: 2 })
        ));
    }

    #[test]
    fn test_rejects_missing_terminator() {
        let program = Program {
            blocks: vec![BasicBlock {
                ops: vec![Op::LoadNull, Op::Pop],
                handler: None,
            }],
            ..Program::default()
        };
        assert!(matches!(validate(&program), Err(Error::MalformedBlock(_))));
    }

    #[test]
    fn test_rejects_conflicting_merge_heights() {
        let mut b = Builder::new(0, 0, false);
        b.emit(Op::LoadTrue).unwrap();
        let one = b.new_block();
        let patch = b.emit_branch_true(one).unwrap();
        let two = b.new_block();
        b.patch_jump(patch, two);
        let join = b.new_block();
        b.switch_to(one);
        b.emit(Op::LoadNull).unwrap();
        b.emit(Op::Jump { target: join }).unwrap();
        b.switch_to(two);
        b.emit(Op::LoadNull).unwrap();
        b.emit(Op::LoadNull).unwrap();
        b.emit(Op::Jump { target: join }).unwrap();
        b.switch_to(join);
        b.emit(Op::Return).unwrap();
        let program = b.finish().unwrap();
        assert!(matches!(
            validate(&program),
            Err(Error::HeightMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_handler_entered_off_height() {
        // a handler block also entered normally with two values on the stack
        let mut b = Builder::new(0, 0, false);
        let body = b.start_block().unwrap();
        let handler = b.new_block();
        b.add_handler(body, body, handler);
        b.emit(Op::LoadNull).unwrap();
        b.emit(Op::LoadNull).unwrap();
        b.emit(Op::Jump { target: handler }).unwrap();
        b.switch_to_handler(handler);
        b.emit(Op::Pop).unwrap();
        b.emit(Op::LoadUndefined).unwrap();
        b.emit(Op::Return).unwrap();
        let program = b.finish().unwrap();
        assert!(matches!(
            validate(&program),
            Err(Error::HeightMismatch { .. })
        ));
    }
}
