//! Control-flow-graph construction, dead-block elimination and abstract
//! stack-height propagation.
//!
//! This pass consumes a finished program and runs, in order:
//!
//! 1. Per-block stack deltas are summed from the opcode effects.
//! 2. Successor and predecessor sets are derived from each block's
//!    terminator (and, for `Dispatch`, from the program's dispatch table).
//! 3. Handler targets are marked; a handler block starts at height 1, the
//!    raised value being its only stack input.
//! 4. Blocks unreachable from the entry (via normal or handler edges) are
//!    removed and all block references are renumbered. This is the only
//!    optimization performed, and it runs before the height walk so removed
//!    blocks cannot poison it.
//! 5. Heights are propagated from the entry (height 0) and every handler
//!    seed; a block reached twice with different heights is a fatal
//!    invariant violation, as is a successor-less block ending above 0.
//!
//! A failure here is a defect in the lowering pass, never in user input.

use crate::Error;

use super::bytecode::Op;
use super::ir::{BlockId, Program};

/// Runs dead-block removal and the stack-height check over a finished
/// program. The block list is rewritten in place; instructions are only
/// touched to renumber their jump targets.
pub fn optimize(program: &mut Program) -> Result<(), Error> {
    remove_unreachable_blocks(program);
    check_stack_heights(program)
}

/// Successor blocks of one block, derived from its terminator kind.
fn successors(program: &Program, block: BlockId) -> Vec<BlockId> {
    match program.block(block).terminator() {
        Some(Op::Dispatch) => {
            let Some(dispatch) = &program.dispatch else {
                return Vec::new();
            };
            let mut targets: Vec<BlockId> = dispatch.values().copied().collect();
            targets.sort();
            targets.dedup();
            targets
        }
        Some(op) => op.targets(),
        None => Vec::new(),
    }
}

/// Removes every block not reachable from the entry, following both normal
/// successor edges and handler edges, then renumbers all block references.
fn remove_unreachable_blocks(program: &mut Program) {
    let count = program.blocks.len();
    let mut reachable = vec![false; count];
    let mut worklist = vec![program.entry()];
    while let Some(block) = worklist.pop() {
        if std::mem::replace(&mut reachable[block.index()], true) {
            continue;
        }
        worklist.extend(successors(program, block));
        if let Some(handler) = program.block(block).handler {
            worklist.push(handler);
        }
    }
    if reachable.iter().all(|&r| r) {
        return;
    }

    // Renumber: old index -> new index for surviving blocks.
    let mut remap = vec![BlockId(u32::MAX); count];
    let mut next = 0u32;
    for (index, &live) in reachable.iter().enumerate() {
        if live {
            remap[index] = BlockId(next);
            next += 1;
        }
    }

    let mut index = 0;
    program.blocks.retain(|_| {
        let keep = reachable[index];
        index += 1;
        keep
    });
    for block in &mut program.blocks {
        for op in &mut block.ops {
            for target in op.targets_mut() {
                *target = remap[target.index()];
            }
        }
        if let Some(handler) = &mut block.handler {
            *handler = remap[handler.index()];
        }
    }
    if let Some(dispatch) = &mut program.dispatch {
        for target in dispatch.values_mut() {
            *target = remap[target.index()];
        }
    }
}

/// Walks every block from the entry, propagating the abstract stack height
/// and demanding agreement at every merge point. Assumes unreachable blocks
/// were already removed.
fn check_stack_heights(program: &Program) -> Result<(), Error> {
    let count = program.blocks.len();
    let mut deltas = vec![0i32; count];
    for (index, block) in program.blocks.iter().enumerate() {
        deltas[index] = block.ops.iter().map(Op::stack_effect).sum();
    }

    let mut entry_heights: Vec<Option<i32>> = vec![None; count];
    let mut worklist = Vec::new();

    entry_heights[program.entry().index()] = Some(0);
    worklist.push(program.entry());

    // Handler blocks start with exactly the raised value on the stack.
    for block in &program.blocks {
        if let Some(handler) = block.handler {
            match entry_heights[handler.index()] {
                None => {
                    entry_heights[handler.index()] = Some(1);
                    worklist.push(handler);
                }
                Some(1) => {}
                Some(found) => {
                    return Err(Error::HeightMismatch {
                        block: handler.0,
                        expected: 1,
                        found,
                    });
                }
            }
        }
    }

    let mut visited = vec![false; count];
    while let Some(block) = worklist.pop() {
        if std::mem::replace(&mut visited[block.index()], true) {
            continue;
        }
        let entry = entry_heights[block.index()]
            .expect("every worklist block has a seeded or inherited height");
        let exit = entry + deltas[block.index()];
        for successor in successors(program, block) {
            match entry_heights[successor.index()] {
                None => {
                    entry_heights[successor.index()] = Some(exit);
                    worklist.push(successor);
                }
                Some(expected) if expected == exit => {
                    if !visited[successor.index()] {
                        worklist.push(successor);
                    }
                }
                Some(expected) => {
                    return Err(Error::HeightMismatch {
                        block: successor.0,
                        expected,
                        found: exit,
                    });
                }
            }
        }
    }

    // A block nothing flows out of must leave the stack empty.
    for (index, _) in program.blocks.iter().enumerate() {
        let block = BlockId(index as u32);
        if successors(program, block).is_empty() {
            let entry = entry_heights[index].unwrap_or(0);
            let height = entry + deltas[index];
            if height != 0 {
                return Err(Error::UnbalancedExit {
                    block: block.0,
                    height,
                });
            }
        }
    }

    Ok(())
}
