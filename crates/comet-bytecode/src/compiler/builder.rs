//! Append-only construction surface for IR programs.
//!
//! The builder owns the block list, the local-slot table, the constant pool
//! and the generator dispatch table while a function is being lowered. It
//! keeps a running abstract stack height as each opcode is appended; this
//! counter catches local emission bugs immediately, but the authoritative
//! height check is the graph pass, which re-derives heights from scratch on
//! the finished program.
//!
//! Forward jumps are emitted with a placeholder target and patched through
//! [`JumpPatch`] handles once the jumped-to block exists. Finalizing a
//! program with an unpatched target, or registering two resume blocks for
//! one generator phase, reports a compiler defect, not a user error.

use rustc_hash::FxHashMap;

use crate::Error;

use super::bytecode::{Const, Op, PHASE_EXHAUSTED};
use super::ir::{BasicBlock, BlockId, DispatchTable, FunctionInfo, Program, SlotKind};

/// Placeholder for a forward-jump target that has not been patched yet.
const UNPATCHED: BlockId = BlockId(u32::MAX);

/// Interning key for the constant pool. Numbers are keyed by bit pattern so
/// that e.g. `0.0` and `-0.0` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Number(u64),
    String(String),
    BigInt(num_bigint::BigInt),
}

/// Which target field of an emitted instruction a patch rewrites.
#[derive(Debug, Clone, Copy)]
enum PatchArm {
    Target,
    BranchTrue,
    BranchFalse,
}

/// Handle to a forward jump awaiting its target.
#[derive(Debug)]
#[must_use = "an unpatched jump fails finish()"]
pub struct JumpPatch {
    block: BlockId,
    index: usize,
    arm: PatchArm,
}

/// Builds one IR program, append-only.
pub struct Builder {
    blocks: Vec<BasicBlock>,
    current: BlockId,
    terminated: bool,
    height: i32,
    param_count: u16,
    local_base: u16,
    slots: Vec<SlotKind>,
    constants: Vec<Const>,
    interned: FxHashMap<ConstKey, u16>,
    inner: Vec<FunctionInfo>,
    dispatch: Option<DispatchTable>,
    phase_counter: u32,
    saved_operand_count: u16,
}

impl Builder {
    /// Creates a builder for a function with the given parameter and
    /// resolver-assigned local counts. Slots 0 and 1 are reserved for the
    /// receiver and `new.target`; bodies that can suspend reserve a third
    /// slot for the saved phase.
    pub fn new(param_count: u16, local_count: u16, has_phase_slot: bool) -> Self {
        let mut slots = vec![SlotKind::Value, SlotKind::Value];
        if has_phase_slot {
            slots.push(SlotKind::Number);
        }
        let local_base = slots.len() as u16;
        slots.extend(std::iter::repeat_n(SlotKind::Value, local_count as usize));
        Self {
            blocks: vec![BasicBlock::default()],
            current: BlockId(0),
            terminated: false,
            height: 0,
            param_count,
            local_base,
            slots,
            constants: Vec::new(),
            interned: FxHashMap::default(),
            inner: Vec::new(),
            dispatch: None,
            phase_counter: 0,
            saved_operand_count: 0,
        }
    }

    /// The absolute slot of a resolver-assigned (function-relative) index.
    pub fn local_slot(&self, index: u16) -> u16 {
        self.local_base + index
    }

    /// The block currently being appended to.
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// The running abstract stack height at the current position.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Whether the current block already ended in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Appends an opcode at the current position and updates the running
    /// stack height. Appending after a terminator opens a fresh block; such
    /// blocks are unreachable unless jumped to and are removed by the graph
    /// pass.
    pub fn emit(&mut self, op: Op) -> Result<(), Error> {
        if self.terminated {
            let next = self.new_block();
            self.current = next;
            self.terminated = false;
            self.height = 0;
        }
        let height = self.height + op.stack_effect();
        if height < 0 {
            return Err(Error::StackUnderflow {
                block: self.current.0,
                index: self.blocks[self.current.index()].ops.len(),
            });
        }
        if let Op::Stash(slot) = &op {
            self.saved_operand_count = self.saved_operand_count.max(*slot + 1);
        }
        self.terminated = op.is_terminator();
        self.height = height;
        self.blocks[self.current.index()].ops.push(op);
        Ok(())
    }

    /// Creates a new empty block without switching to it.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::default());
        id
    }

    /// Makes a block the current append position, keeping the running
    /// height. The caller is responsible for only switching to blocks whose
    /// entry height equals the running height.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
        self.terminated = false;
    }

    /// Makes a block the current append position and sets the running
    /// height to the block's known entry height.
    pub fn switch_to_at(&mut self, block: BlockId, height: i32) {
        self.current = block;
        self.terminated = false;
        self.height = height;
    }

    /// Switches to a fault-handler block. Handler blocks are entered with
    /// exactly the raised value on the stack, so the running height is 1.
    pub fn switch_to_handler(&mut self, block: BlockId) {
        self.switch_to_at(block, 1);
    }

    /// Number of blocks created so far. Block ids below this count exist.
    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Ends the current block with a jump to a fresh block and switches to
    /// it. Loop heads and other explicit merge points start this way; there
    /// is no fall-through between blocks.
    pub fn start_block(&mut self) -> Result<BlockId, Error> {
        let block = self.new_block();
        self.emit(Op::Jump { target: block })?;
        self.switch_to(block);
        Ok(block)
    }

    /// Allocates a fresh, never-reused local slot.
    pub fn new_local_slot(&mut self, kind: SlotKind) -> u16 {
        let index = self.slots.len() as u16;
        self.slots.push(kind);
        index
    }

    /// Adds a constant, deduplicating against the existing pool.
    pub fn add_constant(&mut self, value: Const) -> u16 {
        let key = match &value {
            Const::Number(n) => ConstKey::Number(n.to_bits()),
            Const::String(s) => ConstKey::String(s.clone()),
            Const::BigInt(b) => ConstKey::BigInt(b.clone()),
        };
        if let Some(&index) = self.interned.get(&key) {
            return index;
        }
        let index = self.constants.len() as u16;
        self.constants.push(value);
        self.interned.insert(key, index);
        index
    }

    /// Adds a string constant, returning its pool index.
    pub fn string_constant(&mut self, s: &str) -> u16 {
        self.add_constant(Const::String(s.to_string()))
    }

    /// Adds a number constant, returning its pool index.
    pub fn number_constant(&mut self, n: f64) -> u16 {
        self.add_constant(Const::Number(n))
    }

    /// Attaches a nested function template, returning its index.
    pub fn add_inner(&mut self, info: FunctionInfo) -> u16 {
        let index = self.inner.len() as u16;
        self.inner.push(info);
        index
    }

    // ========================================================================
    // Jumps and patching
    // ========================================================================

    /// Emits an unconditional jump whose target is patched later.
    pub fn emit_jump_forward(&mut self) -> Result<JumpPatch, Error> {
        self.emit(Op::Jump { target: UNPATCHED })?;
        Ok(self.patch_for_last(PatchArm::Target))
    }

    /// Emits a branch with a known truthy target; the falsy target is
    /// patched later.
    pub fn emit_branch_true(&mut self, if_true: BlockId) -> Result<JumpPatch, Error> {
        self.emit(Op::Branch {
            if_true,
            if_false: UNPATCHED,
        })?;
        Ok(self.patch_for_last(PatchArm::BranchFalse))
    }

    /// Emits a branch with a known falsy target; the truthy target is
    /// patched later.
    pub fn emit_branch_false(&mut self, if_false: BlockId) -> Result<JumpPatch, Error> {
        self.emit(Op::Branch {
            if_true: UNPATCHED,
            if_false,
        })?;
        Ok(self.patch_for_last(PatchArm::BranchTrue))
    }

    /// Emits a branch with both targets patched later.
    pub fn emit_branch_forward(&mut self) -> Result<(JumpPatch, JumpPatch), Error> {
        self.emit(Op::Branch {
            if_true: UNPATCHED,
            if_false: UNPATCHED,
        })?;
        Ok((
            self.patch_for_last(PatchArm::BranchTrue),
            self.patch_for_last(PatchArm::BranchFalse),
        ))
    }

    fn patch_for_last(&self, arm: PatchArm) -> JumpPatch {
        JumpPatch {
            block: self.current,
            index: self.blocks[self.current.index()].ops.len() - 1,
            arm,
        }
    }

    /// Rewrites a forward jump's placeholder to a real target.
    pub fn patch_jump(&mut self, patch: JumpPatch, target: BlockId) {
        let op = &mut self.blocks[patch.block.index()].ops[patch.index];
        let slot = match (op, patch.arm) {
            (Op::Jump { target }, PatchArm::Target) => target,
            (Op::Branch { if_true, .. }, PatchArm::BranchTrue) => if_true,
            (Op::Branch { if_false, .. }, PatchArm::BranchFalse) => if_false,
            (op, _) => unreachable!("patch handle does not match instruction {}", op),
        };
        debug_assert_eq!(*slot, UNPATCHED, "jump target patched twice");
        *slot = target;
    }

    // ========================================================================
    // Handler regions
    // ========================================================================

    /// Registers `handler` for every block in the inclusive id range that
    /// does not already have one. Nested protected regions register first,
    /// so the innermost handler wins.
    pub fn add_handler(&mut self, from: BlockId, to: BlockId, handler: BlockId) {
        for index in from.index()..=to.index() {
            if index == handler.index() {
                continue;
            }
            let block = &mut self.blocks[index];
            if block.handler.is_none() {
                block.handler = Some(handler);
            }
        }
    }

    // ========================================================================
    // Generator dispatch
    // ========================================================================

    /// Creates the empty phase dispatch table. Must be called once before
    /// any resume target is registered.
    pub fn init_dispatch_table(&mut self) {
        debug_assert!(self.dispatch.is_none(), "dispatch table already initialized");
        self.dispatch = Some(DispatchTable::default());
    }

    /// Registers the resume block for a phase. Registering a phase twice is
    /// a defect in the lowering pass and aborts compilation.
    pub fn add_dispatch_target(&mut self, phase: u32, target: BlockId) -> Result<(), Error> {
        let Some(dispatch) = self.dispatch.as_mut() else {
            return Err(Error::BadDispatch(
                "resume target registered before table initialization".into(),
            ));
        };
        if dispatch.insert(phase, target).is_some() {
            return Err(Error::BadDispatch(format!(
                "phase {} registered twice",
                phase
            )));
        }
        Ok(())
    }

    /// Increments and returns the generator phase counter. Phase 0 is the
    /// fresh-entry phase and is never handed out here.
    pub fn next_phase(&mut self) -> u32 {
        self.phase_counter += 1;
        self.phase_counter
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Finalizes the program, checking the builder-level invariants: no
    /// placeholder jump target survives, terminators only end blocks, and
    /// every suspend phase has exactly one registered resume target.
    pub fn finish(self) -> Result<Program, Error> {
        for (index, block) in self.blocks.iter().enumerate() {
            for (i, op) in block.ops.iter().enumerate() {
                if op.is_terminator() && i + 1 != block.ops.len() {
                    return Err(Error::MalformedBlock(format!(
                        "terminator in the middle of block b{}",
                        index
                    )));
                }
                if op.targets().contains(&UNPATCHED) {
                    return Err(Error::UnpatchedJump {
                        block: index as u32,
                    });
                }
            }
        }
        if let Some(dispatch) = &self.dispatch {
            for required in [0, PHASE_EXHAUSTED] {
                if !dispatch.contains_key(&required) {
                    return Err(Error::BadDispatch(format!(
                        "missing required phase {}",
                        if required == PHASE_EXHAUSTED {
                            "exhausted".to_string()
                        } else {
                            required.to_string()
                        }
                    )));
                }
            }
            for block in &self.blocks {
                for op in &block.ops {
                    if let Op::SetPhase(phase) = op {
                        if !dispatch.contains_key(phase) {
                            return Err(Error::BadDispatch(format!(
                                "phase {} has no resume target",
                                phase
                            )));
                        }
                    }
                }
            }
        }
        Ok(Program {
            param_count: self.param_count,
            blocks: self.blocks,
            slots: self.slots,
            constants: self.constants,
            inner: self.inner,
            dispatch: self.dispatch,
            saved_operand_count: self.saved_operand_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_allocation_is_monotonic() {
        let mut b = Builder::new(0, 2, false);
        let first = b.new_local_slot(SlotKind::Value);
        let second = b.new_local_slot(SlotKind::Number);
        assert_eq!(first, 4); // 2 reserved + 2 resolver slots
        assert_eq!(second, 5);
        assert_eq!(b.local_slot(0), 2);
    }

    #[test]
    fn test_phase_slot_reserved_for_generators() {
        let b = Builder::new(0, 1, true);
        assert_eq!(b.local_slot(0), 3);
    }

    #[test]
    fn test_constant_interning() {
        let mut b = Builder::new(0, 0, false);
        let a = b.number_constant(1.0);
        let s = b.string_constant("x");
        assert_eq!(b.number_constant(1.0), a);
        assert_eq!(b.string_constant("x"), s);
        assert_ne!(a, s);
        // -0.0 and 0.0 differ by bit pattern
        assert_ne!(b.number_constant(0.0), b.number_constant(-0.0));
    }

    #[test]
    fn test_forward_jump_patched() {
        let mut b = Builder::new(0, 0, false);
        let patch = b.emit_jump_forward().unwrap();
        let target = b.new_block();
        b.patch_jump(patch, target);
        b.switch_to(target);
        b.emit(Op::LoadUndefined).unwrap();
        b.emit(Op::Return).unwrap();
        let program = b.finish().unwrap();
        assert_eq!(
            program.blocks[0].ops[0],
            Op::Jump { target: BlockId(1) }
        );
    }

    #[test]
    fn test_unpatched_jump_rejected() {
        let mut b = Builder::new(0, 0, false);
        let _patch = b.emit_jump_forward().unwrap();
        assert!(matches!(
            b.finish(),
            Err(Error::UnpatchedJump { block: 0 })
        ));
    }

    #[test]
    fn test_stack_underflow_detected() {
        let mut b = Builder::new(0, 0, false);
        assert!(matches!(
            b.emit(Op::Pop),
            Err(Error::StackUnderflow { block: 0, index: 0 })
        ));
    }

    #[test]
    fn test_emit_after_terminator_opens_dead_block() {
        let mut b = Builder::new(0, 0, false);
        b.emit(Op::LoadUndefined).unwrap();
        b.emit(Op::Return).unwrap();
        b.emit(Op::LoadNull).unwrap();
        assert_eq!(b.current_block(), BlockId(1));
    }

    #[test]
    fn test_duplicate_phase_rejected() {
        let mut b = Builder::new(0, 0, true);
        b.init_dispatch_table();
        b.add_dispatch_target(1, BlockId(0)).unwrap();
        assert!(matches!(
            b.add_dispatch_target(1, BlockId(0)),
            Err(Error::BadDispatch(_))
        ));
    }

    #[test]
    fn test_set_phase_without_target_rejected() {
        let mut b = Builder::new(0, 0, true);
        b.init_dispatch_table();
        let entry = b.current_block();
        b.add_dispatch_target(0, entry).unwrap();
        let exhausted = b.new_block();
        b.add_dispatch_target(PHASE_EXHAUSTED, exhausted).unwrap();
        b.emit(Op::SetPhase(3)).unwrap();
        b.emit(Op::LoadUndefined).unwrap();
        b.emit(Op::Return).unwrap();
        assert!(matches!(b.finish(), Err(Error::BadDispatch(_))));
    }

    #[test]
    fn test_branch_patching_both_arms() {
        let mut b = Builder::new(0, 0, false);
        b.emit(Op::LoadTrue).unwrap();
        let (true_patch, false_patch) = b.emit_branch_forward().unwrap();
        let then_block = b.new_block();
        let else_block = b.new_block();
        b.patch_jump(true_patch, then_block);
        b.patch_jump(false_patch, else_block);
        for block in [then_block, else_block] {
            b.switch_to_at(block, 0);
            b.emit(Op::LoadUndefined).unwrap();
            b.emit(Op::Return).unwrap();
        }
        let program = b.finish().unwrap();
        assert_eq!(
            program.blocks[0].ops.last(),
            Some(&Op::Branch {
                if_true: then_block,
                if_false: else_block,
            })
        );
    }
}
