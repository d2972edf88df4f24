//! The basic-block intermediate representation.
//!
//! A [`Program`] is one compiled function, script or module body: an indexed
//! collection of [`BasicBlock`]s, a local-slot table, a constant pool, the
//! directly nested function templates and, for generator bodies, the phase
//! dispatch table. Blocks address each other by [`BlockId`]; there is no
//! fall-through between blocks.

use std::fmt;

use rustc_hash::FxHashMap;

use super::bytecode::{Const, Op, PHASE_EXHAUSTED};

/// Local slot reserved for the receiver (`this`).
pub const RECEIVER_SLOT: u16 = 0;
/// Local slot reserved for `new.target`.
pub const NEW_TARGET_SLOT: u16 = 1;
/// Local slot reserved for the saved generator phase (generator/async only).
pub const PHASE_SLOT: u16 = 2;

/// Index identity of a basic block within one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Returns the block's index into the program's block list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// The value kind of a local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A raw number slot
    Number,
    /// A raw boolean slot
    Boolean,
    /// A generic value slot
    Value,
}

/// A maximal straight-line run of opcodes ended by one terminator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicBlock {
    /// The instructions; the last one is the block's sole terminator
    pub ops: Vec<Op>,
    /// Block receiving control when a fault propagates out of this block,
    /// with the raised value as its only stack input
    pub handler: Option<BlockId>,
}

impl BasicBlock {
    /// The block's terminator, if it has been emitted yet.
    pub fn terminator(&self) -> Option<&Op> {
        self.ops.last().filter(|op| op.is_terminator())
    }
}

/// Resume targets of a generator body, keyed by phase number.
pub type DispatchTable = FxHashMap<u32, BlockId>;

/// One compiled function, script or module body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Declared parameter count
    pub param_count: u16,
    /// The blocks; block 0 is the entry
    pub blocks: Vec<BasicBlock>,
    /// Kinds of the local slots, reserved slots included
    pub slots: Vec<SlotKind>,
    /// The constant pool
    pub constants: Vec<Const>,
    /// Directly nested function templates, addressed by `Op::Closure`
    pub inner: Vec<FunctionInfo>,
    /// Phase dispatch table; present only for generator/async bodies
    pub dispatch: Option<DispatchTable>,
    /// High-water mark of the saved-operand storage used around suspensions
    pub saved_operand_count: u16,
}

impl Program {
    /// The entry block.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// The block with the given id.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        for (i, block) in self.blocks.iter().enumerate() {
            write!(f, "{}b{}:", pad, i)?;
            if let Some(handler) = block.handler {
                write!(f, " (handler {})", handler)?;
            }
            writeln!(f)?;
            for op in &block.ops {
                writeln!(f, "{}  {}", pad, op)?;
            }
        }
        if !self.constants.is_empty() {
            writeln!(f, "{}constants:", pad)?;
            for (i, c) in self.constants.iter().enumerate() {
                writeln!(f, "{}  c{} = {}", pad, i, c)?;
            }
        }
        if let Some(dispatch) = &self.dispatch {
            writeln!(f, "{}dispatch:", pad)?;
            let mut phases: Vec<_> = dispatch.iter().collect();
            phases.sort();
            for (phase, target) in phases {
                if *phase == PHASE_EXHAUSTED {
                    writeln!(f, "{}  phase exhausted -> {}", pad, target)?;
                } else {
                    writeln!(f, "{}  phase {} -> {}", pad, phase, target)?;
                }
            }
        }
        for (i, inner) in self.inner.iter().enumerate() {
            writeln!(
                f,
                "{}f{} = function {}:",
                pad,
                i,
                inner.name.as_deref().unwrap_or("<anonymous>")
            )?;
            inner.program.fmt_indented(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    /// Block-by-block disassembly, nested functions indented below.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// The compiled record handed to the runtime for one function body.
///
/// This is the sole artifact the runtime needs to materialize a callable
/// closure template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionInfo {
    /// The function name, if any
    pub name: Option<String>,
    /// The finished program
    pub program: Program,
    /// Whether the body is in strict mode
    pub is_strict: bool,
    /// Declared parameter count
    pub param_count: u16,
    /// Whether this is a top-level script body rather than a function body
    pub is_script: bool,
}

impl fmt::Display for FunctionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_script { "script" } else { "function" };
        writeln!(
            f,
            "{} {} (params: {}, slots: {}):",
            kind,
            self.name.as_deref().unwrap_or("<anonymous>"),
            self.param_count,
            self.program.slots.len()
        )?;
        self.program.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_display() {
        assert_eq!(BlockId(7).to_string(), "b7");
    }

    #[test]
    fn test_terminator_accessor() {
        let mut block = BasicBlock::default();
        assert!(block.terminator().is_none());
        block.ops.push(Op::LoadUndefined);
        assert!(block.terminator().is_none());
        block.ops.push(Op::Return);
        assert_eq!(block.terminator(), Some(&Op::Return));
    }

    #[test]
    fn test_disassembly_renders_blocks() {
        let program = Program {
            blocks: vec![BasicBlock {
                ops: vec![Op::LoadUndefined, Op::Return],
                handler: None,
            }],
            constants: vec![Const::Number(42.0)],
            ..Program::default()
        };
        let text = program.to_string();
        assert!(text.contains("b0:"));
        assert!(text.contains("LoadUndefined"));
        assert!(text.contains("c0 = 42"));
    }
}
