//! Bytecode compiler for JavaScript.
//!
//! Transforms a scope-resolved AST into verified stack-machine bytecode.
//!
//! # Module Structure
//!
//! - `bytecode`: Opcode definitions and the constant pool
//! - `ir`: Basic blocks, programs and the compiled function record
//! - `builder`: Append-only program construction with jump patching
//! - `codegen`: The tree-to-bytecode lowering pass
//! - `cfg`: Control-flow-graph construction, dead-block removal and
//!   stack-height propagation
//! - `validate`: Independent instruction-granular re-check of the stack
//!   invariants

pub mod builder;
pub mod bytecode;
pub mod cfg;
pub mod codegen;
pub mod ir;
pub mod validate;

pub use builder::{Builder, JumpPatch};
pub use bytecode::{Const, Op, PHASE_EXHAUSTED, PropertyKind};
pub use codegen::{compile_function, compile_script};
pub use ir::{BasicBlock, BlockId, DispatchTable, FunctionInfo, Program, SlotKind};
