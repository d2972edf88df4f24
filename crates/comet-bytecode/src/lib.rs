// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Engine Developers

//! # comet-bytecode
//!
//! The bytecode compiler for the Comet JavaScript engine.
//!
//! ## Overview
//!
//! This crate lowers a scope-resolved syntax tree into stack-machine
//! bytecode:
//! - A closed opcode set where every instruction declares its operand-stack
//!   effect
//! - A basic-block intermediate representation with per-block fault handlers
//! - A tree-to-bytecode lowering pass, including the flattening of generator
//!   bodies into phase-dispatched state machines
//! - A control-flow-graph pass that removes unreachable blocks and proves
//!   stack-height consistency on every path
//! - An instruction-granular validator used as an independent check
//!
//! Lexing, parsing and scope resolution happen upstream: every variable
//! reference in the input tree already carries its resolved binding. The
//! produced [`FunctionInfo`] records are what the runtime materializes into
//! callable closure templates.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use comet_bytecode::{ast, compile_script};
//!
//! let tree: ast::Program = host_frontend::parse_and_resolve(source)?;
//! let info = compile_script(&tree)?;
//! println!("{}", info.program);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;

// Re-exports for convenience
pub use compiler::ir::{BasicBlock, BlockId, FunctionInfo, Program};
pub use compiler::{compile_function, compile_script};

/// Errors that can occur during bytecode compilation.
///
/// Apart from [`Error::Unsupported`], every variant reports a defect in the
/// compiler itself (or in upstream scope resolution), never a property of the
/// input program a user could fix. Compilation of a function either fully
/// succeeds or aborts with the first error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A source construct the compiler deliberately does not implement
    /// (e.g. `finally`, `yield*`). Failing fast here beats miscompiling.
    Unsupported(String),
    /// Two control paths reached the same block with different abstract
    /// stack heights.
    HeightMismatch {
        /// Index of the block where the heights disagreed
        block: u32,
        /// Height recorded by the first path to reach the block
        expected: i32,
        /// Height carried by the conflicting path
        found: i32,
    },
    /// A block with no successors ended with values left on the stack.
    UnbalancedExit {
        /// Index of the offending block
        block: u32,
        /// Stack height at the end of the block
        height: i32,
    },
    /// An instruction would pop more values than the stack holds.
    StackUnderflow {
        /// Index of the block containing the instruction
        block: u32,
        /// Instruction index within the block
        index: usize,
    },
    /// A forward jump was finalized without being patched to a real target.
    UnpatchedJump {
        /// Index of the block whose terminator is unpatched
        block: u32,
    },
    /// A defect in the generator dispatch table: a duplicate phase
    /// registration or a suspend phase with no resume target.
    BadDispatch(String),
    /// A malformed block, e.g. a terminator in the middle of a block or a
    /// reachable block with no terminator at all.
    MalformedBlock(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unsupported(what) => write!(f, "unsupported construct: {}", what),
            Error::HeightMismatch {
                block,
                expected,
                found,
            } => write!(
                f,
                "stack height mismatch at block b{}: expected {}, found {}",
                block, expected, found
            ),
            Error::UnbalancedExit { block, height } => write!(
                f,
                "block b{} has no successors but ends at stack height {}",
                block, height
            ),
            Error::StackUnderflow { block, index } => write!(
                f,
                "stack underflow at block b{} instruction {}",
                block, index
            ),
            Error::UnpatchedJump { block } => {
                write!(f, "unpatched jump target in block b{}", block)
            }
            Error::BadDispatch(msg) => write!(f, "generator dispatch table: {}", msg),
            Error::MalformedBlock(msg) => write!(f, "malformed block: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_height_mismatch() {
        let err = Error::HeightMismatch {
            block: 3,
            expected: 1,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "stack height mismatch at block b3: expected 1, found 2"
        );
    }

    #[test]
    fn test_error_display_unsupported() {
        let err = Error::Unsupported("finally".into());
        assert_eq!(err.to_string(), "unsupported construct: finally");
    }
}
