//! Generator and async lowering: the phase dispatch prologue and the
//! suspension-point transformation.
//!
//! A suspendable body is flattened into one function with multiple re-entry
//! points. Every `yield`/`await` is a phase boundary: the current phase is
//! recorded into the reserved phase slot, every live operand-stack value is
//! spilled into the saved-operand storage (indexed by absolute stack
//! position, which keeps nested suspensions collision-free), and a
//! `Yield`/`Await` terminator hands the argument to the caller. The
//! registered resume block restores the spilled operands and pushes the
//! externally supplied resume value as the expression's result.

use crate::Error;
use crate::ast;

use super::Compiler;
use super::super::bytecode::{Op, PHASE_EXHAUSTED};
use super::super::ir::PHASE_SLOT;

impl Compiler {
    /// The prologue every suspendable body starts with: load the saved
    /// phase and jump through the dispatch table. A fresh activation
    /// carries phase 0 and enters the body; an exhausted one immediately
    /// returns undefined.
    pub(super) fn emit_dispatch_prologue(&mut self) -> Result<(), Error> {
        self.b.init_dispatch_table();
        self.b.emit(Op::LoadLocal(PHASE_SLOT))?;
        self.b.emit(Op::Dispatch)?;

        let exhausted = self.b.new_block();
        self.b.switch_to_at(exhausted, 0);
        self.b.emit(Op::LoadUndefined)?;
        self.b.emit(Op::Return)?;
        self.b.add_dispatch_target(PHASE_EXHAUSTED, exhausted)?;

        let body = self.b.new_block();
        self.b.add_dispatch_target(0, body)?;
        self.b.switch_to_at(body, 0);
        Ok(())
    }

    /// Lowers one suspension point. The phase number, the spill count and
    /// the resume-target registration all come from this single place, so
    /// they cannot drift apart.
    pub(super) fn compile_suspend(
        &mut self,
        argument: Option<&ast::Expression>,
        is_await: bool,
    ) -> Result<(), Error> {
        match argument {
            Some(argument) => self.compile_expression(argument)?,
            None => self.b.emit(Op::LoadUndefined)?,
        }
        let phase = self.b.next_phase();
        self.b.emit(Op::SetPhase(phase))?;

        // spill every live value, the argument on top included, then bring
        // the argument back for the suspend itself
        let height = self.b.height() as u16;
        for position in (0..height).rev() {
            self.b.emit(Op::Stash(position))?;
        }
        self.b.emit(Op::Unstash(height - 1))?;
        let resume = self.b.new_block();
        self.b.emit(if is_await {
            Op::Await { resume }
        } else {
            Op::Yield { resume }
        })?;
        self.b.add_dispatch_target(phase, resume)?;

        // re-entry: restore the operand stack, then the sent value
        self.b.switch_to_at(resume, 0);
        for position in 0..height - 1 {
            self.b.emit(Op::Unstash(position))?;
        }
        self.b.emit(Op::ResumedValue)
    }
}
