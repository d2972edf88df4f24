//! Bytecode definitions.
//!
//! Every opcode declares a statically known operand-stack effect via
//! [`Op::stack_effect`]; the abstract-height bookkeeping in the builder, the
//! graph pass and the validator all derive from that single table.

use std::fmt;

use num_bigint::BigInt;

use super::ir::BlockId;

/// The generator phase reserved for an exhausted generator. Its resume block
/// immediately returns `undefined`.
pub const PHASE_EXHAUSTED: u32 = u32::MAX;

/// A value in the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// BigInt
    BigInt(BigInt),
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Number(n) => write!(f, "{}", n),
            Const::String(s) => write!(f, "{:?}", s),
            Const::BigInt(b) => write!(f, "{}n", b),
        }
    }
}

/// The kind of property a `DefineMethod` installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// An ordinary method
    Method,
    /// A getter
    Getter,
    /// A setter
    Setter,
}

/// A single bytecode instruction.
///
/// Immediate operands are constant-pool indices (`c`), local-slot indices
/// (`l`), saved-operand indices, argument counts, nested-function indices and
/// [`BlockId`] jump targets. Jump targets are the only mutable part of an
/// emitted instruction: forward jumps are back-patched once the jumped-to
/// block exists.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // Constants and stack shuffling
    /// Push a constant from the pool
    LoadConst(u16),
    /// Push undefined
    LoadUndefined,
    /// Push null
    LoadNull,
    /// Push true
    LoadTrue,
    /// Push false
    LoadFalse,
    /// Pop the top value
    Pop,
    /// Duplicate the top value
    Dup,
    /// Duplicate the top two values
    Dup2,
    /// Swap the top two values
    Swap,

    // Arithmetic
    /// Add top two values
    Add,
    /// Subtract
    Sub,
    /// Multiply
    Mul,
    /// Divide
    Div,
    /// Remainder
    Mod,
    /// Exponentiation
    Pow,
    /// Negate (unary minus)
    Neg,
    /// ToNumber conversion (unary plus, update operands)
    ToNumber,

    // Comparison
    /// Abstract equality (==)
    Eq,
    /// Abstract inequality (!=)
    Ne,
    /// Strict equality (===)
    StrictEq,
    /// Strict inequality (!==)
    StrictNe,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Logical NOT
    Not,

    // Bitwise
    /// Bitwise AND
    BitAnd,
    /// Bitwise OR
    BitOr,
    /// Bitwise XOR
    BitXor,
    /// Bitwise NOT
    BitNot,
    /// Left shift
    Shl,
    /// Signed right shift
    Shr,
    /// Unsigned right shift
    Ushr,

    // Operators with runtime semantics
    /// typeof operator
    TypeOf,
    /// instanceof operator
    InstanceOf,
    /// in operator
    In,

    // Variables
    /// Push a local slot
    LoadLocal(u16),
    /// Pop into a local slot
    StoreLocal(u16),
    /// Push a slot from an enclosing environment
    LoadEnv {
        /// Slot index within the environment
        index: u16,
        /// Number of environments to walk outward
        depth: u16,
    },
    /// Pop into a slot of an enclosing environment
    StoreEnv {
        /// Slot index within the environment
        index: u16,
        /// Number of environments to walk outward
        depth: u16,
    },
    /// Push a global, name in the constant pool
    LoadGlobal(u16),
    /// Pop into a global, name in the constant pool
    StoreGlobal(u16),

    // Arguments
    /// Push the argument at a fixed index, or undefined
    LoadArgument(u16),
    /// Push an array of the arguments from a fixed index on
    LoadRestArguments(u16),
    /// Push an array of all arguments
    LoadArguments,

    // Properties
    /// Replace an object with a named property of it
    GetProp(u16),
    /// Store `[object, value]` into a named property, leaving the value
    SetProp(u16),
    /// Replace `[object, key]` with the keyed property value
    GetPropDyn,
    /// Store `[object, key, value]` into a keyed property, leaving the value
    SetPropDyn,
    /// Delete a named property, leaving a boolean
    DeleteProp(u16),
    /// Delete `[object, key]`, leaving a boolean
    DeletePropDyn,

    // Objects and arrays
    /// Push a fresh empty object
    NewObject,
    /// Replace the top n values with an array of them
    NewArray(u16),
    /// Append `[array, value]` in place, leaving the array
    Append,
    /// Copy own enumerable properties: `[target, source, excluded]` to
    /// `[target]`, skipping keys listed in the excluded array
    CopyDataProperties,

    // Iteration
    /// Replace an iterable with its iterator
    GetIterator,
    /// Replace an object with an iterator over its enumerable keys
    GetPropertyIterator,
    /// Push the next step object of the iterator below
    IteratorNext,

    // Classes
    /// Build a class object from `[parent?]` and embedded templates
    CreateClass {
        /// Nested-function index of the constructor
        ctor: u16,
        /// Nested-function index of the instance-field initializer
        field_init: Option<u16>,
        /// Whether a parent class is on the stack
        has_parent: bool,
    },
    /// Install `[class, closure]` as a named method, leaving the class
    DefineMethod {
        /// Method name in the constant pool
        name: u16,
        /// Method, getter or setter
        kind: PropertyKind,
        /// Install on the class itself instead of its prototype
        is_static: bool,
    },
    /// Install `[class, key, closure]` as a computed method, leaving the class
    DefineMethodDyn {
        /// Method, getter or setter
        kind: PropertyKind,
        /// Install on the class itself instead of its prototype
        is_static: bool,
    },
    /// Run the class's instance-field initializer against `this`
    InitInstanceFields,

    // Calls
    /// Call `[callee, args..]` with n arguments
    Call(u16),
    /// Call `[receiver, callee, args..]` with n arguments
    CallMethod(u16),
    /// Construct `[callee, args..]` with n arguments
    New(u16),
    /// Call `[callee, args-array]`
    CallVarargs,
    /// Call `[receiver, callee, args-array]`
    CallMethodVarargs,
    /// Construct `[callee, args-array]`
    NewVarargs,
    /// Call the super constructor with n stacked arguments, pushing `this`
    CallSuper(u16),
    /// Call the super constructor with `[args-array]`, pushing `this`
    CallSuperVarargs,

    // Closures
    /// Push a closure over the nested function at an index
    Closure(u16),

    // Generator bookkeeping
    /// Record the current phase in the reserved phase slot
    SetPhase(u32),
    /// Pop into the saved-operand storage at a fixed position
    Stash(u16),
    /// Push from the saved-operand storage at a fixed position
    Unstash(u16),
    /// Push the value supplied by the current resumption
    ResumedValue,

    // Control transfer (terminators)
    /// Unconditional jump
    Jump {
        /// The jumped-to block
        target: BlockId,
    },
    /// Pop a condition and branch on its truthiness
    Branch {
        /// Block taken on a truthy condition
        if_true: BlockId,
        /// Block taken on a falsy condition
        if_false: BlockId,
    },
    /// Pop a phase number and jump through the program's dispatch table
    Dispatch,
    /// Pop a value, suspend, and hand it to the caller
    Yield {
        /// Block where the next resumption continues
        resume: BlockId,
    },
    /// Pop a value, suspend until the awaited operation settles
    Await {
        /// Block where the resumption continues
        resume: BlockId,
    },
    /// Pop the return value and leave the function
    Return,
    /// Pop a value and raise it as a fault
    Throw,
}

impl Op {
    /// Net effect of this instruction on the operand-stack height.
    pub fn stack_effect(&self) -> i32 {
        match self {
            Op::LoadConst(_)
            | Op::LoadUndefined
            | Op::LoadNull
            | Op::LoadTrue
            | Op::LoadFalse
            | Op::Dup
            | Op::LoadLocal(_)
            | Op::LoadEnv { .. }
            | Op::LoadGlobal(_)
            | Op::LoadArgument(_)
            | Op::LoadRestArguments(_)
            | Op::LoadArguments
            | Op::NewObject
            | Op::IteratorNext
            | Op::Closure(_)
            | Op::Unstash(_)
            | Op::ResumedValue => 1,

            Op::Dup2 => 2,

            Op::Swap
            | Op::Neg
            | Op::ToNumber
            | Op::Not
            | Op::BitNot
            | Op::TypeOf
            | Op::GetProp(_)
            | Op::DeleteProp(_)
            | Op::GetIterator
            | Op::GetPropertyIterator
            | Op::InitInstanceFields
            | Op::CallSuperVarargs
            | Op::SetPhase(_)
            | Op::Jump { .. } => 0,

            Op::Pop
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::Pow
            | Op::Eq
            | Op::Ne
            | Op::StrictEq
            | Op::StrictNe
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge
            | Op::BitAnd
            | Op::BitOr
            | Op::BitXor
            | Op::Shl
            | Op::Shr
            | Op::Ushr
            | Op::InstanceOf
            | Op::In
            | Op::StoreLocal(_)
            | Op::StoreEnv { .. }
            | Op::StoreGlobal(_)
            | Op::SetProp(_)
            | Op::GetPropDyn
            | Op::DeletePropDyn
            | Op::Append
            | Op::DefineMethod { .. }
            | Op::CallVarargs
            | Op::NewVarargs
            | Op::Stash(_)
            | Op::Branch { .. }
            | Op::Dispatch
            | Op::Yield { .. }
            | Op::Await { .. }
            | Op::Return
            | Op::Throw => -1,

            Op::SetPropDyn
            | Op::CopyDataProperties
            | Op::DefineMethodDyn { .. }
            | Op::CallMethodVarargs => -2,

            Op::CreateClass { has_parent, .. } => {
                if *has_parent {
                    0
                } else {
                    1
                }
            }

            Op::NewArray(n) => 1 - *n as i32,
            Op::Call(n) | Op::New(n) => -(*n as i32),
            Op::CallMethod(n) => -(*n as i32) - 1,
            Op::CallSuper(n) => 1 - *n as i32,
        }
    }

    /// Whether this instruction transfers control and must end its block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Jump { .. }
                | Op::Branch { .. }
                | Op::Dispatch
                | Op::Yield { .. }
                | Op::Await { .. }
                | Op::Return
                | Op::Throw
        )
    }

    /// Mutable references to the jump targets embedded in this instruction,
    /// in a fixed order. Used for patching and for block renumbering.
    pub fn targets_mut(&mut self) -> Vec<&mut BlockId> {
        match self {
            Op::Jump { target } => vec![target],
            Op::Branch { if_true, if_false } => vec![if_true, if_false],
            Op::Yield { resume } | Op::Await { resume } => vec![resume],
            _ => Vec::new(),
        }
    }

    /// The jump targets embedded in this instruction. Successors of a
    /// `Dispatch` live in the program's dispatch table instead.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Op::Jump { target } => vec![*target],
            Op::Branch { if_true, if_false } => vec![*if_true, *if_false],
            Op::Yield { resume } | Op::Await { resume } => vec![*resume],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::LoadConst(c) => write!(f, "LoadConst c{}", c),
            Op::LoadUndefined => write!(f, "LoadUndefined"),
            Op::LoadNull => write!(f, "LoadNull"),
            Op::LoadTrue => write!(f, "LoadTrue"),
            Op::LoadFalse => write!(f, "LoadFalse"),
            Op::Pop => write!(f, "Pop"),
            Op::Dup => write!(f, "Dup"),
            Op::Dup2 => write!(f, "Dup2"),
            Op::Swap => write!(f, "Swap"),
            Op::Add => write!(f, "Add"),
            Op::Sub => write!(f, "Sub"),
            Op::Mul => write!(f, "Mul"),
            Op::Div => write!(f, "Div"),
            Op::Mod => write!(f, "Mod"),
            Op::Pow => write!(f, "Pow"),
            Op::Neg => write!(f, "Neg"),
            Op::ToNumber => write!(f, "ToNumber"),
            Op::Eq => write!(f, "Eq"),
            Op::Ne => write!(f, "Ne"),
            Op::StrictEq => write!(f, "StrictEq"),
            Op::StrictNe => write!(f, "StrictNe"),
            Op::Lt => write!(f, "Lt"),
            Op::Le => write!(f, "Le"),
            Op::Gt => write!(f, "Gt"),
            Op::Ge => write!(f, "Ge"),
            Op::Not => write!(f, "Not"),
            Op::BitAnd => write!(f, "BitAnd"),
            Op::BitOr => write!(f, "BitOr"),
            Op::BitXor => write!(f, "BitXor"),
            Op::BitNot => write!(f, "BitNot"),
            Op::Shl => write!(f, "Shl"),
            Op::Shr => write!(f, "Shr"),
            Op::Ushr => write!(f, "Ushr"),
            Op::TypeOf => write!(f, "TypeOf"),
            Op::InstanceOf => write!(f, "InstanceOf"),
            Op::In => write!(f, "In"),
            Op::LoadLocal(l) => write!(f, "LoadLocal l{}", l),
            Op::StoreLocal(l) => write!(f, "StoreLocal l{}", l),
            Op::LoadEnv { index, depth } => write!(f, "LoadEnv e{}@{}", index, depth),
            Op::StoreEnv { index, depth } => write!(f, "StoreEnv e{}@{}", index, depth),
            Op::LoadGlobal(c) => write!(f, "LoadGlobal c{}", c),
            Op::StoreGlobal(c) => write!(f, "StoreGlobal c{}", c),
            Op::LoadArgument(i) => write!(f, "LoadArgument {}", i),
            Op::LoadRestArguments(i) => write!(f, "LoadRestArguments {}", i),
            Op::LoadArguments => write!(f, "LoadArguments"),
            Op::GetProp(c) => write!(f, "GetProp c{}", c),
            Op::SetProp(c) => write!(f, "SetProp c{}", c),
            Op::GetPropDyn => write!(f, "GetPropDyn"),
            Op::SetPropDyn => write!(f, "SetPropDyn"),
            Op::DeleteProp(c) => write!(f, "DeleteProp c{}", c),
            Op::DeletePropDyn => write!(f, "DeletePropDyn"),
            Op::NewObject => write!(f, "NewObject"),
            Op::NewArray(n) => write!(f, "NewArray {}", n),
            Op::Append => write!(f, "Append"),
            Op::CopyDataProperties => write!(f, "CopyDataProperties"),
            Op::GetIterator => write!(f, "GetIterator"),
            Op::GetPropertyIterator => write!(f, "GetPropertyIterator"),
            Op::IteratorNext => write!(f, "IteratorNext"),
            Op::CreateClass {
                ctor,
                field_init,
                has_parent,
            } => {
                write!(f, "CreateClass f{}", ctor)?;
                if let Some(init) = field_init {
                    write!(f, " init=f{}", init)?;
                }
                if *has_parent {
                    write!(f, " extends")?;
                }
                Ok(())
            }
            Op::DefineMethod {
                name,
                kind,
                is_static,
            } => {
                write!(f, "DefineMethod c{} {:?}", name, kind)?;
                if *is_static {
                    write!(f, " static")?;
                }
                Ok(())
            }
            Op::DefineMethodDyn { kind, is_static } => {
                write!(f, "DefineMethodDyn {:?}", kind)?;
                if *is_static {
                    write!(f, " static")?;
                }
                Ok(())
            }
            Op::InitInstanceFields => write!(f, "InitInstanceFields"),
            Op::Call(n) => write!(f, "Call {}", n),
            Op::CallMethod(n) => write!(f, "CallMethod {}", n),
            Op::New(n) => write!(f, "New {}", n),
            Op::CallVarargs => write!(f, "CallVarargs"),
            Op::CallMethodVarargs => write!(f, "CallMethodVarargs"),
            Op::NewVarargs => write!(f, "NewVarargs"),
            Op::CallSuper(n) => write!(f, "CallSuper {}", n),
            Op::CallSuperVarargs => write!(f, "CallSuperVarargs"),
            Op::Closure(i) => write!(f, "Closure f{}", i),
            Op::SetPhase(p) => {
                if *p == PHASE_EXHAUSTED {
                    write!(f, "SetPhase exhausted")
                } else {
                    write!(f, "SetPhase {}", p)
                }
            }
            Op::Stash(i) => write!(f, "Stash s{}", i),
            Op::Unstash(i) => write!(f, "Unstash s{}", i),
            Op::ResumedValue => write!(f, "ResumedValue"),
            Op::Jump { target } => write!(f, "Jump {}", target),
            Op::Branch { if_true, if_false } => {
                write!(f, "Branch {} {}", if_true, if_false)
            }
            Op::Dispatch => write!(f, "Dispatch"),
            Op::Yield { resume } => write!(f, "Yield resume={}", resume),
            Op::Await { resume } => write!(f, "Await resume={}", resume),
            Op::Return => write!(f, "Return"),
            Op::Throw => write!(f, "Throw"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_effect_basics() {
        assert_eq!(Op::LoadConst(0).stack_effect(), 1);
        assert_eq!(Op::Pop.stack_effect(), -1);
        assert_eq!(Op::Add.stack_effect(), -1);
        assert_eq!(Op::Swap.stack_effect(), 0);
        assert_eq!(Op::Dup2.stack_effect(), 2);
    }

    #[test]
    fn test_stack_effect_calls() {
        assert_eq!(Op::Call(0).stack_effect(), 0);
        assert_eq!(Op::Call(3).stack_effect(), -3);
        assert_eq!(Op::CallMethod(2).stack_effect(), -3);
        assert_eq!(Op::NewArray(4).stack_effect(), -3);
        assert_eq!(Op::NewArray(0).stack_effect(), 1);
    }

    #[test]
    fn test_terminators() {
        assert!(Op::Return.is_terminator());
        assert!(
            Op::Branch {
                if_true: BlockId(1),
                if_false: BlockId(2),
            }
            .is_terminator()
        );
        assert!(!Op::Add.is_terminator());
        assert!(!Op::SetPhase(1).is_terminator());
    }

    #[test]
    fn test_targets() {
        let op = Op::Branch {
            if_true: BlockId(4),
            if_false: BlockId(7),
        };
        assert_eq!(op.targets(), vec![BlockId(4), BlockId(7)]);
        assert!(Op::Return.targets().is_empty());
    }
}
