//! StackVM Core Runtime
//!
//! This crate provides the virtual machine runtime:
//! - Integrity-checked operand stack ([`GuardedStack`])
//! - Four-slot register file
//! - Bytecode interpreter ([`Vm`])
//! - Levelled stderr logging macros

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod log;
pub mod stack;
pub mod vm;

pub use stack::{
    DumpSink, ErrorCode, GuardedStack, StackElement, StackError, StackOptions, StackResult,
};
pub use vm::{Registers, StepOutcome, Trap, Vm, VmOptions};

use stackvm_bytecode::DecodeError;

/// VM execution errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Operand stack failure
    #[error("Stack error: {0}")]
    Stack(#[from] StackError),

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Operand outside the domain of an operation
    #[error("Domain error: {op} is undefined for {operands}")]
    Domain {
        /// Operation name
        op: &'static str,
        /// Offending operands
        operands: String,
    },

    /// Result does not fit an i32
    #[error("Overflow: {op} result {value} does not fit in i32")]
    Overflow {
        /// Operation name
        op: &'static str,
        /// Untruncated result
        value: f64,
    },

    /// Invalid opcode
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// Register operand out of range
    #[error("Invalid register: {0}")]
    InvalidRegister(u8),

    /// Jump target past the end of the program
    #[error("Jump target {target} is outside the program (length {len})")]
    JumpOutOfBounds {
        /// Jump target
        target: usize,
        /// Program length
        len: usize,
    },

    /// Operand bytes cut off by the end of the program
    #[error("Truncated operand at offset {0}")]
    TruncatedOperand(usize),

    /// Input source ran dry
    #[error("Input exhausted while reading an integer")]
    InputExhausted,

    /// Input token is not an i32
    #[error("Invalid input: {0:?} is not an integer")]
    InvalidInput(String),

    /// I/O failure on the input or output stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DecodeError> for VmError {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::InvalidOpcode(byte, _) => VmError::InvalidOpcode(byte),
            DecodeError::InvalidRegister(index, _) => VmError::InvalidRegister(index),
            DecodeError::UnexpectedEnd(offset) | DecodeError::PatchOutOfBounds(offset, _) => {
                VmError::TruncatedOperand(offset)
            }
        }
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
