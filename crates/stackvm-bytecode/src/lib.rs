//! StackVM Bytecode Definitions
//!
//! This crate provides the instruction set, the growable bytecode buffer,
//! the compiled program file format and a static verifier for the StackVM.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod encoder;
pub mod opcode;
pub mod program;
pub mod verify;

pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError, Instruction, Operand};
pub use opcode::{lookup, JumpCondition, Mnemonic, Opcode, Register, MNEMONICS};
pub use program::{HeaderFormat, Program, ProgramError, ProgramResult};
pub use verify::{verify_program, ProgramSummary, VerifyError};
