//! Bytecode verification
//!
//! Static checks a caller can run before handing a program to the VM. The
//! verifier decodes the whole instruction stream and checks that every jump
//! lands on an instruction boundary; it does not track stack depth, since
//! loops and `in` make the depth data-dependent.

use crate::encoder::{BytecodeReader, DecodeError, Instruction, Operand};
use std::collections::HashSet;

/// Bytecode verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Invalid opcode
    #[error("Invalid opcode {opcode:#x} at offset {offset}")]
    InvalidOpcode {
        /// Offending byte
        opcode: u8,
        /// Offset of the byte
        offset: usize,
    },

    /// Invalid register operand
    #[error("Invalid register {register} at offset {offset}")]
    InvalidRegister {
        /// Offending register byte
        register: u8,
        /// Offset of the byte
        offset: usize,
    },

    /// Instruction cut off by the end of the program
    #[error("Truncated instruction at offset {0}")]
    Truncated(usize),

    /// Invalid jump target
    #[error("Invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// Jump target
        target: usize,
        /// Offset of the jump instruction
        offset: usize,
    },
}

impl From<DecodeError> for VerifyError {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::InvalidOpcode(opcode, offset) => Self::InvalidOpcode { opcode, offset },
            DecodeError::InvalidRegister(register, offset) => {
                Self::InvalidRegister { register, offset }
            }
            DecodeError::UnexpectedEnd(offset) | DecodeError::PatchOutOfBounds(offset, _) => {
                Self::Truncated(offset)
            }
        }
    }
}

/// Summary of a verified program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSummary {
    /// Number of decoded instructions
    pub instructions: usize,
    /// Number of jump instructions
    pub jumps: usize,
    /// Whether an explicit `end` instruction is present
    pub has_end: bool,
}

/// Verify a program's bytecode
///
/// A jump target equal to the program length is accepted: the VM halts there.
pub fn verify_program(code: &[u8]) -> Result<ProgramSummary, VerifyError> {
    let instructions = BytecodeReader::new(code).collect::<Result<Vec<Instruction>, _>>()?;
    let boundaries: HashSet<usize> = instructions.iter().map(|instr| instr.offset).collect();

    let mut jumps = 0;
    for instr in &instructions {
        if let Operand::Target(target) = instr.operand {
            jumps += 1;
            let target = target as usize;
            if target != code.len() && !boundaries.contains(&target) {
                return Err(VerifyError::InvalidJumpTarget {
                    target,
                    offset: instr.offset,
                });
            }
        }
    }

    Ok(ProgramSummary {
        instructions: instructions.len(),
        jumps,
        has_end: instructions
            .iter()
            .any(|instr| instr.opcode == crate::Opcode::End),
    })
}
