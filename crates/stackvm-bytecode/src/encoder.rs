//! Bytecode encoding and decoding utilities
//!
//! [`BytecodeWriter`] is the growable program buffer the assembler emits into;
//! [`BytecodeReader`] decodes instructions back out of a finished program.
//! All multi-byte values use a fixed-width little-endian encoding.

use crate::opcode::{JumpCondition, Opcode, Register, MAX_INSTRUCTION_WIDTH};
use thiserror::Error;

/// Physical capacity of a freshly created program buffer
pub const MIN_CAPACITY: usize = 16;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#04x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Invalid register operand
    #[error("Invalid register {0} at offset {1}")]
    InvalidRegister(u8, usize),

    /// Write outside the emitted part of the buffer
    #[error("Patch offset {0} is outside the emitted bytecode (length {1})")]
    PatchOutOfBounds(usize, usize),
}

/// Bytecode writer for encoding instructions
///
/// Keeps a zero-filled physical buffer whose capacity doubles whenever fewer
/// than [`MAX_INSTRUCTION_WIDTH`] bytes of headroom remain, so an instruction
/// never straddles a reallocation. Bytes past the logical length read as
/// `END`.
#[derive(Debug, Clone)]
pub struct BytecodeWriter {
    /// Physical buffer, always `capacity` bytes long
    buffer: Vec<u8>,
    /// Number of emitted bytes
    len: usize,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    /// Create a new bytecode writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity.max(MAX_INSTRUCTION_WIDTH + 1)],
            len: 0,
        }
    }

    /// Get the emitted bytecode
    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Consume the writer and return the emitted bytecode
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buffer.truncate(self.len);
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.len
    }

    /// Physical capacity of the buffer
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Byte at `offset`, if it has been emitted
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.buffer().get(offset).copied()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.fill(0);
        self.len = 0;
    }

    /// Double the capacity while fewer than [`MAX_INSTRUCTION_WIDTH`] bytes are free.
    pub fn reserve_instruction(&mut self) {
        while self.buffer.len() - self.len < MAX_INSTRUCTION_WIDTH {
            let doubled = self.buffer.len() * 2;
            self.buffer.resize(doubled, 0);
        }
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.reserve_instruction();
        self.buffer[self.len] = value;
        self.len += 1;
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.reserve_instruction();
        self.buffer[self.len..self.len + 4].copy_from_slice(&value.to_le_bytes());
        self.len += 4;
    }

    /// Emit an opcode
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit a register operand
    pub fn emit_register(&mut self, register: Register) {
        self.emit_u8(register.index());
    }

    /// Emit a zero placeholder byte and return its offset for later patching
    pub fn emit_placeholder(&mut self) -> usize {
        let offset = self.len;
        self.emit_u8(0);
        offset
    }

    // ===== Instructions =====

    /// Emit PUSH instruction with a constant
    pub fn emit_push(&mut self, value: i32) {
        self.emit_opcode(Opcode::Push);
        self.emit_i32(value);
    }

    /// Emit PUSH_REG instruction
    pub fn emit_push_reg(&mut self, register: Register) {
        self.emit_opcode(Opcode::PushReg);
        self.emit_register(register);
    }

    /// Emit POP_REG instruction
    pub fn emit_pop_reg(&mut self, register: Register) {
        self.emit_opcode(Opcode::PopReg);
        self.emit_register(register);
    }

    /// Emit IN_REG_CONST instruction
    pub fn emit_in_reg_const(&mut self, register: Register, value: i32) {
        self.emit_opcode(Opcode::InRegConst);
        self.emit_register(register);
        self.emit_i32(value);
    }

    /// Emit a jump with an already known target
    pub fn emit_jump(&mut self, condition: JumpCondition, target: u8) {
        self.emit_opcode(Opcode::Jump(condition));
        self.emit_u8(target);
    }

    // ===== Patching =====

    /// Overwrite an already emitted byte
    pub fn patch_u8(&mut self, offset: usize, value: u8) -> Result<(), DecodeError> {
        if offset >= self.len {
            return Err(DecodeError::PatchOutOfBounds(offset, self.len));
        }
        self.buffer[offset] = value;
        Ok(())
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Operand carried by a decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// i32 constant
    Const(i32),
    /// Register index
    Register(Register),
    /// Register followed by an i32 constant
    RegisterConst(Register, i32),
    /// Absolute jump target
    Target(u8),
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte
    pub offset: usize,
    /// Decoded opcode
    pub opcode: Opcode,
    /// Decoded operand
    pub operand: Operand,
}

impl Instruction {
    /// Offset of the instruction that follows this one
    pub fn next_offset(&self) -> usize {
        self.offset + self.opcode.width()
    }
}

/// Bytecode reader for decoding instructions
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new bytecode reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the remaining bytes in the buffer
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Seek to a specific position
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self
            .position
            .checked_add(N)
            .filter(|&end| end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buffer[self.position..end]);
        self.position = end;
        Ok(bytes)
    }

    // ===== Basic Reading =====

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let [byte] = self.take::<1>()?;
        Ok(byte)
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    /// Read an opcode
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, self.position - 1))
    }

    /// Read a register operand
    pub fn read_register(&mut self) -> Result<Register, DecodeError> {
        let byte = self.read_u8()?;
        Register::from_index(byte).ok_or(DecodeError::InvalidRegister(byte, self.position - 1))
    }

    /// Decode the instruction at the current position
    pub fn read_instruction(&mut self) -> Result<Instruction, DecodeError> {
        let offset = self.position;
        let opcode = self.read_opcode()?;
        let operand = match opcode {
            Opcode::Push => Operand::Const(self.read_i32()?),
            Opcode::PushReg | Opcode::PopReg => Operand::Register(self.read_register()?),
            Opcode::InRegConst => {
                let register = self.read_register()?;
                Operand::RegisterConst(register, self.read_i32()?)
            }
            Opcode::Jump(_) => Operand::Target(self.read_u8()?),
            _ => Operand::None,
        };
        Ok(Instruction {
            offset,
            opcode,
            operand,
        })
    }
}

impl Iterator for BytecodeReader<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_more() {
            return None;
        }
        let item = self.read_instruction();
        if item.is_err() {
            // Stop after the first malformed instruction
            self.position = self.buffer.len();
        }
        Some(item)
    }
}
