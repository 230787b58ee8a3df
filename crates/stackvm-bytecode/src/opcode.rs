//! Bytecode opcodes for the StackVM
//!
//! This module defines the instruction set, the packed conditional-jump family,
//! the register names and the mnemonic table used by the assembler.

use std::fmt;

/// Value added to `push`/`pop`/`in` when a register operand follows them.
///
/// `push` (1) becomes push-register (11), `pop` (2) becomes pop-to-register (12)
/// and `in` (3) becomes load-register-const (13).
pub const REGISTER_OFFSET: u8 = 10;

/// Fixed top nibble shared by every jump opcode (`0110`, ASCII `'j'` & 0xF0).
pub const JUMP_PREFIX: u8 = 0b0110_0000;

/// Mask selecting the fixed nibble of a jump opcode.
pub const JUMP_PREFIX_MASK: u8 = 0b1111_0000;

/// Widest encoded instruction: one opcode byte plus a 4-byte constant.
pub const MAX_INSTRUCTION_WIDTH: usize = 5;

/// Predicate bits carried in the low nibble of a jump opcode.
pub mod predicate {
    /// `<`
    pub const LESS: u8 = 0b1000;
    /// `=` in first position (the first `=` of `==`)
    pub const EQUAL_FIRST: u8 = 0b0100;
    /// `>`
    pub const MORE: u8 = 0b0010;
    /// `=` in second position (`<=`, `>=`, `==`, `!=`)
    pub const EQUAL_SECOND: u8 = 0b0001;
}

/// Condition tested by a jump instruction.
///
/// Conditional jumps pop `b` and then `a` and take the branch when `a <cond> b`
/// holds, so `push 1; push 2; jb label` jumps because `1 < 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpCondition {
    /// `jmp`: always taken, pops nothing
    Unconditional,
    /// `ja`: `a > b`
    GreaterThan,
    /// `jae`: `a >= b`
    GreaterOrEqual,
    /// `jb`: `a < b`
    LessThan,
    /// `jbe`: `a <= b`
    LessOrEqual,
    /// `je`: `a == b`
    Equal,
    /// `jne`: `a != b`
    NotEqual,
}

impl JumpCondition {
    /// Every jump condition, in mnemonic-table order.
    pub const ALL: [JumpCondition; 7] = [
        Self::Unconditional,
        Self::GreaterThan,
        Self::GreaterOrEqual,
        Self::LessThan,
        Self::LessOrEqual,
        Self::Equal,
        Self::NotEqual,
    ];

    /// Low-nibble predicate bits of this condition.
    pub const fn predicate_bits(self) -> u8 {
        use predicate::*;
        match self {
            Self::Unconditional => LESS | MORE,
            Self::GreaterThan => MORE,
            Self::GreaterOrEqual => MORE | EQUAL_SECOND,
            Self::LessThan => LESS,
            Self::LessOrEqual => LESS | EQUAL_SECOND,
            Self::Equal => EQUAL_FIRST | EQUAL_SECOND,
            Self::NotEqual => LESS | MORE | EQUAL_SECOND,
        }
    }

    /// Encode as a single opcode byte.
    #[inline]
    pub const fn encode(self) -> u8 {
        JUMP_PREFIX | self.predicate_bits()
    }

    /// Decode a jump opcode byte.
    ///
    /// Returns `None` when the fixed nibble is missing or when the predicate
    /// bits are not one of the seven encodings produced by [`encode`](Self::encode).
    pub fn decode(byte: u8) -> Option<Self> {
        if byte & JUMP_PREFIX_MASK != JUMP_PREFIX {
            return None;
        }
        let bits = byte & !JUMP_PREFIX_MASK;
        Self::ALL
            .into_iter()
            .find(|condition| condition.predicate_bits() == bits)
    }

    /// Whether the jump pops two operands before branching.
    #[inline]
    pub fn pops_operands(self) -> bool {
        !matches!(self, Self::Unconditional)
    }

    /// Evaluate the condition for operands `a` (pushed first) and `b` (top of stack).
    pub fn evaluate<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            Self::Unconditional => true,
            Self::GreaterThan => a > b,
            Self::GreaterOrEqual => a >= b,
            Self::LessThan => a < b,
            Self::LessOrEqual => a <= b,
            Self::Equal => a == b,
            Self::NotEqual => a != b,
        }
    }

    /// Assembly mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Unconditional => "jmp",
            Self::GreaterThan => "ja",
            Self::GreaterOrEqual => "jae",
            Self::LessThan => "jb",
            Self::LessOrEqual => "jbe",
            Self::Equal => "je",
            Self::NotEqual => "jne",
        }
    }
}

/// One of the four general-purpose registers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Register 0
    Ax = 0,
    /// Register 1
    Bx = 1,
    /// Register 2
    Cx = 2,
    /// Register 3
    Dx = 3,
}

impl Register {
    /// Number of registers in the register file
    pub const COUNT: usize = 4;

    /// All registers by index
    pub const ALL: [Register; 4] = [Self::Ax, Self::Bx, Self::Cx, Self::Dx];

    /// Look up a register by its operand byte.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Look up a register by its assembly name (`ax`, `bx`, `cx`, `dx`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reg| reg.name() == name)
    }

    /// Operand byte of this register
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Assembly name
    pub fn name(self) -> &'static str {
        match self {
            Self::Ax => "ax",
            Self::Bx => "bx",
            Self::Cx => "cx",
            Self::Dx => "dx",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bytecode opcode
///
/// All opcodes are single bytes. Some take operands that follow the opcode
/// byte in the bytecode stream:
/// - `Push`: i32 constant (4 bytes, little-endian)
/// - `PushReg`, `PopReg`: register byte
/// - `InRegConst`: register byte, then i32 constant
/// - `Jump`: one target byte (absolute offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Halt execution
    End,
    /// Push i32 constant (operand: i32)
    Push,
    /// Discard top of stack
    Pop,
    /// Read an integer from the input source and push it
    In,
    /// Print top of stack without removing it
    Out,
    /// pop b, pop a, push a + b
    Add,
    /// pop b, pop a, push a - b
    Sub,
    /// pop b, pop a, push a * b
    Mul,
    /// pop b, pop a, push a / b
    Div,
    /// pop a, push trunc(sqrt(a))
    Sqrt,
    /// pop b, pop a, push trunc(a ^ b)
    Pow,
    /// Push register value (operand: register)
    PushReg,
    /// Pop into register (operand: register)
    PopReg,
    /// Store constant into register (operands: register, i32)
    InRegConst,
    /// Conditional or unconditional jump (operand: u8 target)
    Jump(JumpCondition),
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::End),
            1 => Some(Self::Push),
            2 => Some(Self::Pop),
            3 => Some(Self::In),
            4 => Some(Self::Out),
            5 => Some(Self::Add),
            6 => Some(Self::Sub),
            7 => Some(Self::Mul),
            8 => Some(Self::Div),
            9 => Some(Self::Sqrt),
            10 => Some(Self::Pow),
            11 => Some(Self::PushReg),
            12 => Some(Self::PopReg),
            13 => Some(Self::InRegConst),
            _ => JumpCondition::decode(byte).map(Self::Jump),
        }
    }

    /// Convert opcode to byte
    pub fn to_u8(self) -> u8 {
        match self {
            Self::End => 0,
            Self::Push => 1,
            Self::Pop => 2,
            Self::In => 3,
            Self::Out => 4,
            Self::Add => 5,
            Self::Sub => 6,
            Self::Mul => 7,
            Self::Div => 8,
            Self::Sqrt => 9,
            Self::Pow => 10,
            Self::PushReg => 11,
            Self::PopReg => 12,
            Self::InRegConst => 13,
            Self::Jump(condition) => condition.encode(),
        }
    }

    /// Get the human-readable name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::End => "END",
            Self::Push => "PUSH",
            Self::Pop => "POP",
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Sqrt => "SQRT",
            Self::Pow => "POW",
            Self::PushReg => "PUSH_REG",
            Self::PopReg => "POP_REG",
            Self::InRegConst => "IN_REG_CONST",
            Self::Jump(JumpCondition::Unconditional) => "JMP",
            Self::Jump(JumpCondition::GreaterThan) => "JA",
            Self::Jump(JumpCondition::GreaterOrEqual) => "JAE",
            Self::Jump(JumpCondition::LessThan) => "JB",
            Self::Jump(JumpCondition::LessOrEqual) => "JBE",
            Self::Jump(JumpCondition::Equal) => "JE",
            Self::Jump(JumpCondition::NotEqual) => "JNE",
        }
    }

    /// Number of operand bytes following the opcode byte
    pub fn operand_width(self) -> usize {
        match self {
            Self::Push => 4,
            Self::PushReg | Self::PopReg => 1,
            Self::InRegConst => 5,
            Self::Jump(_) => 1,
            _ => 0,
        }
    }

    /// Total encoded width (opcode byte plus operands)
    #[inline]
    pub fn width(self) -> usize {
        1 + self.operand_width()
    }

    /// Check if this opcode is a jump instruction
    #[inline]
    pub fn is_jump(self) -> bool {
        matches!(self, Self::Jump(_))
    }

    /// Register form of this opcode, when a register operand may follow it.
    ///
    /// Applies the [`REGISTER_OFFSET`] reclassification: `Push` → `PushReg`,
    /// `Pop` → `PopReg`, `In` → `InRegConst`.
    pub fn with_register(self) -> Option<Self> {
        match self {
            Self::Push | Self::Pop | Self::In => Self::from_u8(self.to_u8() + REGISTER_OFFSET),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An entry of the assembly mnemonic table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    /// An instruction mnemonic
    Instruction(Opcode),
    /// A register name
    Register(Register),
}

/// Text → code table used by the assembler.
pub const MNEMONICS: &[(&str, Mnemonic)] = &[
    ("push", Mnemonic::Instruction(Opcode::Push)),
    ("pop", Mnemonic::Instruction(Opcode::Pop)),
    ("in", Mnemonic::Instruction(Opcode::In)),
    ("out", Mnemonic::Instruction(Opcode::Out)),
    ("add", Mnemonic::Instruction(Opcode::Add)),
    ("sub", Mnemonic::Instruction(Opcode::Sub)),
    ("mul", Mnemonic::Instruction(Opcode::Mul)),
    ("div", Mnemonic::Instruction(Opcode::Div)),
    ("sqrt", Mnemonic::Instruction(Opcode::Sqrt)),
    ("pow", Mnemonic::Instruction(Opcode::Pow)),
    ("end", Mnemonic::Instruction(Opcode::End)),
    ("jmp", Mnemonic::Instruction(Opcode::Jump(JumpCondition::Unconditional))),
    ("ja", Mnemonic::Instruction(Opcode::Jump(JumpCondition::GreaterThan))),
    ("jae", Mnemonic::Instruction(Opcode::Jump(JumpCondition::GreaterOrEqual))),
    ("jb", Mnemonic::Instruction(Opcode::Jump(JumpCondition::LessThan))),
    ("jbe", Mnemonic::Instruction(Opcode::Jump(JumpCondition::LessOrEqual))),
    ("je", Mnemonic::Instruction(Opcode::Jump(JumpCondition::Equal))),
    ("jne", Mnemonic::Instruction(Opcode::Jump(JumpCondition::NotEqual))),
    ("ax", Mnemonic::Register(Register::Ax)),
    ("bx", Mnemonic::Register(Register::Bx)),
    ("cx", Mnemonic::Register(Register::Cx)),
    ("dx", Mnemonic::Register(Register::Dx)),
];

/// Look up an assembly mnemonic.
pub fn lookup(text: &str) -> Option<Mnemonic> {
    MNEMONICS
        .iter()
        .find(|(name, _)| *name == text)
        .map(|&(_, mnemonic)| mnemonic)
}
