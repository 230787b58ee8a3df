//! Assembly errors

use crate::token::Span;
use thiserror::Error;

/// Result type for assembly
pub type AssembleResult<T> = Result<T, AssembleError>;

/// Errors reported by the assembler. Assembly stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("Unexpected character {char:?} at {span}")]
    UnexpectedCharacter { char: char, span: Span },

    #[error("Unknown mnemonic '{name}' at {span}")]
    UnknownMnemonic { name: String, span: Span },

    #[error("Register '{register}' at {span} does not follow push, pop or in")]
    UnexpectedRegister { register: String, span: Span },

    #[error("'{instruction}' at {span} expects {expected}")]
    MissingOperand {
        instruction: String,
        expected: &'static str,
        span: Span,
    },

    #[error("Invalid constant '{text}' at {span}: not a 32-bit integer")]
    InvalidConstant { text: String, span: Span },

    #[error("Label '{name}' at {span} is already defined at {previous}")]
    DuplicateLabel {
        name: String,
        span: Span,
        previous: Span,
    },

    #[error("Undefined label '{name}' at {span}")]
    UndefinedLabel { name: String, span: Span },

    #[error("Label '{name}' at offset {offset} is out of jump range (max 255), referenced at {span}")]
    LabelOutOfRange {
        name: String,
        offset: usize,
        span: Span,
    },

    #[error("Program of {len} bytes exceeds the limit of {max} bytes")]
    ProgramTooLarge { len: usize, max: usize },

    #[error("Internal assembler error: {message}")]
    Internal { message: String, span: Option<Span> },
}

impl AssembleError {
    /// Source location of the error, if it has one
    pub fn span(&self) -> Option<Span> {
        use AssembleError::*;

        match self {
            UnexpectedCharacter { span, .. }
            | UnknownMnemonic { span, .. }
            | UnexpectedRegister { span, .. }
            | MissingOperand { span, .. }
            | InvalidConstant { span, .. }
            | DuplicateLabel { span, .. }
            | UndefinedLabel { span, .. }
            | LabelOutOfRange { span, .. } => Some(*span),
            Internal { span, .. } => *span,
            ProgramTooLarge { .. } => None,
        }
    }

    /// Stable error code for diagnostics
    pub fn code(&self) -> &'static str {
        use AssembleError::*;

        match self {
            UnexpectedCharacter { .. } => "A0001",
            UnknownMnemonic { .. } => "A0002",
            UnexpectedRegister { .. } => "A0003",
            MissingOperand { .. } => "A0004",
            InvalidConstant { .. } => "A0005",
            DuplicateLabel { .. } => "A0101",
            UndefinedLabel { .. } => "A0102",
            LabelOutOfRange { .. } => "A0103",
            ProgramTooLarge { .. } => "A0201",
            Internal { .. } => "A9999",
        }
    }
}
