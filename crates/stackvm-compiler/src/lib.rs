//! StackVM Assembler - assembly text to bytecode
//!
//! Source is a whitespace-separated stream of mnemonics, register names,
//! integer constants and `name:` label definitions:
//!
//! ```text
//! push 5; push 5
//! je equal        # jumps: 5 == 5
//! push 0; out; end
//! equal: push 1; out; end
//! ```
//!
//! [`assemble`] runs the lexer and both assembler passes and returns the
//! finished [`Program`](stackvm_bytecode::Program).

pub mod assembler;
pub mod error;
pub mod labels;
pub mod lexer;
pub mod token;

pub use assembler::{assemble, AssembleOptions, Assembler, Assembly};
pub use error::{AssembleError, AssembleResult};
pub use labels::{Label, LabelTable};
pub use lexer::{LexError, Lexer};
pub use token::{Span, Token};
