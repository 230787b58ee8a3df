//! Two-pass assembler
//!
//! Pass 1 walks the token stream once, emitting bytecode and recording label
//! offsets; jumps get a placeholder target byte. Pass 2 walks the same tokens
//! with a cursor that advances by the same widths and patches every
//! placeholder with the resolved label offset.
//!
//! Token widths shared by both passes:
//!
//! | token                        | bytes |
//! |------------------------------|-------|
//! | mnemonic or register name    | 1     |
//! | integer constant             | 4     |
//! | jump mnemonic + label name   | 2     |
//! | label definition             | 0     |

use crate::error::{AssembleError, AssembleResult};
use crate::labels::LabelTable;
use crate::lexer::{LexError, Lexer};
use crate::token::{Span, Token};
use stackvm_bytecode::{lookup, BytecodeWriter, Mnemonic, Opcode, Program, Register};

/// Assembler configuration
#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Reject programs longer than this many bytes
    pub max_program_len: Option<usize>,
}

/// Output of a successful assembly
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Finished bytecode
    pub program: Program,
    /// Labels defined in the source
    pub labels: LabelTable,
}

/// Assemble `source` with default options
pub fn assemble(source: &str) -> AssembleResult<Program> {
    Assembler::new(source, AssembleOptions::default())
        .assemble()
        .map(|assembly| assembly.program)
}

/// Assembles one source text
pub struct Assembler<'a> {
    source: &'a str,
    options: AssembleOptions,
}

impl<'a> Assembler<'a> {
    /// Create an assembler
    pub fn new(source: &'a str, options: AssembleOptions) -> Self {
        Self { source, options }
    }

    /// Run both passes
    pub fn assemble(self) -> AssembleResult<Assembly> {
        let tokens = Lexer::new(self.source)
            .tokenize()
            .map_err(first_lex_error)?;

        let (mut writer, labels) = emit(&tokens)?;
        resolve(&tokens, &mut writer, &labels)?;

        let program = Program::from(writer);
        if let Some(max) = self.options.max_program_len {
            if program.len() > max {
                return Err(AssembleError::ProgramTooLarge {
                    len: program.len(),
                    max,
                });
            }
        }

        Ok(Assembly { program, labels })
    }
}

fn first_lex_error(errors: Vec<LexError>) -> AssembleError {
    match errors.into_iter().next() {
        Some(LexError::UnexpectedCharacter { char, span }) => {
            AssembleError::UnexpectedCharacter { char, span }
        }
        None => AssembleError::Internal {
            message: "lexer failed without reporting an error".to_string(),
            span: None,
        },
    }
}

fn is_register(token: Option<&(Token, Span)>) -> bool {
    matches!(token, Some((Token::Word(word), _)) if Register::from_name(word).is_some())
}

fn is_number(token: Option<&(Token, Span)>) -> bool {
    matches!(token, Some((Token::Number(_), _)))
}

fn parse_constant(text: &str, span: Span) -> AssembleResult<i32> {
    text.parse::<i32>()
        .map_err(|_| AssembleError::InvalidConstant {
            text: text.to_string(),
            span,
        })
}

/// Pass 1: emit bytecode and collect label definitions.
fn emit(tokens: &[(Token, Span)]) -> AssembleResult<(BytecodeWriter, LabelTable)> {
    let mut writer = BytecodeWriter::new();
    let mut labels = LabelTable::new();
    // Offset of a push/pop/in byte that a register token may still reclassify
    let mut reclassifiable: Option<usize> = None;

    let mut i = 0;
    while i < tokens.len() {
        let (token, span) = &tokens[i];
        let span = *span;
        let pending = reclassifiable.take();

        match token {
            Token::LabelDef(name) => labels.define(name, writer.offset(), span)?,
            Token::Number(text) => writer.emit_i32(parse_constant(text, span)?),
            Token::Word(word) => match lookup(word) {
                Some(Mnemonic::Instruction(Opcode::Jump(condition))) => {
                    writer.emit_opcode(Opcode::Jump(condition));
                    writer.emit_placeholder();
                    // The label name is resolved in pass 2
                    match tokens.get(i + 1) {
                        Some((Token::Word(_), _)) => i += 1,
                        _ => {
                            return Err(AssembleError::MissingOperand {
                                instruction: word.clone(),
                                expected: "a label name",
                                span,
                            })
                        }
                    }
                }
                Some(Mnemonic::Instruction(opcode)) => {
                    let offset = writer.offset();
                    writer.emit_opcode(opcode);

                    let next = tokens.get(i + 1);
                    if opcode == Opcode::Push && !is_number(next) && !is_register(next) {
                        return Err(AssembleError::MissingOperand {
                            instruction: word.clone(),
                            expected: "a constant or a register",
                            span,
                        });
                    }
                    if opcode.with_register().is_some() {
                        reclassifiable = Some(offset);
                    }
                }
                Some(Mnemonic::Register(register)) => {
                    let offset = pending.ok_or_else(|| AssembleError::UnexpectedRegister {
                        register: word.clone(),
                        span,
                    })?;
                    let opcode = reclassify(&mut writer, offset, span)?;
                    writer.emit_register(register);

                    if opcode == Opcode::InRegConst && !is_number(tokens.get(i + 1)) {
                        return Err(AssembleError::MissingOperand {
                            instruction: format!("in {}", register),
                            expected: "a constant",
                            span,
                        });
                    }
                }
                None => {
                    return Err(AssembleError::UnknownMnemonic {
                        name: word.clone(),
                        span,
                    })
                }
            },
        }

        i += 1;
    }

    Ok((writer, labels))
}

/// Add the register offset to the instruction byte at `offset`.
fn reclassify(writer: &mut BytecodeWriter, offset: usize, span: Span) -> AssembleResult<Opcode> {
    let internal = |message: String| AssembleError::Internal {
        message,
        span: Some(span),
    };

    let opcode = writer
        .byte_at(offset)
        .and_then(Opcode::from_u8)
        .and_then(Opcode::with_register)
        .ok_or_else(|| internal(format!("no reclassifiable instruction at offset {}", offset)))?;
    writer
        .patch_u8(offset, opcode.to_u8())
        .map_err(|err| internal(err.to_string()))?;
    Ok(opcode)
}

/// Pass 2: patch jump placeholders with label offsets.
fn resolve(
    tokens: &[(Token, Span)],
    writer: &mut BytecodeWriter,
    labels: &LabelTable,
) -> AssembleResult<()> {
    let mut cursor = 0;

    let mut i = 0;
    while i < tokens.len() {
        let (token, span) = &tokens[i];
        match token {
            Token::LabelDef(_) => {}
            Token::Number(_) => cursor += 4,
            Token::Word(word) => match lookup(word) {
                Some(Mnemonic::Instruction(Opcode::Jump(_))) => {
                    let internal = |message: String| AssembleError::Internal {
                        message,
                        span: Some(*span),
                    };

                    let is_jump = writer
                        .byte_at(cursor)
                        .and_then(Opcode::from_u8)
                        .is_some_and(Opcode::is_jump);
                    if !is_jump {
                        return Err(internal(format!("expected a jump opcode at offset {}", cursor)));
                    }

                    let Some((Token::Word(name), label_span)) = tokens.get(i + 1) else {
                        return Err(internal("jump without a label operand".to_string()));
                    };
                    let target = labels.resolve(name, *label_span)?;
                    writer
                        .patch_u8(cursor + 1, target)
                        .map_err(|err| internal(err.to_string()))?;

                    cursor += 2;
                    i += 1;
                }
                _ => cursor += 1,
            },
        }
        i += 1;
    }

    if cursor != writer.offset() {
        return Err(AssembleError::Internal {
            message: format!(
                "pass 2 ended at offset {} but pass 1 emitted {} bytes",
                cursor,
                writer.offset()
            ),
            span: None,
        });
    }
    Ok(())
}
