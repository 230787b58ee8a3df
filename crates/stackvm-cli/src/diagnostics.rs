//! Rendering of assembly errors with source context

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream, WriteColor};
use stackvm_bytecode::{Mnemonic, MNEMONICS};
use stackvm_compiler::{AssembleError, Span};

fn range(span: Span) -> std::ops::Range<usize> {
    span.start..span.end
}

fn instruction_names() -> String {
    MNEMONICS
        .iter()
        .filter(|(_, mnemonic)| matches!(mnemonic, Mnemonic::Instruction(_)))
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a codespan diagnostic for an assembly error
pub fn to_diagnostic(error: &AssembleError, file_id: usize) -> Diagnostic<usize> {
    use AssembleError::*;

    let diag = Diagnostic::error().with_code(error.code());
    match error {
        UnexpectedCharacter { char, span } => diag
            .with_message(format!("unexpected character {:?}", char))
            .with_labels(vec![Label::primary(file_id, range(*span))]),

        UnknownMnemonic { name, span } => diag
            .with_message(format!("unknown mnemonic '{}'", name))
            .with_labels(vec![
                Label::primary(file_id, range(*span)).with_message("not an instruction")
            ])
            .with_notes(vec![format!("help: valid instructions are {}", instruction_names())]),

        UnexpectedRegister { register, span } => diag
            .with_message(format!("unexpected register '{}'", register))
            .with_labels(vec![Label::primary(file_id, range(*span))
                .with_message("registers may only follow push, pop or in")]),

        MissingOperand {
            instruction,
            expected,
            span,
        } => diag
            .with_message(format!("'{}' is missing an operand", instruction))
            .with_labels(vec![
                Label::primary(file_id, range(*span)).with_message(format!("expects {}", expected))
            ]),

        InvalidConstant { text, span } => diag
            .with_message(format!("invalid constant '{}'", text))
            .with_labels(vec![Label::primary(file_id, range(*span))
                .with_message("does not fit in a 32-bit signed integer")]),

        DuplicateLabel {
            name,
            span,
            previous,
        } => diag
            .with_message(format!("label '{}' is defined twice", name))
            .with_labels(vec![
                Label::primary(file_id, range(*span)).with_message("redefined here"),
                Label::secondary(file_id, range(*previous)).with_message("first defined here"),
            ]),

        UndefinedLabel { name, span } => diag
            .with_message(format!("undefined label '{}'", name))
            .with_labels(vec![
                Label::primary(file_id, range(*span)).with_message("no such label")
            ])
            .with_notes(vec![format!("help: define it with `{}:`", name)]),

        LabelOutOfRange { name, offset, span } => diag
            .with_message(format!("label '{}' is out of jump range", name))
            .with_labels(vec![Label::primary(file_id, range(*span))
                .with_message(format!("label is at offset {}", offset))])
            .with_notes(vec![
                "jump targets are a single byte; labels must sit within the first 256 bytes"
                    .to_string(),
            ]),

        ProgramTooLarge { len, max } => diag
            .with_message(format!("program is {} bytes long", len))
            .with_notes(vec![format!(
                "the selected program header holds at most {} bytes; try `--header wide`",
                max
            )]),

        Internal { message, span } => {
            let diag = diag.with_message(format!("internal assembler error: {}", message));
            match span {
                Some(span) => diag.with_labels(vec![Label::primary(file_id, range(*span))]),
                None => diag,
            }
        }
    }
}

/// Render `error` against `source` into `writer`
pub fn emit_to(
    writer: &mut dyn WriteColor,
    error: &AssembleError,
    name: &str,
    source: &str,
) -> Result<(), codespan_reporting::files::Error> {
    let mut files = SimpleFiles::new();
    let file_id = files.add(name.to_string(), source.to_string());
    let config = term::Config::default();
    term::emit(writer, &config, &files, &to_diagnostic(error, file_id))
}

/// Render `error` to stderr
pub fn emit(
    error: &AssembleError,
    name: &str,
    source: &str,
    color: ColorChoice,
) -> Result<(), codespan_reporting::files::Error> {
    let mut writer = StandardStream::stderr(color);
    emit_to(&mut writer, error, name, source)
}
