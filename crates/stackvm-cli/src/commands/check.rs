//! `stackvm check` - assemble or load a program and verify it without running.

use super::{assemble_file, Session};
use anyhow::Context;
use stackvm_bytecode::{verify_program, HeaderFormat, Program};
use std::path::Path;

pub fn execute(
    session: &mut Session,
    path: &Path,
    binary: bool,
    header: Option<HeaderFormat>,
) -> anyhow::Result<()> {
    let header = header.unwrap_or_else(|| session.config.header_format());
    let binary = binary || path.extension().is_some_and(|ext| ext == "bin");

    let (program, labels) = if binary {
        let program = Program::load(path, header)
            .with_context(|| format!("Failed to load {} ({} header)", path.display(), header))?;
        (program, None)
    } else {
        let assembly = assemble_file(session, path, Some(header.max_len()))?;
        (assembly.program, Some(assembly.labels.len()))
    };

    let summary = verify_program(program.code())
        .with_context(|| format!("{} failed verification", path.display()))?;
    if !summary.has_end {
        stackvm_core::warn!("{} has no `end`; it halts by running off the end", path.display());
    }

    let mut message = format!(
        "{}: {} bytes, {} instructions, {} jumps",
        path.display(),
        program.len(),
        summary.instructions,
        summary.jumps
    );
    if let Some(labels) = labels {
        message.push_str(&format!(", {} labels", labels));
    }
    session.out.status("Ok", &message);
    Ok(())
}
