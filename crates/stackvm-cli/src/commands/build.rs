//! `stackvm build` - assemble a source file into a program file.

use super::{assemble_file, Session};
use anyhow::Context;
use stackvm_bytecode::HeaderFormat;
use std::path::{Path, PathBuf};

pub fn execute(
    session: &mut Session,
    source: &Path,
    output: Option<PathBuf>,
    header: Option<HeaderFormat>,
) -> anyhow::Result<()> {
    let header = header.unwrap_or_else(|| session.config.header_format());
    let assembly = assemble_file(session, source, Some(header.max_len()))?;

    let output = output.unwrap_or_else(|| source.with_extension("bin"));
    assembly
        .program
        .save(&output, header)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    stackvm_core::debug!("wrote {} with a {} header", output.display(), header);
    session.out.status(
        "Built",
        &format!(
            "{} ({} bytes, {} labels)",
            output.display(),
            assembly.program.len(),
            assembly.labels.len()
        ),
    );
    Ok(())
}
