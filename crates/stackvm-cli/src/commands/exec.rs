//! `stackvm exec` - execute a compiled program file.

use super::{execute_program, Session, VmArgs};
use anyhow::Context;
use stackvm_bytecode::{HeaderFormat, Program};
use std::path::Path;

pub fn execute(
    session: &mut Session,
    path: &Path,
    header: Option<HeaderFormat>,
    args: &VmArgs,
) -> anyhow::Result<()> {
    let header = header.unwrap_or_else(|| session.config.header_format());
    let program = Program::load(path, header)
        .with_context(|| format!("Failed to load {} ({} header)", path.display(), header))?;

    stackvm_core::debug!("loaded {} bytes from {}", program.len(), path.display());
    execute_program(session, program, args)
}
