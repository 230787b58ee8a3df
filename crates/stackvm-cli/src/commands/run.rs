//! `stackvm run` - assemble a source file and execute it.

use super::{assemble_file, execute_program, Session, VmArgs};
use std::path::Path;

pub fn execute(session: &mut Session, source: &Path, args: &VmArgs) -> anyhow::Result<()> {
    let assembly = assemble_file(session, source, None)?;
    execute_program(session, assembly.program, args)
}
