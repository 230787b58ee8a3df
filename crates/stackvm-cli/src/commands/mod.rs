//! Subcommand implementations

pub mod build;
pub mod check;
pub mod exec;
pub mod run;

use crate::config::Config;
use crate::diagnostics;
use crate::output::StyledOutput;
use anyhow::Context;
use clap::Args;
use stackvm_bytecode::Program;
use stackvm_compiler::{AssembleOptions, Assembler, Assembly};
use stackvm_core::{DumpSink, Vm, VmOptions};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use termcolor::ColorChoice;

/// State shared by every subcommand
pub struct Session {
    /// Loaded configuration
    pub config: Config,
    /// Status output
    pub out: StyledOutput,
    /// Color choice for diagnostics
    pub color: ColorChoice,
}

impl Session {
    /// Create a session
    pub fn new(config: Config, color: ColorChoice, quiet: bool) -> Self {
        Self {
            config,
            out: StyledOutput::new(color, quiet),
            color,
        }
    }
}

/// Virtual machine flags shared by `run` and `exec`
#[derive(Debug, Clone, Default, Args)]
pub struct VmArgs {
    /// Poison value for the operand stack (overrides stackvm.toml)
    #[arg(long, allow_negative_numbers = true)]
    pub poison: Option<i32>,

    /// Append stack dumps to a file instead of stderr
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = stackvm_core::stack::DEFAULT_DUMP_LOG
    )]
    pub dump_log: Option<PathBuf>,

    /// Do not dump the operand stack when the program traps
    #[arg(long)]
    pub no_dump: bool,

    /// Read `in` values from a file instead of stdin
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
}

/// Read and assemble a source file, rendering diagnostics on failure
pub fn assemble_file(
    session: &Session,
    path: &Path,
    max_program_len: Option<usize>,
) -> anyhow::Result<Assembly> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let options = AssembleOptions { max_program_len };
    match Assembler::new(&source, options).assemble() {
        Ok(assembly) => {
            stackvm_core::debug!(
                "assembled {}: {} bytes, {} labels",
                path.display(),
                assembly.program.len(),
                assembly.labels.len()
            );
            Ok(assembly)
        }
        Err(error) => {
            diagnostics::emit(&error, &path.display().to_string(), &source, session.color)
                .context("Failed to render diagnostic")?;
            anyhow::bail!("Could not assemble {}", path.display())
        }
    }
}

/// Options for the VM from flags, then stackvm.toml
pub fn vm_options(config: &Config, args: &VmArgs) -> VmOptions {
    let dump_sink = match args.dump_log.as_ref().or(config.vm.dump_log.as_ref()) {
        Some(path) => DumpSink::File(path.clone()),
        None => DumpSink::Stderr,
    };

    VmOptions {
        poison: args.poison.or(config.vm.poison),
        dump_sink,
        dump_on_trap: config.vm.dump_on_trap && !args.no_dump,
        ..VmOptions::default()
    }
}

/// Run a program against stdout and the selected input
pub fn execute_program(session: &mut Session, program: Program, args: &VmArgs) -> anyhow::Result<()> {
    let options = vm_options(&session.config, args);
    match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            let vm = Vm::with_io(program, options, BufReader::new(file), io::stdout());
            drive(session, vm)
        }
        None => drive(session, Vm::new(program, options)),
    }
}

fn drive<R: BufRead, W: Write>(session: &mut Session, mut vm: Vm<R, W>) -> anyhow::Result<()> {
    let result = vm.run();
    // Terminate the line of `out` values
    session.out.newline();
    session.out.flush();

    result?;
    stackvm_core::debug!("halted after {} steps", vm.steps());
    Ok(())
}
