//! StackVM command-line tool
//!
//! Assembles, verifies and runs StackVM programs.

use anyhow::Context;
use clap::{Parser, Subcommand};
use stackvm_bytecode::HeaderFormat;
use stackvm_cli::commands::{self, Session, VmArgs};
use stackvm_cli::config::Config;
use stackvm_cli::output::{error_chain, resolve_color_choice, StyledOutput};
use stackvm_core::log::{self, Level};
use std::path::PathBuf;
use std::process::ExitCode;
use termcolor::ColorChoice;

#[derive(Parser)]
#[command(name = "stackvm")]
#[command(about = "Assembler and virtual machine for StackVM programs", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./stackvm.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Print debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, value_parser = ["auto", "always", "never"])]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a source file into a program file
    Build {
        /// Assembly source file
        source: PathBuf,
        /// Output file (defaults to the source path with a .bin extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Length header of the program file: wide or legacy
        #[arg(long, value_parser = parse_header)]
        header: Option<HeaderFormat>,
    },

    /// Assemble a source file and run it
    Run {
        /// Assembly source file
        source: PathBuf,
        #[command(flatten)]
        vm: VmArgs,
    },

    /// Run a compiled program file
    Exec {
        /// Program file
        program: PathBuf,
        /// Length header of the program file: wide or legacy
        #[arg(long, value_parser = parse_header)]
        header: Option<HeaderFormat>,
        #[command(flatten)]
        vm: VmArgs,
    },

    /// Assemble or load a program and verify it without running
    Check {
        /// Assembly source, or a program file with --binary or a .bin extension
        path: PathBuf,
        /// Treat the input as a compiled program file
        #[arg(long)]
        binary: bool,
        /// Length header of the program file: wide or legacy
        #[arg(long, value_parser = parse_header)]
        header: Option<HeaderFormat>,
    },
}

fn parse_header(name: &str) -> Result<HeaderFormat, String> {
    HeaderFormat::from_name(name).ok_or_else(|| format!("expected 'wide' or 'legacy', got '{}'", name))
}

fn run(cli: Cli, color: ColorChoice) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let mut session = Session::new(config, color, cli.quiet);

    match cli.command {
        Commands::Build {
            source,
            output,
            header,
        } => commands::build::execute(&mut session, &source, output, header),
        Commands::Run { source, vm } => commands::run::execute(&mut session, &source, &vm),
        Commands::Exec {
            program,
            header,
            vm,
        } => commands::exec::execute(&mut session, &program, header, &vm),
        Commands::Check {
            path,
            binary,
            header,
        } => commands::check::execute(&mut session, &path, binary, header),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        log::set_level(Level::Debug);
    } else if cli.quiet {
        log::set_level(Level::Warn);
    }

    let color = resolve_color_choice(cli.color.as_deref());
    match run(cli, color) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            StyledOutput::new(color, false).stderr_error(&error_chain(&error));
            ExitCode::FAILURE
        }
    }
}
