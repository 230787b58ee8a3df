//! StackVM command-line tool
//!
//! The `stackvm` binary is a thin clap front end over these modules:
//! [`commands`] holds one module per subcommand, [`config`] loads
//! `stackvm.toml`, [`diagnostics`] renders assembly errors with source
//! context and [`output`] writes colored status lines.

pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod output;
