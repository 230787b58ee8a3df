//! Configuration file parsing (stackvm.toml)
//!
//! Every field is optional; command-line flags override the file.
//!
//! ```toml
//! [vm]
//! poison = -1515870811
//! dump_log = "stackvm-stack.log"
//! dump_on_trap = true
//!
//! [program]
//! header = "wide"
//! ```

use serde::Deserialize;
use stackvm_bytecode::HeaderFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "stackvm.toml";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Parsed stackvm.toml
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    /// Virtual machine settings
    #[serde(default)]
    pub vm: VmConfig,

    /// Program file settings
    #[serde(default)]
    pub program: ProgramConfig,
}

/// `[vm]` table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VmConfig {
    /// Fixed poison value for the operand stack (random when absent)
    pub poison: Option<i32>,

    /// Append stack dumps to this file instead of stderr
    pub dump_log: Option<PathBuf>,

    /// Dump the operand stack when a program traps
    #[serde(default = "default_dump_on_trap")]
    pub dump_on_trap: bool,
}

fn default_dump_on_trap() -> bool {
    true
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            poison: None,
            dump_log: None,
            dump_on_trap: default_dump_on_trap(),
        }
    }
}

/// `[program]` table
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProgramConfig {
    /// Length header of compiled program files: "wide" or "legacy"
    pub header: Option<String>,
}

impl Config {
    /// Load the configuration
    ///
    /// An explicit path must exist. Without one, `stackvm.toml` in the
    /// working directory is used when present, and defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a config from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a config from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(header) = &self.program.header {
            if HeaderFormat::from_name(header).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid program header '{}'. Must be \"wide\" or \"legacy\"",
                    header
                )));
            }
        }
        Ok(())
    }

    /// Header format for program files, `Wide` unless configured
    pub fn header_format(&self) -> HeaderFormat {
        self.program
            .header
            .as_deref()
            .and_then(HeaderFormat::from_name)
            .unwrap_or_default()
    }
}
