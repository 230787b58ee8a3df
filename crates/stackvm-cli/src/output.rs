//! Shared colored output utilities for CLI commands.
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects `NO_COLOR` environment variable and `--color` flag.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled output writer for terminal.
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
    quiet: bool,
}

impl StyledOutput {
    /// Create a new styled output with the given color choice.
    ///
    /// A quiet writer drops status lines but still prints errors.
    pub fn new(choice: ColorChoice, quiet: bool) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
            quiet,
        }
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Status line: green bold `label`, then `message`. Dropped when quiet.
    pub fn status(&mut self, label: &str, message: &str) {
        if self.quiet {
            return;
        }
        self.write_styled(label, Some(Color::Green), true);
        let _ = writeln!(self.stdout, " {}", message);
    }

    /// Newline, even when quiet.
    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    /// Flush stdout.
    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    /// Write `error: {message}` to stderr, the prefix in red.
    pub fn stderr_error(&mut self, message: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::Red)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = write!(self.stderr, "error");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, ": {}", message);
    }
}

/// Join an error and its causes, skipping causes already in the message.
pub fn error_chain(error: &anyhow::Error) -> String {
    let mut message = error.to_string();
    for cause in error.chain().skip(1) {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_flag() {
        if std::env::var_os("NO_COLOR").is_some() {
            assert_eq!(resolve_color_choice(Some("always")), ColorChoice::Never);
            return;
        }
        assert_eq!(resolve_color_choice(Some("always")), ColorChoice::Always);
        assert_eq!(resolve_color_choice(Some("never")), ColorChoice::Never);
        assert_eq!(resolve_color_choice(Some("auto")), ColorChoice::Auto);
        assert_eq!(resolve_color_choice(None), ColorChoice::Auto);
    }

    #[test]
    fn test_error_chain_skips_repeated_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error = anyhow::Error::new(io).context("Failed to read prog.asm");
        assert_eq!(error_chain(&error), "Failed to read prog.asm: missing");

        let error = anyhow::anyhow!("inner failure").context("outer: inner failure");
        assert_eq!(error_chain(&error), "outer: inner failure");
    }
}
