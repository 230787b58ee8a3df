//! Integration tests for the `stackvm` binary.
//!
//! Each test works in its own temporary directory so that a stray
//! stackvm.toml in the repository cannot leak into the run.

use stackvm_bytecode::{HeaderFormat, Program};
use stackvm_compiler::assemble;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const SUM: &str = "push 10\npush 20\nadd\nout\nend\n";

fn stackvm(dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_stackvm"));
    command.current_dir(dir).env("NO_COLOR", "1");
    command
}

fn run_with_stdin(mut command: Command, stdin: &str) -> Output {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn stackvm");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ────────────────────────────────────────────────────────────────────────────
// build / exec
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_build_then_exec() {
    let dir = workspace(&[("sum.asm", SUM)]);

    let output = stackvm(dir.path())
        .args(["build", "sum.asm", "-o", "sum.bin"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Built sum.bin (13 bytes, 0 labels)"));

    let saved = Program::load(dir.path().join("sum.bin"), HeaderFormat::Wide).unwrap();
    assert_eq!(saved, assemble(SUM).unwrap());

    let output = stackvm(dir.path()).args(["exec", "sum.bin"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "30 \n");
}

#[test]
fn test_build_default_output_path() {
    let dir = workspace(&[("sum.asm", SUM)]);

    let output = stackvm(dir.path())
        .args(["--quiet", "build", "sum.asm"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "");
    assert!(dir.path().join("sum.bin").is_file());
}

#[test]
fn test_legacy_header_from_config() {
    let dir = workspace(&[
        ("sum.asm", SUM),
        ("stackvm.toml", "[program]\nheader = \"legacy\"\n"),
    ]);

    let output = stackvm(dir.path())
        .args(["build", "sum.asm", "-o", "sum.bin"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let bytes = std::fs::read(dir.path().join("sum.bin")).unwrap();
    assert_eq!(bytes[0], 13);
    assert_eq!(bytes.len(), 14);

    let output = stackvm(dir.path()).args(["exec", "sum.bin"]).output().unwrap();
    assert_eq!(stdout(&output), "30 \n");

    // Reading it as wide fails the length check
    let output = stackvm(dir.path())
        .args(["exec", "sum.bin", "--header", "wide"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load sum.bin (wide header)"));
}

#[test]
fn test_legacy_header_rejects_large_program() {
    let source = "push 1\n".repeat(60);
    let dir = workspace(&[("big.asm", &source)]);

    let output = stackvm(dir.path())
        .args(["build", "big.asm", "--header", "legacy"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("error[A0201]"), "{}", err);
    assert!(err.contains("Could not assemble big.asm"));
    assert!(!dir.path().join("big.bin").exists());
}

#[test]
fn test_explicit_config_path() {
    let dir = workspace(&[("sum.asm", SUM), ("vm.toml", "[program]\nheader = \"legacy\"\n")]);

    let output = stackvm(dir.path())
        .args(["--config", "vm.toml", "build", "sum.asm"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(std::fs::read(dir.path().join("sum.bin")).unwrap()[0], 13);

    let output = stackvm(dir.path())
        .args(["--config", "missing.toml", "build", "sum.asm"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load configuration"));
}

// ────────────────────────────────────────────────────────────────────────────
// run
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_reads_stdin() {
    let dir = workspace(&[("mul.asm", "in; in; mul; out; end")]);

    let mut command = stackvm(dir.path());
    command.args(["run", "mul.asm"]);
    let output = run_with_stdin(command, "6 7\n");
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "42 \n");
}

#[test]
fn test_run_reads_input_file() {
    let dir = workspace(&[("sub.asm", "in\nin\nsub\nout\nend\n"), ("values.txt", "50\n8\n")]);

    let output = stackvm(dir.path())
        .args(["run", "sub.asm", "--input", "values.txt"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "42 \n");
}

#[test]
fn test_run_reports_assembly_errors() {
    let dir = workspace(&[("bad.asm", "push 1\njmp nowhere\n")]);

    let output = stackvm(dir.path()).args(["run", "bad.asm"]).output().unwrap();
    assert!(!output.status.success());
    assert_eq!(stdout(&output), "");

    let err = stderr(&output);
    assert!(err.contains("error[A0102]: undefined label 'nowhere'"), "{}", err);
    assert!(err.contains("bad.asm:2:5"), "{}", err);
    assert!(err.contains("error: Could not assemble bad.asm"), "{}", err);
}

#[test]
fn test_run_trap_reports_pc_and_dumps() {
    let dir = workspace(&[("div.asm", "push 1\npush 0\ndiv\nout\n")]);

    let output = stackvm(dir.path())
        .args(["run", "div.asm", "--poison", "-7", "--dump-log", "dump.log"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Trap at pc 10: Division by zero"));

    let dump = std::fs::read_to_string(dir.path().join("dump.log")).unwrap();
    assert!(dump.starts_with("Dump requested from trap at pc 10"), "{}", dump);
    assert!(dump.contains("GuardedStack<i32> \"operand stack\""));
    assert!(dump.contains("poison = -7"));
}

#[test]
fn test_run_trap_without_dump() {
    let dir = workspace(&[("sqrt.asm", "in ax 3\npush ax\nsqrt\nout\npush -1\nsqrt\n")]);

    let output = stackvm(dir.path())
        .args(["run", "sqrt.asm", "--poison", "-7", "--no-dump", "--dump-log", "dump.log"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_eq!(stdout(&output), "1 \n");
    assert!(stderr(&output).contains("Domain error: sqrt is undefined for -1"));
    assert!(!dir.path().join("dump.log").exists());
}

// ────────────────────────────────────────────────────────────────────────────
// check
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_check_source() {
    let dir = workspace(&[("loop.asm", "top: push ax; push 1; add; pop ax; push ax; push 3; jb top; end")]);

    let output = stackvm(dir.path()).args(["check", "loop.asm"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Ok loop.asm: 20 bytes, 8 instructions, 1 jumps, 1 labels"));
}

#[test]
fn test_check_binary_with_bad_jump() {
    // push 1; jmp 2 (into the constant)
    let program = Program::new(vec![1, 1, 0, 0, 0, 0b0110_1010, 2]);
    let dir = workspace(&[]);
    program
        .save(dir.path().join("bad.bin"), HeaderFormat::Wide)
        .unwrap();

    let output = stackvm(dir.path()).args(["check", "bad.bin"]).output().unwrap();
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("bad.bin failed verification"), "{}", err);
    assert!(err.contains("Invalid jump target 2 at offset 5"), "{}", err);
}
