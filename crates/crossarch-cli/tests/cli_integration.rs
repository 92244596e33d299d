//! Integration tests for the crossarch CLI.

use crossarch_core as _;
use serde as _;
use serde_json as _;
use tracing as _;
use tracing_subscriber as _;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_crossarch"))
}

fn words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

fn write_image(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write image");
    path
}

fn crossarch(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run crossarch")
}

fn hello_mips() -> Vec<u8> {
    words(&[
        0x2004_002A, // addi $a0, $zero, 42
        0x2002_0001, // addi $v0, $zero, 1
        0x0000_000C, // syscall
        0x2004_000A, // addi $a0, $zero, '\n'
        0x2002_000B, // addi $v0, $zero, 11
        0x0000_000C, // syscall
        0x2002_000A, // addi $v0, $zero, 10
        0x0000_000C, // syscall
    ])
}

#[test]
fn run_prints_console_output() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let image = write_image(temp_dir.path(), "hello.bin", &hello_mips());

    let output = crossarch(&["run", image.to_str().expect("utf-8 path"), "--arch", "mips"]);

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "42\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("program exit after 8 instructions"), "{stderr}");
}

#[test]
fn run_json_summary_reports_registers() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let image = write_image(temp_dir.path(), "hello.bin", &hello_mips());

    let output = crossarch(&[
        "run",
        image.to_str().expect("utf-8 path"),
        "--arch",
        "MIPS32",
        "--json",
    ]);

    assert!(output.status.success());
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(summary["steps"], 8);
    assert_eq!(summary["halt"], "Exit");
    assert_eq!(summary["architecture"], "Mips32");
    assert_eq!(summary["registers"]["pc"], 32);
}

#[test]
fn config_file_budget_is_overridden_by_flag() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let image = write_image(temp_dir.path(), "spin.bin", &words(&[0x0800_0000])); // j 0
    let config = temp_dir.path().join("core.json");
    fs::write(&config, r#"{ "max_instructions": 5 }"#).expect("write config");

    let output = crossarch(&[
        "run",
        image.to_str().expect("utf-8 path"),
        "--arch",
        "mips",
        "--config",
        config.to_str().expect("utf-8 path"),
        "-n",
        "12",
    ]);

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("instruction budget exhausted after 12 instructions"),
        "{stderr}"
    );
}

#[test]
fn oversized_config_region_is_rejected() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let image = write_image(temp_dir.path(), "hello.bin", &hello_mips());
    let config = temp_dir.path().join("core.json");
    fs::write(&config, r#"{ "ram_bytes": 1099511627776 }"#).expect("write config");

    let output = crossarch(&[
        "run",
        image.to_str().expect("utf-8 path"),
        "--arch",
        "mips",
        "--config",
        config.to_str().expect("utf-8 path"),
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ram size"), "{stderr}");
}

#[test]
fn run_fault_exits_nonzero() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let image = write_image(temp_dir.path(), "bad.bin", &words(&[0xF000_0000]));

    let output = crossarch(&["run", image.to_str().expect("utf-8 path"), "--arch", "arm"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("fault"));
}

#[test]
fn empty_image_is_rejected() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let image = write_image(temp_dir.path(), "empty.bin", &[]);

    let output = crossarch(&["run", image.to_str().expect("utf-8 path"), "--arch", "x86"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn unknown_architecture_is_reported() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let image = write_image(temp_dir.path(), "hello.bin", &hello_mips());

    let output = crossarch(&["run", image.to_str().expect("utf-8 path"), "--arch", "sparc"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("sparc"));
}

#[test]
fn disasm_lists_rows_from_base() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let image = write_image(
        temp_dir.path(),
        "prog.bin",
        &words(&[0x2008_0005, 0x0000_000C]),
    );

    let output = crossarch(&[
        "disasm",
        image.to_str().expect("utf-8 path"),
        "--arch",
        "mips",
        "--load-address",
        "0x1000",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("0x00001000:"));
    assert!(lines[0].ends_with("addi $t0, $zero, 5"));
    assert!(lines[1].ends_with("syscall"));
}

#[test]
fn dispatch_translates_mips_to_x86() {
    let output = crossarch(&["dispatch", "0x20080005", "--from", "mips", "--to", "x86"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mov eax, 0x5"), "{stdout}");
    assert!(stdout.contains("eax = 0x00000005"), "{stdout}");
}

#[test]
fn dispatch_without_rule_fails() {
    let output = crossarch(&["dispatch", "0x0000000c", "--from", "mips", "--to", "x86"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("syscall"));
}

#[test]
fn help_prints_usage() {
    let output = crossarch(&["--help"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Usage: crossarch"));
}
