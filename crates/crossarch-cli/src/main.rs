//! CLI entry point for the crossarch emulator binary.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crossarch_core::{
    console_text, disassemble, AnyCore, Architecture, Core, CoreConfig, Diagnostics,
    DispatchOutcome, Dispatcher, HaltReason, Notification, NotificationSink, RegisterSnapshot,
    StepOutcome, StopHandle, TranslationTables,
};
use serde::Serialize;
#[cfg(test)]
use tempfile as _;
use tracing_subscriber::EnvFilter;

const USAGE_TEXT: &str = "\
Usage: crossarch <command> [options]

Commands:
  run <image> --arch <tag>                  Load a raw image and run it until it halts
  disasm <image> --arch <tag>               Print a linear-sweep disassembly
  dispatch <hex> --from <tag> --to <tag>    Execute one instruction, translating if needed

Options:
  -a, --arch <tag>             Architecture: mips, arm, x86, powerpc (aliases accepted)
  -l, --load-address <addr>    Load address (run) or listing base (disasm)
  -n, --max-instructions <n>   Halt after this many instructions (run)
  -c, --config <file>          JSON core configuration; flags override it
      --json                   Print a JSON run summary to stdout (run)
  -v, --verbose                Raise log level to debug
  -h, --help                   Show this help message

Instruction bytes for dispatch are hex in memory order (\"05000820\"), or a
0x-prefixed word stored little-endian (\"0x20080005\").

Examples:
  crossarch run hello.bin --arch mips
  crossarch disasm boot.bin --arch ppc --load-address 0x100
  crossarch dispatch 0x20080005 --from mips --to x86
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(RunArgs),
    Disasm(DisasmArgs),
    Dispatch(DispatchArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    image: PathBuf,
    arch: String,
    load_address: Option<u32>,
    max_instructions: Option<u64>,
    config: Option<PathBuf>,
    json: bool,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct DisasmArgs {
    image: PathBuf,
    arch: String,
    base: u32,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct DispatchArgs {
    bytes: Vec<u8>,
    from: String,
    to: String,
    config: Option<PathBuf>,
    verbose: bool,
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

impl Command {
    const fn verbose(&self) -> bool {
        match self {
            Self::Run(args) => args.verbose,
            Self::Disasm(args) => args.verbose,
            Self::Dispatch(args) => args.verbose,
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();

    let command = match command_str.as_str() {
        "run" => parse_run_args(args).map(Command::Run),
        "disasm" => parse_disasm_args(args).map(Command::Disasm),
        "dispatch" => parse_dispatch_args(args).map(Command::Dispatch),
        other => Err(format!("unknown command: {other}")),
    }?;
    Ok(ParseResult::Command(command))
}

/// Flags shared by every command, collected before command-specific checks.
#[derive(Debug, Default)]
struct Flags {
    positional: Option<OsString>,
    arch: Option<String>,
    from: Option<String>,
    to: Option<String>,
    load_address: Option<u32>,
    max_instructions: Option<u64>,
    config: Option<PathBuf>,
    json: bool,
    verbose: bool,
}

#[allow(clippy::while_let_on_iterator)]
fn collect_flags(mut args: impl Iterator<Item = OsString>, allowed: &[&str]) -> Result<Flags, String> {
    let mut flags = Flags::default();

    while let Some(arg) = args.next() {
        let text = arg.to_string_lossy().to_string();
        if text == "--help" || text == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        let name = match text.as_str() {
            "-a" | "--arch" => "--arch",
            "-l" | "--load-address" => "--load-address",
            "-n" | "--max-instructions" => "--max-instructions",
            "-c" | "--config" => "--config",
            "-v" | "--verbose" => "--verbose",
            "--from" | "--to" | "--json" => text.as_str(),
            _ if text.starts_with('-') && text.len() > 1 && !is_number(&text) => {
                return Err(format!("unknown option: {text}"));
            }
            _ => {
                if flags.positional.is_some() {
                    return Err("multiple positional arguments provided".to_string());
                }
                flags.positional = Some(arg);
                continue;
            }
        };
        if !allowed.contains(&name) {
            return Err(format!("unknown option: {text}"));
        }

        match name {
            "--verbose" => flags.verbose = true,
            "--json" => flags.json = true,
            _ => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for {name}"))?;
                let value = value.to_string_lossy().to_string();
                match name {
                    "--arch" => flags.arch = Some(value),
                    "--from" => flags.from = Some(value),
                    "--to" => flags.to = Some(value),
                    "--load-address" => flags.load_address = Some(parse_u32(&value)?),
                    "--max-instructions" => flags.max_instructions = Some(parse_u64(&value)?),
                    _ => flags.config = Some(PathBuf::from(value)),
                }
            }
        }
    }

    Ok(flags)
}

fn is_number(text: &str) -> bool {
    text.trim_start_matches('-').chars().all(|c| c.is_ascii_digit())
}

fn parse_run_args(args: impl Iterator<Item = OsString>) -> Result<RunArgs, String> {
    let flags = collect_flags(
        args,
        &[
            "--arch",
            "--load-address",
            "--max-instructions",
            "--config",
            "--json",
            "--verbose",
        ],
    )?;
    let image = flags.positional.ok_or_else(|| "missing image path".to_string())?;
    let arch = flags.arch.ok_or_else(|| "missing --arch".to_string())?;
    Ok(RunArgs {
        image: PathBuf::from(image),
        arch,
        load_address: flags.load_address,
        max_instructions: flags.max_instructions,
        config: flags.config,
        json: flags.json,
        verbose: flags.verbose,
    })
}

fn parse_disasm_args(args: impl Iterator<Item = OsString>) -> Result<DisasmArgs, String> {
    let flags = collect_flags(args, &["--arch", "--load-address", "--verbose"])?;
    let image = flags.positional.ok_or_else(|| "missing image path".to_string())?;
    let arch = flags.arch.ok_or_else(|| "missing --arch".to_string())?;
    Ok(DisasmArgs {
        image: PathBuf::from(image),
        arch,
        base: flags.load_address.unwrap_or(0),
        verbose: flags.verbose,
    })
}

fn parse_dispatch_args(args: impl Iterator<Item = OsString>) -> Result<DispatchArgs, String> {
    let flags = collect_flags(args, &["--from", "--to", "--config", "--verbose"])?;
    let hex = flags
        .positional
        .ok_or_else(|| "missing instruction bytes".to_string())?;
    let bytes = parse_instruction_bytes(&hex.to_string_lossy())?;
    let from = flags.from.ok_or_else(|| "missing --from".to_string())?;
    let to = flags.to.ok_or_else(|| "missing --to".to_string())?;
    Ok(DispatchArgs {
        bytes,
        from,
        to,
        config: flags.config,
        verbose: flags.verbose,
    })
}

fn parse_u32(text: &str) -> Result<u32, String> {
    let parsed = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).map_or_else(
        || text.parse::<u32>(),
        |hex| u32::from_str_radix(&hex.replace('_', ""), 16),
    );
    parsed.map_err(|e| format!("invalid number '{text}': {e}"))
}

fn parse_u64(text: &str) -> Result<u64, String> {
    text.replace('_', "")
        .parse::<u64>()
        .map_err(|e| format!("invalid count '{text}': {e}"))
}

fn parse_instruction_bytes(text: &str) -> Result<Vec<u8>, String> {
    if text.starts_with("0x") || text.starts_with("0X") {
        return parse_u32(text).map(|word| word.to_le_bytes().to_vec());
    }
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("instruction bytes must be hex digits, found '{bad}' in '{text}'"));
    }
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(format!("instruction bytes must be an even number of hex digits: '{text}'"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("invalid hex byte '{}': {e}", &digits[i..i + 2]))
        })
        .collect()
}

fn load_config(path: Option<&Path>) -> Result<CoreConfig, String> {
    let Some(path) = path else {
        return Ok(CoreConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
    let config: CoreConfig = serde_json::from_str(&text)
        .map_err(|e| format!("invalid config {}: {e}", path.display()))?;
    config
        .validate()
        .map_err(|e| format!("invalid config {}: {e}", path.display()))?;
    Ok(config)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Writes console and UART output to stdout as it arrives.
struct StdoutSink {
    json: bool,
}

impl NotificationSink for StdoutSink {
    fn notify(&mut self, notification: Notification) {
        let text = console_text(std::slice::from_ref(&notification));
        if !text.is_empty() {
            if !self.json {
                let mut stdout = io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            return;
        }
        match notification {
            Notification::GpioChanged(value) => {
                tracing::info!(value = format_args!("{value:#010x}"), "gpio changed");
            }
            Notification::BootStage(stage) => tracing::info!(%stage, "boot stage"),
            _ => {}
        }
    }
}

#[derive(Debug, Serialize)]
struct RunSummary {
    architecture: Architecture,
    steps: u64,
    halt: HaltReason,
    registers: RegisterSnapshot,
    diagnostics: Diagnostics,
}

fn run_image(args: &RunArgs) -> Result<(), i32> {
    let mut config = load_config(args.config.as_deref()).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    if args.load_address.is_some() {
        config.load_address = args.load_address;
    }
    if args.max_instructions.is_some() {
        config.max_instructions = args.max_instructions;
    }

    let image = fs::read(&args.image).map_err(|e| {
        eprintln!("error: failed to read {}: {e}", args.image.display());
        1
    })?;

    let mut core = AnyCore::from_tag(&args.arch, config).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    core.set_sink(Box::new(StdoutSink { json: args.json }));
    core.load(&image, None).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    let outcome = core.run(&StopHandle::new()).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    if args.json {
        let summary = RunSummary {
            architecture: core.architecture(),
            steps: outcome.steps,
            halt: outcome.halt,
            registers: core.registers(),
            diagnostics: core.diagnostics(),
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to encode summary: {e}");
                return Err(1);
            }
        }
    } else {
        eprintln!(
            "{}: {} after {} instructions",
            core.architecture(),
            outcome.halt,
            outcome.steps
        );
    }

    if matches!(outcome.halt, HaltReason::Fault(_)) {
        Err(1)
    } else {
        Ok(())
    }
}

fn run_disasm(args: &DisasmArgs) -> Result<(), i32> {
    let architecture = Architecture::from_tag(&args.arch).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    let image = fs::read(&args.image).map_err(|e| {
        eprintln!("error: failed to read {}: {e}", args.image.display());
        1
    })?;

    for row in disassemble(architecture, &image, args.base) {
        println!("{row}");
    }
    Ok(())
}

fn print_step(step: &StepOutcome) {
    match step {
        StepOutcome::Retired { pc, raw, len } => {
            println!("  retired pc={pc:#010x} raw={raw:#010x} len={len}");
        }
        StepOutcome::Halted(reason) => println!("  halted: {reason}"),
        StepOutcome::Idle => println!("  idle"),
    }
}

fn print_registers(registers: &RegisterSnapshot) {
    let changed = registers
        .general
        .iter()
        .chain(&registers.special)
        .filter(|register| register.value != 0);
    for register in changed {
        println!("  {} = {:#010x}", register.name, register.value);
    }
    println!("  pc = {:#010x}", registers.pc);
}

fn run_dispatch(args: &DispatchArgs) -> Result<(), i32> {
    let config = load_config(args.config.as_deref()).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    let tables = TranslationTables::standard();
    let mut dispatcher = Dispatcher::new(&tables, config);

    let outcome = dispatcher
        .dispatch(&args.bytes, &args.from, &args.to)
        .map_err(|e| {
            eprintln!("error: {e}");
            1
        })?;

    let target = match &outcome {
        DispatchOutcome::Executed { architecture, step } => {
            println!("executed natively on {architecture}");
            print_step(step);
            *architecture
        }
        DispatchOutcome::Translated { translation, steps } => {
            println!("{translation}");
            for step in steps {
                print_step(step);
            }
            translation.to
        }
    };

    if let Some(core) = dispatcher.core(target) {
        print_registers(&core.registers());
    }
    Ok(())
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(command)) => {
            init_tracing(command.verbose());
            let result = match &command {
                Command::Run(args) => run_image(args),
                Command::Disasm(args) => run_disasm(args),
                Command::Dispatch(args) => run_dispatch(args),
            };
            match result {
                Ok(()) => 0,
                Err(code) => code,
            }
        }
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}
