//! Rook VM command-line front-end
//!
//! Loads a compiled program image, runs it, and exits with the machine's
//! return code. Uncaught exceptions are reported with the tick count, the
//! stack trace (entry point first, most recent call last) and a dump of the
//! final frame's registers and arguments.

mod os;

use anyhow::Context;
use clap::Parser;
use rook_bytecode::ProgramImage;
use rook_core::{ExitCondition, Machine};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rook")]
#[command(about = "Rook virtual machine", long_about = None)]
#[command(version)]
struct Cli {
    /// Compiled program image to run
    file: PathBuf,

    /// Arguments passed through to the program
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Tracing filter, e.g. "rook_core=debug"
    #[arg(long, default_value = "warn")]
    trace_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.trace_level))
        .with_writer(std::io::stderr)
        .init();

    match execute(cli) {
        Ok(code) => ExitCode::from((code & 0xFF) as u8),
        Err(error) => {
            eprintln!("fatal: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<i64> {
    let image = ProgramImage::from_file(&cli.file)
        .with_context(|| format!("cannot load {}", cli.file.display()))?;
    anyhow::ensure!(
        image.entry_offset().is_some(),
        "{} maps no __entry function",
        cli.file.display()
    );

    let mut machine = Machine::new();
    machine.load_image(image);
    machine.install_foreign(os::EXPORTS);

    let mut arguments = vec![cli.file.display().to_string()];
    arguments.extend(cli.args);
    machine.set_arguments(arguments);

    let code = machine.run()?;
    let exit = machine.exit_condition();
    if exit.code != 0 && exit.exception_type.is_some() {
        report_uncaught(&machine, &exit);
    }
    Ok(code)
}

fn report_uncaught(machine: &Machine, exit: &ExitCondition) {
    let kind = exit.exception_type.as_deref().unwrap_or("Exception");
    let message = exit.message.as_deref().unwrap_or("");
    eprintln!("exception after {} ticks", machine.counter());
    eprintln!("uncaught object: {} = {}", kind, message);
    eprintln!();

    let trace = machine.trace();
    eprintln!("stack trace: from entry point, most recent call last...");
    // The entry point is the implicit start of the trace, not a printed line.
    for frame in trace.iter().skip(1) {
        eprintln!("  {}()", frame.function_name);
    }
    eprintln!();

    let Some(last) = trace.last() else { return };
    eprintln!("frame details:");
    if last.registers_size > 0 {
        eprintln!(
            "  non-empty registers: {}/{}{}",
            last.registers.len(),
            last.registers_size,
            if last.registers.is_empty() { "" } else { ":" }
        );
        for slot in &last.registers {
            eprintln!(
                "    registers[{}]: <{}> {}",
                slot.index, slot.type_name, slot.value
            );
        }
    } else {
        eprintln!("  no registers were allocated for this frame");
    }
    if last.arguments_size > 0 {
        eprintln!(
            "  non-empty arguments (out of {}):",
            last.arguments_size
        );
        for slot in &last.arguments {
            eprintln!(
                "    arguments[{}]: <{}> {}",
                slot.index, slot.type_name, slot.value
            );
        }
    } else {
        eprintln!("  no arguments were passed to this frame");
    }
}
