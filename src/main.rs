// File: src/main.rs
//
// CLI entry point (spec.md §6). The teacher's binary is a `clap` derive
// with a wide `Commands` subcommand enum (Run/Repl/Test/Bench/Profile/...);
// we keep `clap` but shrink the surface to the two modes spec.md actually
// asks for: no arguments opens the REPL, one path argument reads and runs
// that file. Exit codes follow spec.md §6 exactly, the BSD `sysexits.h`
// convention clox's own `main()` uses.

mod chunk;
mod compiler;
mod disasm;
mod errors;
mod heap;
mod natives;
mod opcode;
mod repl;
mod scanner;
mod token;
mod value;
mod vm;

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process::ExitCode;
use vm::{InterpretError, VM};

#[derive(ClapParser)]
#[command(
    name = "wisp",
    about = "Wisp: a lean, dynamically-typed scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    /// Path to a .wisp script. Omit to start the REPL.
    path: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.path {
        None => run_repl(),
        Some(path) => run_file(&path),
    }
}

fn run_repl() -> ExitCode {
    match repl::Repl::new() {
        Ok(mut repl) => match repl.run() {
            Ok(()) => ExitCode::from(errors::EXIT_OK as u8),
            Err(e) => {
                eprintln!("REPL error: {e}");
                ExitCode::from(errors::EXIT_IO_ERROR as u8)
            }
        },
        Err(e) => {
            eprintln!("Failed to start REPL: {e}");
            ExitCode::from(errors::EXIT_IO_ERROR as u8)
        }
    }
}

fn run_file(path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Could not read file '{}': {}", path.display(), e);
            return ExitCode::from(errors::EXIT_IO_ERROR as u8);
        }
    };

    let mut vm = VM::new();
    match vm.interpret(&source) {
        Ok(()) => ExitCode::from(errors::EXIT_OK as u8),
        Err(InterpretError::Compile(errs)) => {
            errors::print_compile_errors(&errs);
            ExitCode::from(errors::EXIT_COMPILE_ERROR as u8)
        }
        Err(InterpretError::Runtime(e)) => {
            errors::print_runtime_error(&e);
            ExitCode::from(errors::EXIT_RUNTIME_ERROR as u8)
        }
    }
}
