// File: src/errors.rs
//
// The two error regimes spec.md §7 describes. Compile errors are collected
// as plain strings by the compiler (each already formatted `[line L] Error
// ...`) and printed as a block; runtime errors carry a message plus the
// call-frame trace the VM had live when the fault occurred. Colored output
// follows the teacher's `RuffError` — `colored::Colorize` wraps only the
// prefix, so output piped to a file still carries the plain message.

use colored::Colorize;
use std::fmt;

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 64;
pub const EXIT_COMPILE_ERROR: i32 = 65;
pub const EXIT_RUNTIME_ERROR: i32 = 70;
pub const EXIT_IO_ERROR: i32 = 74;

pub fn print_compile_errors(errors: &[String]) {
    for line in errors {
        eprintln!("{}", line.red());
    }
}

/// One entry in a runtime stack trace, innermost frame first.
pub struct TraceFrame {
    pub line: u32,
    /// `None` for the top-level script frame ("in script").
    pub function_name: Option<String>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function_name {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<TraceFrame>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for frame in &self.trace {
            writeln!(f, "{}", frame.to_string().dimmed())?;
        }
        Ok(())
    }
}

pub fn print_runtime_error(err: &RuntimeError) {
    eprint!("{}", err);
}
