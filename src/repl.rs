// File: src/repl.rs
//
// Interactive REPL. spec.md §6's `repl()` reads one line at a time and
// feeds it straight to `interpret`, looping until EOF (^D) — no multi-line
// accumulation, no `:command` menu. We keep the teacher's choice of
// `rustyline` for line editing/history and a colored prompt, trimmed to
// that single-line contract.

use crate::vm::{InterpretError, VM};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub struct Repl {
    vm: VM,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl { vm: VM::new(), editor })
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            match self.editor.readline(&"> ".bright_green().to_string()) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());
                    self.eval_line(&line);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }
        Ok(())
    }

    fn eval_line(&mut self, line: &str) {
        match self.vm.interpret(line) {
            Ok(()) => {}
            Err(InterpretError::Compile(errors)) => crate::errors::print_compile_errors(&errors),
            Err(InterpretError::Runtime(e)) => crate::errors::print_runtime_error(&e),
        }
    }
}
