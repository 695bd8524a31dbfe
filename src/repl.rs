//! Interactive read-eval-print loop.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{Error, Result};
use crate::interpreter::Interpreter;

const PROMPT: &str = "$ ";

/// Read one line per iteration until end of input. The interpreter state —
/// bindings, constants, globals — persists across lines; every kind of
/// error is printed and the loop continues.
pub fn start() -> Result<()> {
    let mut editor = DefaultEditor::new().map_err(|err| Error::Runtime(err.to_string()))?;
    let mut interpreter = Interpreter::new();

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match interpreter.run(&line) {
                    Ok(value) => println!("{}", value),
                    Err(Error::Parse(messages)) => print_parse_errors(&messages),
                    Err(err) => println!("{}", err),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(Error::Runtime(err.to_string())),
        }
    }
}

pub fn print_parse_errors(messages: &[String]) {
    println!("parser errors:");
    for message in messages {
        println!("\t{}", message);
    }
}
