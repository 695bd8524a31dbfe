use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use macaque::{repl, Error, Interpreter};

/// Bytecode interpreter for the Macaque scripting language.
#[derive(Parser)]
#[command(name = "macaque", version, about)]
struct Cli {
    /// Script to run; starts a REPL when omitted.
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.script {
        Some(path) => run_file(path),
        None => repl::start(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn run_file(path: &Path) -> macaque::Result<()> {
    let source = fs::read_to_string(path)?;
    let mut interpreter = Interpreter::new();
    interpreter.run(&source)?;
    Ok(())
}

fn report(err: &Error) {
    match err {
        Error::Parse(messages) => {
            eprintln!("parser errors:");
            for message in messages {
                eprintln!("\t{}", message);
            }
        }
        other => eprintln!("{}", other),
    }
}
