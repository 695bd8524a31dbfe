//! Crate-wide error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The parser's accumulated diagnostics. Compilation is skipped for
    /// inputs that fail to parse.
    #[error("parse error: {}", .0.join("; "))]
    Parse(Vec<String>),

    /// A single compile-time failure (unknown operator, undefined
    /// variable, unsupported capture). No partial bytecode is produced.
    #[error("compile error: {0}")]
    Compile(String),

    /// A failure raised by the VM mid-run. The VM halts; the driver loop
    /// survives.
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
