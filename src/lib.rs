//! Macaque — a small embeddable scripting language.
//!
//! Macaque is a dynamically-typed language with integers, booleans,
//! strings, arrays, hashes, and first-class functions, implemented as a
//! classic bytecode pipeline:
//!
//! ```text
//! lexer → Pratt parser → AST → bytecode compiler → stack VM
//! ```
//!
//! A tree-walking evaluator ([`eval`]) shares the value model and acts as
//! the semantic oracle for the VM in the test suite.
//!
//! # Quick start
//!
//! ```
//! use macaque::{Interpreter, Value};
//!
//! let mut interp = Interpreter::new();
//! interp.run(r#"let greeting = "hello " + "world";"#).unwrap();
//! assert_eq!(
//!     interp.run("greeting").unwrap(),
//!     Value::Str("hello world".to_string()),
//! );
//! ```
//!
//! # Language
//!
//! ## Types
//! - `null`, booleans, 64-bit integers, strings
//! - arrays, hashes (integer, boolean, and string keys)
//! - functions (`fn(a, b) { ... }`), first-class and callable anywhere
//!
//! ## Expressions
//! - arithmetic: `+`, `-`, `*`, `/` (integer division)
//! - comparison: `<`, `>`, `==`, `!=`
//! - prefix: `!x`, `-x`
//! - `if (cond) { ... } else { ... }` is an expression; a missing or
//!   skipped branch yields `null`
//! - indexing: `array[i]`, `hash[key]` (out-of-range yields `null`)
//!
//! ## Statements
//! - `let name = value;` binds globals at the top level and frame locals
//!   inside functions
//! - `return value;` exits the enclosing function
//!
//! ## Built-in functions
//! - `len`, `puts`, `append`, `insert`, `ordered_remove`,
//!   `unordered_remove`
//!
//! # Not supported
//!
//! - Closures: a function may read globals and its own locals, but
//!   capturing an enclosing function's locals is a compile error
//! - Loops (recursion is the intended substitute, via function arguments)
//! - Garbage collection beyond host reclamation; values have clone
//!   semantics

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod eval;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod symbols;
pub mod token;
pub mod value;
pub mod vm;

pub use error::{Error, Result};
pub use interpreter::Interpreter;
pub use value::Value;
