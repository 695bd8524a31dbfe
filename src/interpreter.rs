//! The embedding facade: parse → compile → execute with persistent state.

use tracing::debug;

use crate::compiler::Compiler;
use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::symbols::SymbolTable;
use crate::value::Value;
use crate::vm::{Vm, GLOBALS_SIZE};

/// Compiles and runs source text on the bytecode VM.
///
/// A single `Interpreter` is meant to be reused: the constant pool, the
/// globals array, and the symbol table survive between [`run`](Self::run)
/// calls, so bindings from one input remain visible to the next — this is
/// what keeps a REPL session coherent.
///
/// # Example
///
/// ```
/// use macaque::{Interpreter, Value};
///
/// let mut interp = Interpreter::new();
/// interp.run("let add = fn(a, b) { a + b };").unwrap();
/// assert_eq!(interp.run("add(2, 3)").unwrap(), Value::Integer(5));
/// ```
pub struct Interpreter {
    constants: Vec<Value>,
    globals: Vec<Value>,
    symbols: SymbolTable,
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            constants: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
            symbols: SymbolTable::new(),
        }
    }

    /// Run one source text to completion and return the value of its last
    /// expression statement (the VM's last-popped slot).
    ///
    /// Parse errors skip compilation entirely; compile and runtime errors
    /// leave the accumulated state intact so the caller can keep going.
    pub fn run(&mut self, source: &str) -> Result<Value> {
        let mut parser = Parser::new(Lexer::new(source));
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            return Err(Error::Parse(parser.errors().to_vec()));
        }

        let mut compiler = Compiler::with_state(
            std::mem::take(&mut self.constants),
            std::mem::take(&mut self.symbols),
        );
        let compiled = compiler.compile(&program);
        let (bytecode, symbols) = compiler.finish();
        self.symbols = symbols;

        if let Err(err) = compiled {
            self.constants = bytecode.constants;
            return Err(err);
        }

        debug!(
            target: "macaque::interpreter",
            instructions = bytecode.instructions.len(),
            "running program"
        );

        let mut vm = Vm::with_globals(bytecode, std::mem::take(&mut self.globals));
        let outcome = vm.run();
        let value = vm.last_popped().clone();

        let (constants, globals) = vm.into_state();
        self.constants = constants;
        self.globals = globals;

        outcome?;
        Ok(value)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}
