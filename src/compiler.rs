//! Bytecode compiler: translates the AST into instructions.
//!
//! The compiler walks the AST once and appends byte-encoded instructions to
//! the topmost compilation scope; function literals push a fresh scope and
//! pop it into a [`CompiledFunction`] constant. Jumps use a placeholder
//! operand that is patched in place once the target offset is known. The
//! symbol table travels with the compiler so a REPL can keep definitions
//! (and the constant pool) alive across inputs via [`Compiler::with_state`].

use std::rc::Rc;

use tracing::debug;

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::builtins;
use crate::bytecode::{self, Instructions, Opcode};
use crate::error::{Error, Result};
use crate::symbols::{Symbol, SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};
use crate::vm::GLOBALS_SIZE;

/// Compiler output: the main instruction stream plus the constant pool it
/// references. Function bodies live inside the pool as
/// [`Value::CompiledFunction`] entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Instruction buffer for one function body under compilation, with the
/// bookkeeping needed to rewrite its tail (conditional results, implicit
/// returns).
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

pub struct Compiler {
    constants: Vec<Value>,
    symbols: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler::with_state(Vec::new(), SymbolTable::new())
    }

    /// Continue compiling against an existing constant pool and symbol
    /// table, as the REPL does between lines.
    pub fn with_state(constants: Vec<Value>, symbols: SymbolTable) -> Self {
        Compiler {
            constants,
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn compile(&mut self, program: &Program) -> Result<()> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        debug!(
            target: "macaque::compiler",
            instructions = self.scope().instructions.len(),
            constants = self.constants.len(),
            "compiled program"
        );
        Ok(())
    }

    /// The compiled artifact. The compiler can keep emitting afterwards;
    /// constant-pool indices remain stable.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Tear down into the compiled artifact plus the symbol table, for
    /// callers that thread state across compilations.
    pub fn finish(mut self) -> (Bytecode, SymbolTable) {
        let instructions = std::mem::take(&mut self.scopes[0].instructions);
        (
            Bytecode {
                instructions,
                constants: self.constants,
            },
            self.symbols,
        )
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn compile_statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                // Every expression statement balances its push.
                self.emit(Opcode::Pop, &[]);
            }

            Statement::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbols.define(name);
                self.store_symbol(&symbol)?;
            }

            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<()> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn compile_expression(&mut self, expression: &Expression) -> Result<()> {
        match expression {
            Expression::IntegerLiteral(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::Constant, &[index]);
            }

            Expression::StringLiteral(value) => {
                let index = self.add_constant(Value::Str(value.clone()));
                self.emit(Opcode::Constant, &[index]);
            }

            Expression::BooleanLiteral(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expression::BooleanLiteral(false) => {
                self.emit(Opcode::False, &[]);
            }

            Expression::Identifier(name) => self.compile_identifier(name)?,

            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(Opcode::Bang, &[]),
                    "-" => self.emit(Opcode::Minus, &[]),
                    other => {
                        return Err(Error::Compile(format!("unknown operator: {}", other)));
                    }
                };
            }

            Expression::Infix {
                operator,
                left,
                right,
            } => {
                // `a > b` compiles as `b < a`; one comparison opcode covers
                // both directions.
                if operator == ">" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::LessThan, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator.as_str() {
                    "+" => self.emit(Opcode::Add, &[]),
                    "-" => self.emit(Opcode::Sub, &[]),
                    "*" => self.emit(Opcode::Mul, &[]),
                    "/" => self.emit(Opcode::Div, &[]),
                    "<" => self.emit(Opcode::LessThan, &[]),
                    "==" => self.emit(Opcode::Equal, &[]),
                    "!=" => self.emit(Opcode::NotEqual, &[]),
                    other => {
                        return Err(Error::Compile(format!("unknown operator: {}", other)));
                    }
                };
            }

            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                // Placeholder target, patched once the consequence length
                // is known.
                let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[9999]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(Opcode::Pop) {
                    // The branch value is the expression's result; keep it
                    // on the stack.
                    self.remove_last_pop();
                }

                let jump = self.emit(Opcode::Jump, &[9999]);

                let after_consequence = self.scope().instructions.len();
                self.change_operand(jump_not_truthy, after_consequence);

                match alternative {
                    None => {
                        self.emit(Opcode::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Opcode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.scope().instructions.len();
                self.change_operand(jump, after_alternative);
            }

            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }

            Expression::HashLiteral(pairs) => {
                // Emission order is the keys' string rendering, so that the
                // same AST always yields the same bytecode.
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
            }

            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }

            Expression::FunctionLiteral { parameters, body } => {
                self.compile_function_literal(parameters, body)?;
            }

            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_identifier(&mut self, name: &str) -> Result<()> {
        if let Some(symbol) = self.symbols.resolve(name).cloned() {
            if symbol.scope == SymbolScope::Local && !self.symbols.is_defined_here(name) {
                return Err(Error::Compile(format!(
                    "capturing outer locals not supported: {}",
                    name
                )));
            }
            self.load_symbol(&symbol);
            return Ok(());
        }

        // Not a binding; builtins are materialised as constants since the
        // instruction set has no dedicated builtin load.
        if let Some(builtin) = builtins::lookup(name) {
            let index = self.add_constant(Value::Builtin(builtin));
            self.emit(Opcode::Constant, &[index]);
            return Ok(());
        }

        Err(Error::Compile(format!("undefined variable {}", name)))
    }

    fn compile_function_literal(
        &mut self,
        parameters: &[String],
        body: &BlockStatement,
    ) -> Result<()> {
        self.enter_scope();

        for parameter in parameters {
            self.symbols.define(parameter);
        }

        self.compile_block(body)?;

        // A body ending in an expression statement returns that value; a
        // body with no trailing value returns null.
        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let num_locals = self.symbols.num_definitions;
        let instructions = self.leave_scope();

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_params: parameters.len(),
        };
        let index = self.add_constant(Value::CompiledFunction(Rc::new(function)));
        self.emit(Opcode::Constant, &[index]);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
        };
    }

    fn store_symbol(&mut self, symbol: &Symbol) -> Result<()> {
        match symbol.scope {
            SymbolScope::Global => {
                if symbol.index >= GLOBALS_SIZE {
                    return Err(Error::Compile("too many global bindings".to_string()));
                }
                self.emit(Opcode::SetGlobal, &[symbol.index]);
            }
            SymbolScope::Local => {
                if symbol.index > u8::MAX as usize {
                    return Err(Error::Compile(
                        "too many local bindings in one function".to_string(),
                    ));
                }
                self.emit(Opcode::SetLocal, &[symbol.index]);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Emission helpers
    // -----------------------------------------------------------------------

    fn scope(&self) -> &CompilationScope {
        self.scopes.last().expect("compiler always has a scope")
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("compiler always has a scope")
    }

    /// Append one instruction to the current scope; returns its position.
    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = bytecode::make(op, operands);
        let scope = self.scope_mut();

        let position = scope.instructions.len();
        scope.instructions.extend(instruction);

        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });

        position
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        matches!(self.scope().last_instruction, Some(last) if last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope_mut();
        let last = scope.last_instruction.expect("no instruction to remove");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_last_pop_with_return(&mut self) {
        let position = self
            .scope()
            .last_instruction
            .expect("no instruction to replace")
            .position;

        let instruction = bytecode::make(Opcode::ReturnValue, &[]);
        self.replace_instruction(position, &instruction);
        self.scope_mut()
            .last_instruction
            .as_mut()
            .expect("checked above")
            .opcode = Opcode::ReturnValue;
    }

    /// Overwrite the instruction at `position` in place. The replacement
    /// must be the same width as the original.
    fn replace_instruction(&mut self, position: usize, instruction: &[u8]) {
        let instructions = &mut self.scope_mut().instructions;
        instructions[position..position + instruction.len()].copy_from_slice(instruction);
    }

    /// Re-encode the operand of the (jump) instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = Opcode::try_from(self.scope().instructions[position])
            .expect("change_operand on a non-opcode byte");
        let instruction = bytecode::make(op, &[operand]);
        self.replace_instruction(position, &instruction);
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbols = SymbolTable::new_enclosed(std::mem::take(&mut self.symbols));
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leave_scope without enter_scope");
        self.symbols = std::mem::take(&mut self.symbols).into_outer();
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}
