//! Stack-based bytecode virtual machine.
//!
//! The VM owns all runtime state: a fixed-capacity value stack, the globals
//! array, and a stack of call frames. Execution is a single-threaded
//! fetch-decode-execute loop over the current frame's instruction bytes;
//! every opcode runs to completion before the next is fetched, and any
//! opcode may halt the run with a runtime error.
//!
//! Popping never clears the vacated slot, so the value a top-level
//! expression statement discarded stays readable via [`Vm::last_popped`].
//! The test harness (and the REPL) rely on that slot.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::bytecode::{read_u16, Opcode};
use crate::compiler::Bytecode;
use crate::error::{Error, Result};
use crate::value::{CompiledFunction, HashPair, Value};

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

/// Activation record for one function call.
struct Frame {
    func: Rc<CompiledFunction>,
    /// Index of the next byte to execute in `func.instructions`.
    ip: usize,
    /// Value-stack index where this frame's locals begin. Arguments occupy
    /// the first `num_params` local slots.
    base_pointer: usize,
}

impl Frame {
    fn new(func: Rc<CompiledFunction>, base_pointer: usize) -> Self {
        Frame {
            func,
            ip: 0,
            base_pointer,
        }
    }
}

pub struct Vm {
    constants: Vec<Value>,
    /// Fixed-size operand stack; `sp` points one past the top.
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Vm::with_globals(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Run against an existing globals array, as the REPL does to keep
    /// bindings alive across lines.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_params: 0,
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main, 0));

        Vm {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Reclaim the shared state (constants, globals) after a run.
    pub fn into_state(self) -> (Vec<Value>, Vec<Value>) {
        (self.constants, self.globals)
    }

    /// The most recently popped value. After a program of expression
    /// statements runs to completion this is the last statement's value.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    pub fn run(&mut self) -> Result<()> {
        while self.current_frame().ip < self.current_frame().func.instructions.len() {
            let frame = self.current_frame_mut();
            let byte = frame.func.instructions[frame.ip];
            frame.ip += 1;

            let op = Opcode::try_from(byte)
                .map_err(|_| Error::Runtime(format!("opcode {} undefined", byte)))?;

            match op {
                Opcode::Constant => {
                    let index = self.read_u16_operand();
                    let value = self.constants[index].clone();
                    self.push(value)?;
                }

                Opcode::Pop => {
                    self.pop();
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_operation(op)?;
                }

                Opcode::True => self.push(Value::Boolean(true))?,
                Opcode::False => self.push(Value::Boolean(false))?,
                Opcode::Null => self.push(Value::Null)?,

                Opcode::Equal | Opcode::NotEqual | Opcode::LessThan => {
                    self.execute_comparison(op)?;
                }

                Opcode::Bang => {
                    let operand = self.pop();
                    let negated = match operand {
                        Value::Boolean(value) => !value,
                        Value::Null => true,
                        _ => false,
                    };
                    self.push(Value::Boolean(negated))?;
                }

                Opcode::Minus => {
                    let operand = self.pop();
                    match operand {
                        Value::Integer(value) => {
                            self.push(Value::Integer(value.wrapping_neg()))?;
                        }
                        other => {
                            return Err(Error::Runtime(format!(
                                "unsupported type for negation: {}",
                                other.kind()
                            )));
                        }
                    }
                }

                Opcode::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame_mut().ip = target;
                }

                Opcode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }

                Opcode::SetGlobal => {
                    let index = self.read_u16_operand();
                    self.globals[index] = self.pop();
                }

                Opcode::GetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }

                Opcode::SetLocal => {
                    let index = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    self.stack[base + index] = self.pop();
                }

                Opcode::GetLocal => {
                    let index = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + index].clone();
                    self.push(value)?;
                }

                Opcode::Array => {
                    let count = self.read_u16_operand();
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::Array(elements))?;
                }

                Opcode::Hash => {
                    let count = self.read_u16_operand();
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }

                Opcode::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }

                Opcode::Call => {
                    let arg_count = self.read_u8_operand();
                    self.execute_call(arg_count)?;
                }

                Opcode::ReturnValue => {
                    let value = self.pop();
                    let was_last_frame = self.pop_frame_and_drop_locals();
                    self.push(value)?;
                    if was_last_frame {
                        // A top-level return ends the run; land its value in
                        // the last-popped slot like any statement result.
                        self.pop();
                        return Ok(());
                    }
                }

                Opcode::Return => {
                    let was_last_frame = self.pop_frame_and_drop_locals();
                    self.push(Value::Null)?;
                    if was_last_frame {
                        self.pop();
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stack and frame plumbing
    // -----------------------------------------------------------------------

    fn push(&mut self, value: Value) -> Result<()> {
        if self.sp >= STACK_SIZE {
            return Err(Error::Runtime("stack overflow".to_string()));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top of the stack. The vacated slot keeps its value (see
    /// [`Vm::last_popped`]). An empty stack yields `Null`.
    fn pop(&mut self) -> Value {
        if self.sp == 0 {
            return Value::Null;
        }
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack never empties mid-run")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .expect("frame stack never empties mid-run")
    }

    /// Pop the current frame and rewind `sp` past its locals and callee
    /// slot. Returns `true` when the popped frame was the last one (a
    /// top-level `return`), which ends the run.
    fn pop_frame_and_drop_locals(&mut self) -> bool {
        let frame = self.frames.pop().expect("frame stack never empties mid-run");
        trace!(target: "macaque::vm", depth = self.frames.len(), "frame popped");
        if self.frames.is_empty() {
            return true;
        }
        self.sp = frame.base_pointer - 1;
        false
    }

    fn read_u16_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let operand = read_u16(&frame.func.instructions[frame.ip..]) as usize;
        frame.ip += 2;
        operand
    }

    fn read_u8_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let operand = frame.func.instructions[frame.ip] as usize;
        frame.ip += 1;
        operand
    }

    // -----------------------------------------------------------------------
    // Opcode implementations
    // -----------------------------------------------------------------------

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<()> {
        let right = self.pop();
        let left = self.pop();

        match (&left, &right) {
            (Value::Integer(left), Value::Integer(right)) => {
                self.execute_integer_operation(op, *left, *right)
            }
            (Value::Str(left), Value::Str(right)) if op == Opcode::Add => {
                let concatenated = format!("{}{}", left, right);
                self.push(Value::Str(concatenated))
            }
            _ => Err(Error::Runtime(format!(
                "unsupported types for binary operation: {} {}",
                left.kind(),
                right.kind()
            ))),
        }
    }

    fn execute_integer_operation(&mut self, op: Opcode, left: i64, right: i64) -> Result<()> {
        let result = match op {
            Opcode::Add => left.wrapping_add(right),
            Opcode::Sub => left.wrapping_sub(right),
            Opcode::Mul => left.wrapping_mul(right),
            Opcode::Div => {
                if right == 0 {
                    return Err(Error::Runtime("division by zero".to_string()));
                }
                left.wrapping_div(right)
            }
            _ => unreachable!("non-arithmetic opcode in binary operation"),
        };
        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<()> {
        let right = self.pop();
        let left = self.pop();

        // The ordered comparison exists only for integers; equality between
        // anything else compares the canonical values themselves.
        if let (Value::Integer(left), Value::Integer(right)) = (&left, &right) {
            let result = match op {
                Opcode::Equal => left == right,
                Opcode::NotEqual => left != right,
                Opcode::LessThan => left < right,
                _ => unreachable!("non-comparison opcode in comparison"),
            };
            return self.push(Value::Boolean(result));
        }

        match op {
            Opcode::Equal => self.push(Value::Boolean(left == right)),
            Opcode::NotEqual => self.push(Value::Boolean(left != right)),
            _ => Err(Error::Runtime(format!(
                "unknown operator: {} ({} {})",
                op.definition().name,
                left.kind(),
                right.kind()
            ))),
        }
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Value> {
        let mut pairs = HashMap::with_capacity((end - start) / 2);

        for slot in (start..end).step_by(2) {
            let key = self.stack[slot].clone();
            let value = self.stack[slot + 1].clone();

            let hash_key = key.hash_key().ok_or_else(|| {
                Error::Runtime(format!("unusable as hash key: {}", key.kind()))
            })?;
            pairs.insert(hash_key, HashPair { key, value });
        }

        Ok(Value::Hash(pairs))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> Result<()> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(index)) => {
                let value = if *index < 0 || *index as usize >= elements.len() {
                    Value::Null
                } else {
                    elements[*index as usize].clone()
                };
                self.push(value)
            }
            (Value::Hash(pairs), index) => {
                let hash_key = index.hash_key().ok_or_else(|| {
                    Error::Runtime(format!("unusable as hash key: {}", index.kind()))
                })?;
                let value = pairs
                    .get(&hash_key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(Error::Runtime(format!(
                "index operator not supported: {}",
                left.kind()
            ))),
        }
    }

    fn execute_call(&mut self, arg_count: usize) -> Result<()> {
        let callee = self.stack[self.sp - 1 - arg_count].clone();
        match callee {
            Value::CompiledFunction(func) => self.call_function(func, arg_count),
            Value::Builtin(builtin) => {
                let args = self.stack[self.sp - arg_count..self.sp].to_vec();
                let result = (builtin.func)(&args);
                // Drop the arguments and the callee slot together.
                self.sp -= arg_count + 1;
                self.push(result)
            }
            _ => Err(Error::Runtime("calling non-function".to_string())),
        }
    }

    fn call_function(&mut self, func: Rc<CompiledFunction>, arg_count: usize) -> Result<()> {
        if arg_count != func.num_params {
            return Err(Error::Runtime(format!(
                "wrong number of arguments: want={}, got={}",
                func.num_params, arg_count
            )));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(Error::Runtime("frame stack overflow".to_string()));
        }

        let base_pointer = self.sp - arg_count;
        if base_pointer + func.num_locals > STACK_SIZE {
            return Err(Error::Runtime("stack overflow".to_string()));
        }

        // Arguments already sit in the first local slots; reserve the rest.
        self.sp = base_pointer + func.num_locals;
        self.frames.push(Frame::new(func, base_pointer));
        trace!(target: "macaque::vm", depth = self.frames.len(), "frame pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{make, Instructions};
    use pretty_assertions::assert_eq;

    fn assemble(parts: &[Vec<u8>], constants: Vec<Value>) -> Bytecode {
        Bytecode {
            instructions: Instructions(parts.concat()),
            constants,
        }
    }

    #[test]
    fn last_popped_reads_the_vacated_slot() {
        let bytecode = assemble(
            &[make(Opcode::Constant, &[0]), make(Opcode::Pop, &[])],
            vec![Value::Integer(42)],
        );
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        assert_eq!(vm.sp, 0);
        assert_eq!(vm.last_popped(), &Value::Integer(42));
    }

    #[test]
    fn popping_an_empty_stack_yields_null() {
        let bytecode = assemble(&[make(Opcode::Pop, &[])], vec![]);
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        assert_eq!(vm.sp, 0);
        assert_eq!(vm.last_popped(), &Value::Null);
    }

    #[test]
    fn pushing_past_the_stack_capacity_fails() {
        let parts: Vec<Vec<u8>> = (0..=STACK_SIZE).map(|_| make(Opcode::True, &[])).collect();
        let mut vm = Vm::new(assemble(&parts, vec![]));
        let err = vm.run().unwrap_err();
        assert_eq!(err.to_string(), "runtime error: stack overflow");
    }

    #[test]
    fn runaway_recursion_overflows_the_frame_stack() {
        // Hand-assembled `let f = fn() { f() }; f()` — the compiler cannot
        // produce this (names bind after their initialiser compiles), but
        // the VM must still bound the frame stack.
        let body = Instructions(
            [
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Call, &[0]),
                make(Opcode::ReturnValue, &[]),
            ]
            .concat(),
        );
        let func = Value::CompiledFunction(Rc::new(CompiledFunction {
            instructions: body,
            num_locals: 0,
            num_params: 0,
        }));
        let bytecode = assemble(
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Call, &[0]),
                make(Opcode::Pop, &[]),
            ],
            vec![func],
        );
        let mut vm = Vm::new(bytecode);
        let err = vm.run().unwrap_err();
        assert_eq!(err.to_string(), "runtime error: frame stack overflow");
    }

    #[test]
    fn top_level_return_halts_the_run() {
        let bytecode = assemble(
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::ReturnValue, &[]),
                // Unreachable: the return above ends the run.
                make(Opcode::Constant, &[1]),
                make(Opcode::Pop, &[]),
            ],
            vec![Value::Integer(7), Value::Integer(99)],
        );
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        assert_eq!(vm.sp, 0);
        assert_eq!(vm.last_popped(), &Value::Integer(7));
    }

    #[test]
    fn undefined_opcodes_halt_with_an_error() {
        let bytecode = assemble(&[vec![255]], vec![]);
        let mut vm = Vm::new(bytecode);
        let err = vm.run().unwrap_err();
        assert_eq!(err.to_string(), "runtime error: opcode 255 undefined");
    }
}
