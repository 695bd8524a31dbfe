//! Tree-walking evaluator.
//!
//! The reference interpreter the bytecode backend is measured against. It
//! walks the AST directly with a chain of environments, wraps early returns
//! in [`Value::ReturnValue`], and carries failures as [`Value::Error`]
//! values instead of host errors. Redundant next to the VM, but kept as the
//! semantic oracle for the end-to-end tests: both backends must produce the
//! same observable result for every program both can run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::builtins;
use crate::value::{FunctionValue, HashPair, Value};

pub type Env = Rc<RefCell<Environment>>;

/// One scope's bindings, chained to the scope that encloses it.
#[derive(Debug, Default)]
pub struct Environment {
    store: HashMap<String, Value>,
    outer: Option<Env>,
}

impl Environment {
    pub fn new() -> Env {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn new_enclosed(outer: Env) -> Env {
        Rc::new(RefCell::new(Environment {
            store: HashMap::new(),
            outer: Some(outer),
        }))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self.store.get(name) {
            Some(value) => Some(value.clone()),
            None => self
                .outer
                .as_ref()
                .and_then(|outer| outer.borrow().get(name)),
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.store.insert(name.to_string(), value);
    }
}

pub fn eval_program(program: &Program, env: &Env) -> Value {
    let mut result = Value::Null;
    for statement in &program.statements {
        result = eval_statement(statement, env);
        match result {
            Value::ReturnValue(value) => return *value,
            Value::Error(_) => return result,
            _ => {}
        }
    }
    result
}

fn eval_statement(statement: &Statement, env: &Env) -> Value {
    match statement {
        Statement::Expression(expression) => eval_expression(expression, env),

        Statement::Let { name, value } => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            env.borrow_mut().set(name, value);
            Value::Null
        }

        Statement::Return(value) => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            Value::ReturnValue(Box::new(value))
        }
    }
}

/// Evaluate a block, preserving `ReturnValue` wrappers so they unwind
/// through nested blocks up to the enclosing function (or program).
fn eval_block(block: &BlockStatement, env: &Env) -> Value {
    let mut result = Value::Null;
    for statement in &block.statements {
        result = eval_statement(statement, env);
        if matches!(result, Value::ReturnValue(_) | Value::Error(_)) {
            return result;
        }
    }
    result
}

fn eval_expression(expression: &Expression, env: &Env) -> Value {
    match expression {
        Expression::IntegerLiteral(value) => Value::Integer(*value),
        Expression::StringLiteral(value) => Value::Str(value.clone()),
        Expression::BooleanLiteral(value) => Value::Boolean(*value),

        Expression::Identifier(name) => match env.borrow().get(name) {
            Some(value) => value,
            None => match builtins::lookup(name) {
                Some(builtin) => Value::Builtin(builtin),
                None => Value::Error(format!("identifier not found: {}", name)),
            },
        },

        Expression::Prefix { operator, right } => {
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_prefix_expression(operator, right)
        }

        Expression::Infix {
            operator,
            left,
            right,
        } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_infix_expression(operator, left, right)
        }

        Expression::If {
            condition,
            consequence,
            alternative,
        } => {
            let condition = eval_expression(condition, env);
            if condition.is_error() {
                return condition;
            }
            if condition.is_truthy() {
                eval_block(consequence, env)
            } else if let Some(alternative) = alternative {
                eval_block(alternative, env)
            } else {
                Value::Null
            }
        }

        Expression::FunctionLiteral { parameters, body } => {
            Value::Function(Rc::new(FunctionValue {
                parameters: parameters.clone(),
                body: body.clone(),
                env: env.clone(),
            }))
        }

        Expression::Call {
            function,
            arguments,
        } => {
            let function = eval_expression(function, env);
            if function.is_error() {
                return function;
            }
            let mut args = Vec::with_capacity(arguments.len());
            for argument in arguments {
                let arg = eval_expression(argument, env);
                if arg.is_error() {
                    return arg;
                }
                args.push(arg);
            }
            apply_function(function, args)
        }

        Expression::ArrayLiteral(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                let value = eval_expression(element, env);
                if value.is_error() {
                    return value;
                }
                values.push(value);
            }
            Value::Array(values)
        }

        Expression::HashLiteral(pairs) => {
            let mut hash = HashMap::with_capacity(pairs.len());
            for (key_expr, value_expr) in pairs {
                let key = eval_expression(key_expr, env);
                if key.is_error() {
                    return key;
                }
                let Some(hash_key) = key.hash_key() else {
                    return Value::Error(format!("unusable as hash key: {}", key.kind()));
                };
                let value = eval_expression(value_expr, env);
                if value.is_error() {
                    return value;
                }
                hash.insert(hash_key, HashPair { key, value });
            }
            Value::Hash(hash)
        }

        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let index = eval_expression(index, env);
            if index.is_error() {
                return index;
            }
            eval_index_expression(left, index)
        }
    }
}

fn eval_prefix_expression(operator: &str, right: Value) -> Value {
    match operator {
        // Same truth table as the VM's bang opcode.
        "!" => match right {
            Value::Boolean(value) => Value::Boolean(!value),
            Value::Null => Value::Boolean(true),
            _ => Value::Boolean(false),
        },
        "-" => match right {
            Value::Integer(value) => Value::Integer(value.wrapping_neg()),
            other => Value::Error(format!("unknown operator: -{}", other.kind())),
        },
        other => Value::Error(format!("unknown operator: {}{}", other, right.kind())),
    }
}

fn eval_infix_expression(operator: &str, left: Value, right: Value) -> Value {
    match (&left, &right) {
        (Value::Integer(left), Value::Integer(right)) => {
            eval_integer_infix_expression(operator, *left, *right)
        }
        (Value::Str(left), Value::Str(right)) if operator == "+" => {
            Value::Str(format!("{}{}", left, right))
        }
        _ if left.kind() != right.kind() => Value::Error(format!(
            "type mismatch: {} {} {}",
            left.kind(),
            operator,
            right.kind()
        )),
        _ => match operator {
            "==" => Value::Boolean(left == right),
            "!=" => Value::Boolean(left != right),
            _ => Value::Error(format!(
                "unknown operator: {} {} {}",
                left.kind(),
                operator,
                right.kind()
            )),
        },
    }
}

fn eval_integer_infix_expression(operator: &str, left: i64, right: i64) -> Value {
    match operator {
        "+" => Value::Integer(left.wrapping_add(right)),
        "-" => Value::Integer(left.wrapping_sub(right)),
        "*" => Value::Integer(left.wrapping_mul(right)),
        "/" => {
            if right == 0 {
                Value::Error("division by zero".to_string())
            } else {
                Value::Integer(left.wrapping_div(right))
            }
        }
        "<" => Value::Boolean(left < right),
        ">" => Value::Boolean(left > right),
        "==" => Value::Boolean(left == right),
        "!=" => Value::Boolean(left != right),
        other => Value::Error(format!("unknown operator: INTEGER {} INTEGER", other)),
    }
}

fn eval_index_expression(left: Value, index: Value) -> Value {
    match (&left, &index) {
        (Value::Array(elements), Value::Integer(index)) => {
            if *index < 0 || *index as usize >= elements.len() {
                Value::Null
            } else {
                elements[*index as usize].clone()
            }
        }
        (Value::Hash(pairs), index) => match index.hash_key() {
            Some(hash_key) => pairs
                .get(&hash_key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Value::Null),
            None => Value::Error(format!("unusable as hash key: {}", index.kind())),
        },
        _ => Value::Error(format!("index operator not supported: {}", left.kind())),
    }
}

fn apply_function(function: Value, args: Vec<Value>) -> Value {
    match function {
        Value::Function(func) => {
            if args.len() != func.parameters.len() {
                return Value::Error(format!(
                    "wrong number of arguments: want={}, got={}",
                    func.parameters.len(),
                    args.len()
                ));
            }

            let call_env = Environment::new_enclosed(func.env.clone());
            for (parameter, arg) in func.parameters.iter().zip(args) {
                call_env.borrow_mut().set(parameter, arg);
            }

            match eval_block(&func.body, &call_env) {
                Value::ReturnValue(value) => *value,
                other => other,
            }
        }
        Value::Builtin(builtin) => (builtin.func)(&args),
        other => Value::Error(format!("not a function: {}", other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn eval(input: &str) -> Value {
        let mut parser = Parser::new(Lexer::new(input));
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "parse errors: {:?}", parser.errors());
        eval_program(&program, &Environment::new())
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("(5 + 10 * 2 + 15 / 3) * 2 + -10"), Value::Integer(50));
    }

    #[test]
    fn return_unwinds_nested_blocks() {
        let input = "if (10 > 1) { if (10 > 1) { return 10; } return 1; }";
        assert_eq!(eval(input), Value::Integer(10));
    }

    #[test]
    fn closures_capture_their_environment() {
        let input = "let adder = fn(x) { fn(y) { x + y } }; adder(2)(3)";
        assert_eq!(eval(input), Value::Integer(5));
    }

    #[test]
    fn errors_short_circuit() {
        assert_eq!(
            eval("5 + true; 5;"),
            Value::Error("type mismatch: INTEGER + BOOLEAN".into())
        );
        assert_eq!(
            eval("foobar"),
            Value::Error("identifier not found: foobar".into())
        );
        assert_eq!(
            eval("{[1]: 2}"),
            Value::Error("unusable as hash key: ARRAY".into())
        );
    }

    #[test]
    fn builtins_are_reachable_by_name() {
        assert_eq!(eval("len(\"four\")"), Value::Integer(4));
        assert_eq!(eval("len(append([1], 2))"), Value::Integer(2));
    }
}
