//! Runtime values.
//!
//! Every value the language can produce is a `Value` variant. The compiler
//! stores them in the constant pool, the VM moves them across its stack, and
//! the tree-walking evaluator shares the same representation (the
//! `Function` and `ReturnValue` variants exist only for its benefit).

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::BlockStatement;
use crate::builtins::Builtin;
use crate::bytecode::Instructions;
use crate::eval::Env;

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Str(String),
    Null,
    Array(Vec<Value>),
    Hash(HashMap<HashKey, HashPair>),
    /// A bytecode function: owned instructions plus its stack-frame shape.
    CompiledFunction(Rc<CompiledFunction>),
    /// A host-side builtin, resolved by name at compile time.
    Builtin(&'static Builtin),
    /// An AST function closing over its defining environment. Only the
    /// tree-walking evaluator produces these.
    Function(Rc<FunctionValue>),
    /// Early-return wrapper used by the tree-walking evaluator.
    ReturnValue(Box<Value>),
    /// A runtime diagnostic carried as a value.
    Error(String),
}

/// Type tag used for runtime dispatch and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    Boolean,
    Str,
    Null,
    Array,
    Hash,
    CompiledFunction,
    Builtin,
    Function,
    ReturnValue,
    Error,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Integer => "INTEGER",
            ValueKind::Boolean => "BOOLEAN",
            ValueKind::Str => "STRING",
            ValueKind::Null => "NULL",
            ValueKind::Array => "ARRAY",
            ValueKind::Hash => "HASHMAP",
            ValueKind::CompiledFunction => "COMPILED_FUNCTION",
            ValueKind::Builtin => "BUILTIN",
            ValueKind::Function => "FUNCTION",
            ValueKind::ReturnValue => "RETURN_VALUE",
            ValueKind::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Key derived from a hashable value. Two values that compare equal under
/// the language's `==` derive the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: ValueKind,
    pub value: u64,
}

/// A hash entry keeps the original key value alongside the mapped value so
/// the pair can be rendered back to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A function lowered to bytecode. `num_locals` counts parameters plus
/// let-bound locals; the VM reserves that many stack slots above the frame's
/// base pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_params: usize,
}

/// An AST-level function value for the tree-walking evaluator.
pub struct FunctionValue {
    pub parameters: Vec<String>,
    pub body: BlockStatement,
    pub env: Env,
}

// The captured environment can reach this function again; render without it.
impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Integer(_) => ValueKind::Integer,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Str(_) => ValueKind::Str,
            Value::Null => ValueKind::Null,
            Value::Array(_) => ValueKind::Array,
            Value::Hash(_) => ValueKind::Hash,
            Value::CompiledFunction(_) => ValueKind::CompiledFunction,
            Value::Builtin(_) => ValueKind::Builtin,
            Value::Function(_) => ValueKind::Function,
            Value::ReturnValue(_) => ValueKind::ReturnValue,
            Value::Error(_) => ValueKind::Error,
        }
    }

    /// `false` and `null` are falsy; everything else (including `0` and
    /// the empty string) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(value) => *value,
            Value::Null => false,
            _ => true,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_hashable(&self) -> bool {
        self.hash_key().is_some()
    }

    /// Derive the hash key for this value: integers bit-cast to `u64`,
    /// booleans map to 0/1, strings hash with 64-bit FNV-1a. Other types
    /// are not usable as hash keys.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(value) => Some(HashKey {
                kind: ValueKind::Integer,
                value: *value as u64,
            }),
            Value::Boolean(value) => Some(HashKey {
                kind: ValueKind::Boolean,
                value: u64::from(*value),
            }),
            Value::Str(value) => Some(HashKey {
                kind: ValueKind::Str,
                value: fnv1a_64(value.as_bytes()),
            }),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::ReturnValue(a), Value::ReturnValue(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{}", value),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Str(value) => f.write_str(value),
            Value::Null => f.write_str("null"),
            Value::Array(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            }
            Value::Hash(pairs) => {
                let pairs: Vec<String> = pairs
                    .values()
                    .map(|pair| format!("{}: {}", pair.key, pair.value))
                    .collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Value::CompiledFunction(func) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func))
            }
            Value::Builtin(_) => f.write_str("builtin function"),
            Value::Function(func) => {
                write!(f, "fn({}) {{\n{}\n}}", func.parameters.join(", "), func.body)
            }
            Value::ReturnValue(value) => write!(f, "{}", value),
            Value::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

/// 64-bit FNV-1a over a byte slice.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, &byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_share_a_hash_key() {
        let hello1 = Value::Str("Hello World".to_string());
        let hello2 = Value::Str("Hello World".to_string());
        let diff = Value::Str("My name is johnny".to_string());

        assert_eq!(hello1.hash_key(), hello2.hash_key());
        assert_ne!(hello1.hash_key(), diff.hash_key());
    }

    #[test]
    fn hash_keys_are_type_tagged() {
        // `1` and `true` must not collide even though both encode as 1.
        let int = Value::Integer(1).hash_key().unwrap();
        let boolean = Value::Boolean(true).hash_key().unwrap();
        assert_eq!(boolean.value, 1);
        assert_ne!(int, boolean);
    }

    #[test]
    fn negative_integers_bit_cast() {
        let key = Value::Integer(-1).hash_key().unwrap();
        assert_eq!(key.value, u64::MAX);
    }

    #[test]
    fn only_scalars_are_hashable() {
        assert!(Value::Integer(0).is_hashable());
        assert!(Value::Boolean(false).is_hashable());
        assert!(Value::Str(String::new()).is_hashable());
        assert!(!Value::Null.is_hashable());
        assert!(!Value::Array(vec![]).is_hashable());
    }

    #[test]
    fn truthiness() {
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn display_renders_inspect_form() {
        let array = Value::Array(vec![
            Value::Integer(1),
            Value::Str("two".to_string()),
            Value::Null,
        ]);
        assert_eq!(array.to_string(), "[1, two, null]");
        assert_eq!(Value::Error("boom".to_string()).to_string(), "ERROR: boom");
    }
}
