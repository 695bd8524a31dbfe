//! Symbol table: lexically nested name resolution.
//!
//! Each function literal gets its own table enclosing the one outside it.
//! Defining assigns the next index in the current table; resolution walks
//! outward. Note that resolution itself is scope-blind — a `Local` symbol is
//! visible from deeper tables — and it is the compiler that rejects
//! captures of enclosing locals, since the instruction set has no opcode to
//! reach another frame's stack slots.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Index into the VM's globals array.
    Global,
    /// Index into the owning frame's local slots.
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    /// Number of definitions in this table; the next symbol's index.
    pub num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Create a table enclosed by `outer`. The enclosing table moves in and
    /// comes back out of [`SymbolTable::into_outer`].
    pub fn new_enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            store: HashMap::new(),
            num_definitions: 0,
        }
    }

    /// Discard this table and return the one it encloses.
    pub fn into_outer(self) -> SymbolTable {
        *self.outer.expect("into_outer called on the global table")
    }

    /// Whether this is the outermost (global) table.
    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Look up a name here, then in enclosing tables.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.store
            .get(name)
            .or_else(|| self.outer.as_ref().and_then(|outer| outer.resolve(name)))
    }

    /// Whether the name is defined in this table itself (not an enclosing
    /// one). Used to tell a frame's own locals from captured ones.
    pub fn is_defined_here(&self, name: &str) -> bool {
        self.store.contains_key(name)
    }
}
