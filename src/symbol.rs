use std::collections::HashMap;

use crate::value::SymbolId;

/// Interned symbol table. Each distinct name maps to exactly one SymbolId,
/// so every later comparison is an id comparison.
///
/// The table is owned by its `Machine` and lives as long as it does; symbols
/// are inline values and never occupy heap cells, so nothing here is ever
/// swept.
pub struct SymbolTable {
    name_to_id: HashMap<String, SymbolId>,
    id_to_name: Vec<String>,
}

/// Well-known symbol IDs, pre-interned at startup.
/// These must match the order of interning in SymbolTable::new().
pub mod sym {
    use crate::value::SymbolId;

    pub const T: SymbolId = SymbolId(0);
    pub const QUOTE: SymbolId = SymbolId(1);
    pub const QUASIQUOTE: SymbolId = SymbolId(2);
    pub const UNQUOTE: SymbolId = SymbolId(3);
    pub const UNQUOTE_SPLICING: SymbolId = SymbolId(4);
    pub const DEFINE: SymbolId = SymbolId(5);
    pub const LAMBDA: SymbolId = SymbolId(6);
    pub const IF: SymbolId = SymbolId(7);
    pub const DEFMACRO: SymbolId = SymbolId(8);
    pub const SET: SymbolId = SymbolId(9);
    pub const APPLY: SymbolId = SymbolId(10);
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create a new symbol table with all well-known symbols pre-interned.
    /// The order MUST match the constants in the `sym` module above.
    pub fn new() -> Self {
        let names = [
            "T",
            "QUOTE",
            "QUASIQUOTE",
            "UNQUOTE",
            "UNQUOTE-SPLICING",
            "DEFINE",
            "LAMBDA",
            "IF",
            "DEFMACRO",
            "SET!",
            "APPLY",
        ];

        let mut table = SymbolTable {
            name_to_id: HashMap::new(),
            id_to_name: Vec::new(),
        };
        for name in names {
            table.intern(name);
        }
        table
    }

    /// Intern a symbol name. Returns the existing ID if already interned,
    /// or creates a new one. Names are taken verbatim; case folding is the
    /// reader's job.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = SymbolId(self.id_to_name.len() as u32);
        self.name_to_id.insert(name.to_string(), id);
        self.id_to_name.push(name.to_string());
        id
    }

    /// Look up a symbol name by its ID.
    pub fn name(&self, id: SymbolId) -> &str {
        self.id_to_name
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("#<UNKNOWN-SYMBOL>")
    }

    /// Look up a symbol ID by name, without interning.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.name_to_id.get(name).copied()
    }

    /// Total number of interned symbols.
    pub fn count(&self) -> usize {
        self.id_to_name.len()
    }
}
