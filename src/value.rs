use std::fmt;

/// Unique identifier for an interned symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Index into the machine's builtin registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuiltinId(pub u32);

/// Index into the cell arena. This is the GC handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(pub u32);

/// A runtime value. Copy semantics: compound data lives in the heap and is
/// referenced by `CellId`, so equality on `Value` is identity for compound
/// values and value equality for the inline scalars.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Nil,
    Pair(CellId),
    Symbol(SymbolId),
    Integer(i64),
    Builtin(BuiltinId),
    /// Cell layout: car = captured environment, cdr = (params . body).
    Closure(CellId),
    /// Same layout as `Closure`; expands instead of being applied.
    Macro(CellId),
}

impl Value {
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_pair(self) -> bool {
        matches!(self, Value::Pair(_))
    }

    pub fn is_symbol(self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    pub fn as_pair(self) -> Option<CellId> {
        match self {
            Value::Pair(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_symbol(self) -> Option<SymbolId> {
        match self {
            Value::Symbol(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_integer(self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// The heap cell backing a compound value.
    pub fn cell(self) -> Option<CellId> {
        match self {
            Value::Pair(id) | Value::Closure(id) | Value::Macro(id) => Some(id),
            _ => None,
        }
    }

    /// Short variant name, used in error messages.
    pub fn type_name(self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Pair(_) => "pair",
            Value::Symbol(_) => "symbol",
            Value::Integer(_) => "integer",
            Value::Builtin(_) => "builtin",
            Value::Closure(_) => "closure",
            Value::Macro(_) => "macro",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Pair(id) => write!(f, "Pair({})", id.0),
            Value::Symbol(id) => write!(f, "Sym({})", id.0),
            Value::Integer(n) => write!(f, "Int({})", n),
            Value::Builtin(id) => write!(f, "Builtin({})", id.0),
            Value::Closure(id) => write!(f, "Closure({})", id.0),
            Value::Macro(id) => write!(f, "Macro({})", id.0),
        }
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Debug for BuiltinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinId({})", self.0)
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellId({})", self.0)
    }
}
