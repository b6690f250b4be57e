//! Lexical environments.
//!
//! An environment is an ordinary heap pair `(parent . bindings)`, where
//! `bindings` is a list of `(symbol . value)` pairs, most recent first and
//! `parent` is another environment or nil at the root. Because environments
//! are plain cells they are traced by the collector like any other data.

use crate::heap::Heap;
use crate::value::{CellId, SymbolId, Value};

/// Build a new environment with no bindings.
pub fn create(heap: &mut Heap, parent: Value) -> Value {
    heap.cons(parent, Value::Nil)
}

/// Find the `(symbol . value)` cell for `name` in one frame's bindings.
fn local_binding(heap: &Heap, env: CellId, name: SymbolId) -> Option<CellId> {
    let mut current = heap.cdr(env);
    while let Value::Pair(id) = current {
        if let Value::Pair(bid) = heap.car(id) {
            if heap.car(bid) == Value::Symbol(name) {
                return Some(bid);
            }
        }
        current = heap.cdr(id);
    }
    None
}

/// Find the binding cell for `name`, walking from `env` out to the root.
fn find_binding(heap: &Heap, env: Value, name: SymbolId) -> Option<CellId> {
    let mut current = env;
    while let Value::Pair(id) = current {
        if let Some(binding) = local_binding(heap, id, name) {
            return Some(binding);
        }
        current = heap.car(id);
    }
    None
}

/// Bind `name` in `env` itself: overwrite a local binding or prepend a new
/// one. Ancestors are never touched.
pub fn define(heap: &mut Heap, env: Value, name: SymbolId, val: Value) {
    let Value::Pair(id) = env else {
        return;
    };
    if let Some(binding) = local_binding(heap, id, name) {
        heap.set_cdr(binding, val);
        return;
    }
    let binding = heap.cons(Value::Symbol(name), val);
    let bindings = heap.cons(binding, heap.cdr(id));
    heap.set_cdr(id, bindings);
}

/// Look `name` up through the chain. None means unbound.
pub fn get(heap: &Heap, env: Value, name: SymbolId) -> Option<Value> {
    find_binding(heap, env, name).map(|binding| heap.cdr(binding))
}

/// Mutate the nearest existing binding of `name`. Returns false, changing
/// nothing, when no frame in the chain binds it.
pub fn set(heap: &mut Heap, env: Value, name: SymbolId, val: Value) -> bool {
    match find_binding(heap, env, name) {
        Some(binding) => {
            heap.set_cdr(binding, val);
            true
        }
        None => false,
    }
}
