use crate::env;
use crate::error::LispResult;
use crate::eval::Machine;
use crate::primitives::LIBRARY;
use crate::symbol::sym;
use crate::value::Value;

/// Lisp-level library: list utilities, QUASIQUOTE and LET.
pub const PRELUDE: &str = include_str!("library.lisp");

/// Seed the global environment.
/// Pre-installs:
///   - T = T
///   - every primitive in `LIBRARY`, bound to its builtin under its name
pub fn install_primitives(machine: &mut Machine) {
    let global = machine.global;
    env::define(&mut machine.heap, global, sym::T, Value::Symbol(sym::T));

    for &(name, func) in LIBRARY {
        let builtin = machine.make_builtin(name, func);
        let id = machine.symbols.intern(name);
        env::define(&mut machine.heap, global, id, builtin);
    }
    tracing::debug!(builtins = LIBRARY.len(), "installed primitives");
}

/// Evaluate the prelude in the global environment.
pub fn load_prelude(machine: &mut Machine) -> LispResult<()> {
    machine.eval_str(PRELUDE)?;
    tracing::debug!(
        symbols = machine.symbols.count(),
        live_cells = machine.heap.live_count(),
        "loaded prelude"
    );
    Ok(())
}
