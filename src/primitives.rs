use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::symbol::sym;
use crate::value::{BuiltinId, Value};

/// Contract for native procedures: take the already-evaluated argument list,
/// return a value or an error. Builtins check their own arity and operand
/// types and never see unevaluated code.
pub type BuiltinFn = fn(&mut Heap, Value) -> LispResult<Value>;

/// A registered native procedure.
pub struct Primitive {
    pub name: String,
    pub func: BuiltinFn,
}

/// Registry behind `Value::Builtin`. Ids are indices into `entries`, so two
/// builtin values are `eq?` exactly when they came from the same registration.
#[derive(Default)]
pub struct BuiltinTable {
    entries: Vec<Primitive>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, func: BuiltinFn) -> Value {
        let id = BuiltinId(self.entries.len() as u32);
        self.entries.push(Primitive {
            name: name.to_string(),
            func,
        });
        Value::Builtin(id)
    }

    pub fn get(&self, id: BuiltinId) -> Option<&Primitive> {
        self.entries.get(id.0 as usize)
    }

    pub fn name(&self, id: BuiltinId) -> &str {
        self.get(id).map(|p| p.name.as_str()).unwrap_or("?")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The primitive library, in the order it is installed into the global
/// environment.
pub const LIBRARY: &[(&str, BuiltinFn)] = &[
    ("CAR", prim_car),
    ("CDR", prim_cdr),
    ("CONS", prim_cons),
    ("+", prim_add),
    ("-", prim_sub),
    ("*", prim_mul),
    ("/", prim_div),
    ("=", prim_num_eq),
    ("<", prim_less),
    ("EQ?", prim_eq),
    ("PAIR?", prim_pairp),
    ("PROCEDURE?", prim_procp),
];

fn truth(b: bool) -> Value {
    if b {
        Value::Symbol(sym::T)
    } else {
        Value::Nil
    }
}

/// Exactly one argument.
fn one_arg(heap: &Heap, args: Value, name: &str) -> LispResult<Value> {
    match heap.list_to_vec(args).as_deref() {
        Some(&[a]) => Ok(a),
        _ => Err(LispError::Args(format!("{} takes 1 argument", name))),
    }
}

/// Exactly two arguments.
fn two_args(heap: &Heap, args: Value, name: &str) -> LispResult<(Value, Value)> {
    match heap.list_to_vec(args).as_deref() {
        Some(&[a, b]) => Ok((a, b)),
        _ => Err(LispError::Args(format!("{} takes 2 arguments", name))),
    }
}

/// Exactly two integer arguments.
fn two_ints(heap: &Heap, args: Value, name: &str) -> LispResult<(i64, i64)> {
    let (a, b) = two_args(heap, args, name)?;
    let int = |v: Value| {
        v.as_integer().ok_or_else(|| {
            LispError::Type(format!("{} expects integers, got {}", name, v.type_name()))
        })
    };
    Ok((int(a)?, int(b)?))
}

/// (car x): car of a pair, nil of nil.
fn prim_car(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let a = one_arg(heap, args, "CAR")?;
    heap.car_val(a)
}

/// (cdr x): cdr of a pair, nil of nil.
fn prim_cdr(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let a = one_arg(heap, args, "CDR")?;
    heap.cdr_val(a)
}

fn prim_cons(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let (a, b) = two_args(heap, args, "CONS")?;
    Ok(heap.cons(a, b))
}

fn prim_add(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let (a, b) = two_ints(heap, args, "+")?;
    Ok(Value::Integer(a.wrapping_add(b)))
}

fn prim_sub(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let (a, b) = two_ints(heap, args, "-")?;
    Ok(Value::Integer(a.wrapping_sub(b)))
}

fn prim_mul(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let (a, b) = two_ints(heap, args, "*")?;
    Ok(Value::Integer(a.wrapping_mul(b)))
}

/// Truncating division. A zero divisor is a Type error.
fn prim_div(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let (a, b) = two_ints(heap, args, "/")?;
    if b == 0 {
        return Err(LispError::Type("/ by zero".into()));
    }
    Ok(Value::Integer(a.wrapping_div(b)))
}

fn prim_num_eq(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let (a, b) = two_ints(heap, args, "=")?;
    Ok(truth(a == b))
}

fn prim_less(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let (a, b) = two_ints(heap, args, "<")?;
    Ok(truth(a < b))
}

/// (eq? a b): cell identity for compound values, id identity for symbols
/// and builtins, value equality for integers. `Value`'s derived equality is
/// exactly that.
fn prim_eq(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let (a, b) = two_args(heap, args, "EQ?")?;
    Ok(truth(a == b))
}

fn prim_pairp(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let a = one_arg(heap, args, "PAIR?")?;
    Ok(truth(a.is_pair()))
}

/// Builtins and closures are procedures; macros are not.
fn prim_procp(heap: &mut Heap, args: Value) -> LispResult<Value> {
    let a = one_arg(heap, args, "PROCEDURE?")?;
    Ok(truth(matches!(a, Value::Builtin(_) | Value::Closure(_))))
}
