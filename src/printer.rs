use std::fmt::Write;

use crate::heap::Heap;
use crate::primitives::BuiltinTable;
use crate::symbol::SymbolTable;
use crate::value::Value;

/// Nesting (through car positions) beyond which output is elided.
const MAX_DEPTH: usize = 1000;

/// Print a value in list syntax. Data without procedures prints in a form
/// the reader reads back to an equal structure.
pub fn print_val(val: Value, heap: &Heap, symbols: &SymbolTable, builtins: &BuiltinTable) -> String {
    let printer = Printer {
        heap,
        symbols,
        builtins,
    };
    let mut out = String::new();
    printer.print(val, &mut out, 0);
    out
}

struct Printer<'a> {
    heap: &'a Heap,
    symbols: &'a SymbolTable,
    builtins: &'a BuiltinTable,
}

impl Printer<'_> {
    fn print(&self, val: Value, out: &mut String, depth: usize) {
        if depth > MAX_DEPTH {
            out.push_str("...");
            return;
        }

        match val {
            Value::Nil => out.push_str("NIL"),
            Value::Integer(n) => {
                let _ = write!(out, "{}", n);
            }
            Value::Symbol(id) => out.push_str(self.symbols.name(id)),
            Value::Builtin(id) => {
                let _ = write!(out, "#<BUILTIN:{}>", self.builtins.name(id));
            }
            Value::Closure(id) => {
                let _ = write!(out, "#<CLOSURE:{}>", id.0);
            }
            Value::Macro(id) => {
                let _ = write!(out, "#<MACRO:{}>", id.0);
            }
            Value::Pair(_) => self.print_list(val, out, depth),
        }
    }

    /// Cdr chains are walked in a loop so long lists print in constant stack.
    fn print_list(&self, list: Value, out: &mut String, depth: usize) {
        out.push('(');
        let mut current = list;
        let mut first = true;
        loop {
            match current {
                Value::Pair(id) => {
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    self.print(self.heap.car(id), out, depth + 1);
                    current = self.heap.cdr(id);
                }
                Value::Nil => break,
                tail => {
                    out.push_str(" . ");
                    self.print(tail, out, depth + 1);
                    break;
                }
            }
        }
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_str;
    use pretty_assertions::assert_eq;

    fn roundtrip(src: &str) -> String {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let builtins = BuiltinTable::new();
        let val = read_str(src, &mut heap, &mut symbols).unwrap();
        print_val(val, &heap, &symbols, &builtins)
    }

    #[test]
    fn atoms() {
        assert_eq!(roundtrip("nil"), "NIL");
        assert_eq!(roundtrip("-12"), "-12");
        assert_eq!(roundtrip("set!"), "SET!");
    }

    #[test]
    fn lists_and_dotted_tails() {
        assert_eq!(roundtrip("(a (b c) . d)"), "(A (B C) . D)");
        assert_eq!(roundtrip("(1 . (2 . (3 . nil)))"), "(1 2 3)");
        assert_eq!(roundtrip("(())"), "(NIL)");
    }

    #[test]
    fn quote_prints_without_sugar() {
        assert_eq!(roundtrip("'x"), "(QUOTE X)");
        assert_eq!(roundtrip("`(a ,b ,@c)"), "(QUASIQUOTE (A (UNQUOTE B) (UNQUOTE-SPLICING C)))");
    }

    #[test]
    fn opaque_values() {
        let mut heap = Heap::new();
        let symbols = SymbolTable::new();
        let mut builtins = BuiltinTable::new();
        let car = builtins.register("CAR", |heap, args| heap.car_val(args));
        let cell = heap.alloc(Value::Nil, Value::Nil);
        assert_eq!(print_val(car, &heap, &symbols, &builtins), "#<BUILTIN:CAR>");
        assert_eq!(
            print_val(Value::Closure(cell), &heap, &symbols, &builtins),
            format!("#<CLOSURE:{}>", cell.0)
        );
        assert_eq!(
            print_val(Value::Macro(cell), &heap, &symbols, &builtins),
            format!("#<MACRO:{}>", cell.0)
        );
    }

    #[test]
    fn long_list_prints_iteratively() {
        let mut heap = Heap::new();
        let symbols = SymbolTable::new();
        let builtins = BuiltinTable::new();
        let items: Vec<Value> = (0..100_000).map(Value::Integer).collect();
        let list = heap.list(&items);
        let out = print_val(list, &heap, &symbols, &builtins);
        assert!(out.starts_with("(0 1 2"));
        assert!(out.ends_with("99999)"));
    }
}
