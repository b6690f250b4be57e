//! An embeddable Lisp runtime: tagged values, a mark-sweep collected heap,
//! interned symbols, heap-allocated environments and a trampolined
//! evaluator with closures, macros and proper tail calls.

pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod globals;
pub mod heap;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod symbol;
pub mod value;

pub use config::Config;
pub use error::{ErrorKind, LispError, LispResult};
pub use eval::{Machine, Stats};
pub use value::Value;
