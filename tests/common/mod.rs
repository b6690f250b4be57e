#![allow(dead_code)]

use lisp::{Config, ErrorKind, Machine};

pub fn machine() -> Machine {
    Machine::with_primitives(Config::default()).unwrap()
}

pub fn bare_machine() -> Machine {
    Machine::with_primitives(Config {
        prelude: false,
        ..Config::default()
    })
    .unwrap()
}

/// A machine that collects on every evaluation step.
pub fn stressed_machine() -> Machine {
    Machine::with_primitives(Config {
        gc_threshold: 1,
        ..Config::default()
    })
    .unwrap()
}

/// Evaluate `src` in the global environment and print the last value.
pub fn eval(m: &mut Machine, src: &str) -> String {
    match m.eval_str(src) {
        Ok(v) => m.print(v),
        Err(e) => panic!("{} failed: {}", src, e),
    }
}

pub fn eval_err(m: &mut Machine, src: &str) -> ErrorKind {
    match m.eval_str(src) {
        Ok(v) => panic!("{} evaluated to {}, expected an error", src, m.print(v)),
        Err(e) => e.kind(),
    }
}
