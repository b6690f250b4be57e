mod common;

use common::{bare_machine, eval, machine, stressed_machine};
use lisp::reader::read_str;
use pretty_assertions::assert_eq;

#[test]
fn prelude_loads_with_a_collection_every_step() {
    let mut m = stressed_machine();
    let stats = m.stats();
    assert!(stats.collections > 0);
    assert_eq!(stats.collections, stats.steps);
    assert_eq!(eval(&mut m, "(map + '(1 2 3) '(10 20 30))"), "(11 22 33)");
}

#[test]
fn evaluation_is_correct_under_constant_collection() {
    let mut m = stressed_machine();
    eval(
        &mut m,
        "(define (range n acc) (if (= n 0) acc (range (- n 1) (cons n acc))))
         (define (square x) (* x x))",
    );
    assert_eq!(
        eval(&mut m, "(foldl + 0 (unary-map square (range 20 nil)))"),
        "2870"
    );
    assert_eq!(
        eval(&mut m, "(let ((xs (range 3 nil))) `(start ,@xs end))"),
        "(START 1 2 3 END)"
    );
}

#[test]
fn closure_environments_stay_reachable() {
    let mut m = stressed_machine();
    eval(&mut m, "(define keep ((lambda (data) (lambda () data)) '(1 2 3)))");
    m.collect(&[]);
    assert_eq!(eval(&mut m, "(keep)"), "(1 2 3)");
}

#[test]
fn garbage_is_reclaimed() {
    let mut m = bare_machine();
    m.collect(&[]);
    let baseline = m.heap.live_count();

    eval(&mut m, "(cons 1 (cons 2 (cons 3 nil)))");
    assert!(m.heap.live_count() > baseline);

    let report = m.collect(&[]);
    assert!(report.freed > 0);
    assert_eq!(m.heap.live_count(), baseline);
}

#[test]
fn second_collection_is_a_no_op() {
    let mut m = machine();
    eval(&mut m, "(reverse '(1 2 3 4 5))");
    m.collect(&[]);
    let live = m.heap.live_count();
    let report = m.collect(&[]);
    assert_eq!(report.freed, 0);
    assert_eq!(report.live_after, live);
}

#[test]
fn extra_roots_survive_one_collection() {
    let mut m = bare_machine();
    let list = read_str("(a b c)", &mut m.heap, &mut m.symbols).unwrap();
    let cell = list.as_pair().unwrap();

    m.collect(&[list]);
    assert!(m.heap.is_live(cell));
    assert_eq!(m.print(list), "(A B C)");

    m.collect(&[]);
    assert!(!m.heap.is_live(cell));
}

#[test]
fn pinned_values_survive_until_unpinned() {
    let mut m = bare_machine();
    let list = read_str("(1 (2) 3)", &mut m.heap, &mut m.symbols).unwrap();
    let cell = list.as_pair().unwrap();
    m.pin(list);

    eval(&mut m, "(cons 1 2)");
    m.collect(&[]);
    m.collect(&[]);
    assert!(m.heap.is_live(cell));
    assert_eq!(m.print(list), "(1 (2) 3)");

    m.unpin(list);
    m.collect(&[]);
    assert!(!m.heap.is_live(cell));
}

#[test]
fn pinned_environment_keeps_its_bindings() {
    let mut m = stressed_machine();
    let global = m.global;
    let env = m.create_env(global);
    m.pin(env);

    let name = m.intern("LOCAL");
    let value = read_str("(x y)", &mut m.heap, &mut m.symbols).unwrap();
    m.define(env, name, value).unwrap();
    m.collect(&[]);

    let expr = read_str("(cons 0 local)", &mut m.heap, &mut m.symbols).unwrap();
    let result = m.eval(expr, env).unwrap();
    assert_eq!(m.print(result), "(0 X Y)");
}

#[test]
fn freed_slots_are_reused() {
    let mut m = bare_machine();
    eval(&mut m, "(cons 1 (cons 2 (cons 3 nil)))");
    m.collect(&[]);
    let total = m.heap.total_cells();
    eval(&mut m, "(cons 4 5)");
    assert_eq!(m.heap.total_cells(), total);
}

#[test]
fn threshold_controls_collection_frequency() {
    let mut m = bare_machine();
    m.reset_stats();
    eval(&mut m, "(+ 1 2)");
    assert_eq!(m.stats().collections, 0);

    let mut busy = stressed_machine();
    assert_eq!(busy.config().gc_threshold, 1);
    busy.reset_stats();
    eval(&mut busy, "(+ 1 2)");
    assert_eq!(busy.stats().collections, busy.stats().steps);
    assert!(busy.stats().last_gc.is_some());
}
