use crate::error::{LispError, LispResult};
use crate::value::{CellId, SymbolId, Value};

/// A single cell: two value slots.
#[derive(Clone, Copy)]
pub struct Cell {
    pub car: Value,
    pub cdr: Value,
}

/// What a read of a swept cell yields: a symbol id no table ever hands out,
/// so a rooting bug shows up as `#<UNKNOWN-SYMBOL>` instead of plausible data.
pub const FREED: Value = Value::Symbol(SymbolId(u32::MAX));

/// Arena slot. Freed slots are threaded into an intrusive free list.
enum Slot {
    Live(Cell),
    Free { next: Option<CellId> },
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub marked: usize,
    pub freed: usize,
    pub live_before: usize,
    pub live_after: usize,
}

/// The cell heap. Every pair, closure and macro lives here.
/// `CellId` is an index into `slots`; cells never move, so handles stay
/// valid across collections for as long as the cell is reachable.
pub struct Heap {
    slots: Vec<Slot>,
    /// Parallel to `slots`; only meaningful during a collection.
    marks: Vec<bool>,
    free_head: Option<CellId>,
    free_count: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: Vec::with_capacity(1024),
            marks: Vec::with_capacity(1024),
            free_head: None,
            free_count: 0,
        }
    }

    /// Allocate a new cell. Freed slots are reused before the arena grows.
    pub fn alloc(&mut self, car: Value, cdr: Value) -> CellId {
        if let Some(id) = self.free_head {
            let slot = &mut self.slots[id.0 as usize];
            if let Slot::Free { next } = *slot {
                self.free_head = next;
                self.free_count -= 1;
                *slot = Slot::Live(Cell { car, cdr });
                return id;
            }
            debug_assert!(false, "free list points at a live cell");
        }

        let id = CellId(self.slots.len() as u32);
        self.slots.push(Slot::Live(Cell { car, cdr }));
        self.marks.push(false);
        id
    }

    /// Allocate a pair and return it as a value.
    pub fn cons(&mut self, car: Value, cdr: Value) -> Value {
        Value::Pair(self.alloc(car, cdr))
    }

    #[inline]
    fn cell(&self, id: CellId) -> Cell {
        match self.slots[id.0 as usize] {
            Slot::Live(cell) => cell,
            Slot::Free { .. } => {
                tracing::error!(cell = id.0, "read of freed cell");
                Cell {
                    car: FREED,
                    cdr: FREED,
                }
            }
        }
    }

    #[inline]
    fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        match &mut self.slots[id.0 as usize] {
            Slot::Live(cell) => Some(cell),
            Slot::Free { .. } => None,
        }
    }

    #[inline]
    pub fn car(&self, id: CellId) -> Value {
        self.cell(id).car
    }

    #[inline]
    pub fn cdr(&self, id: CellId) -> Value {
        self.cell(id).cdr
    }

    #[inline]
    pub fn set_car(&mut self, id: CellId, val: Value) {
        if let Some(cell) = self.cell_mut(id) {
            cell.car = val;
        }
    }

    #[inline]
    pub fn set_cdr(&mut self, id: CellId, val: Value) {
        if let Some(cell) = self.cell_mut(id) {
            cell.cdr = val;
        }
    }

    /// Car of a pair, or nil of nil.
    pub fn car_val(&self, val: Value) -> LispResult<Value> {
        match val {
            Value::Nil => Ok(Value::Nil),
            Value::Pair(id) => Ok(self.car(id)),
            other => Err(LispError::Type(format!("car of {}", other.type_name()))),
        }
    }

    /// Cdr of a pair, or nil of nil.
    pub fn cdr_val(&self, val: Value) -> LispResult<Value> {
        match val {
            Value::Nil => Ok(Value::Nil),
            Value::Pair(id) => Ok(self.cdr(id)),
            other => Err(LispError::Type(format!("cdr of {}", other.type_name()))),
        }
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[Value]) -> Value {
        let mut result = Value::Nil;
        for &val in values.iter().rev() {
            result = self.cons(val, result);
        }
        result
    }

    /// True for nil and for nil-terminated pair chains.
    pub fn is_proper_list(&self, val: Value) -> bool {
        let mut current = val;
        loop {
            match current {
                Value::Nil => return true,
                Value::Pair(id) => current = self.cdr(id),
                _ => return false,
            }
        }
    }

    /// Length of a proper list, or None.
    pub fn list_len(&self, val: Value) -> Option<usize> {
        let mut len = 0;
        let mut current = val;
        loop {
            match current {
                Value::Nil => return Some(len),
                Value::Pair(id) => {
                    len += 1;
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    /// Collect a proper list into a Vec. Returns None if not a proper list.
    pub fn list_to_vec(&self, val: Value) -> Option<Vec<Value>> {
        let mut result = Vec::new();
        let mut current = val;
        loop {
            match current {
                Value::Nil => return Some(result),
                Value::Pair(id) => {
                    result.push(self.car(id));
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    /// Reverse a proper list in place, relinking its own cells.
    pub fn reverse(&mut self, list: Value) -> Value {
        let mut tail = Value::Nil;
        let mut current = list;
        while let Value::Pair(id) = current {
            let next = self.cdr(id);
            self.set_cdr(id, tail);
            tail = current;
            current = next;
        }
        tail
    }

    /// Number of slots ever allocated (live and free).
    pub fn total_cells(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free_count
    }

    /// True while the cell has not been reclaimed.
    pub fn is_live(&self, id: CellId) -> bool {
        matches!(self.slots.get(id.0 as usize), Some(Slot::Live(_)))
    }

    // === GC methods ===

    /// Mark a value as reachable. If it owns an unmarked cell, mark it and
    /// queue it so its car and cdr get visited.
    fn mark_value(&mut self, val: Value, worklist: &mut Vec<CellId>) {
        if let Some(id) = val.cell() {
            let idx = id.0 as usize;
            if !self.marks[idx] {
                self.marks[idx] = true;
                worklist.push(id);
            }
        }
    }

    /// Drain the worklist. Iterative so long or deep structures cannot
    /// exhaust the native stack.
    fn process_worklist(&mut self, worklist: &mut Vec<CellId>) {
        while let Some(id) = worklist.pop() {
            let cell = self.cell(id);
            self.mark_value(cell.car, worklist);
            self.mark_value(cell.cdr, worklist);
        }
    }

    /// Return every unmarked live cell to the free list and clear all marks.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for idx in 0..self.slots.len() {
            if self.marks[idx] {
                self.marks[idx] = false;
                continue;
            }
            if let Slot::Live(_) = self.slots[idx] {
                self.slots[idx] = Slot::Free {
                    next: self.free_head,
                };
                self.free_head = Some(CellId(idx as u32));
                freed += 1;
            }
        }
        self.free_count += freed;
        freed
    }

    /// Stop-the-world mark-sweep. Everything reachable from `roots` survives;
    /// everything else is reclaimed.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = Value>) -> GcReport {
        let live_before = self.live_count();
        let mut worklist = Vec::new();
        for root in roots {
            self.mark_value(root, &mut worklist);
            self.process_worklist(&mut worklist);
        }
        let marked = self.marks.iter().filter(|&&m| m).count();
        let freed = self.sweep();
        GcReport {
            marked,
            freed,
            live_before,
            live_after: self.live_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_a_swept_cell_yields_the_freed_marker() {
        let mut heap = Heap::new();
        let garbage = heap.alloc(Value::Integer(1), Value::Nil);
        heap.collect(std::iter::empty::<Value>());
        assert!(!heap.is_live(garbage));
        assert_eq!(heap.car(garbage), FREED);
        assert_eq!(heap.cdr(garbage), FREED);
    }

    #[test]
    fn each_cons_is_a_distinct_cell() {
        let mut heap = Heap::new();
        let a = heap.cons(Value::Integer(1), Value::Integer(2));
        let b = heap.cons(Value::Integer(1), Value::Integer(2));
        assert_ne!(a, b);
    }

    #[test]
    fn unreachable_cells_are_reclaimed() {
        let mut heap = Heap::new();
        let kept = heap.list(&[Value::Integer(1), Value::Integer(2)]);
        let _garbage = heap.list(&[Value::Integer(3), Value::Integer(4), Value::Integer(5)]);

        let report = heap.collect([kept]);
        assert_eq!(report.marked, 2);
        assert_eq!(report.freed, 3);
        assert_eq!(heap.live_count(), 2);
        assert_eq!(heap.list_to_vec(kept), Some(vec![Value::Integer(1), Value::Integer(2)]));
    }

    #[test]
    fn cycles_terminate_and_survive() {
        let mut heap = Heap::new();
        let a = heap.alloc(Value::Integer(1), Value::Nil);
        let b = heap.alloc(Value::Integer(2), Value::Pair(a));
        heap.set_cdr(a, Value::Pair(b));

        let report = heap.collect([Value::Pair(a)]);
        assert_eq!(report.freed, 0);
        assert!(heap.is_live(a) && heap.is_live(b));
    }

    #[test]
    fn closure_cells_are_traced() {
        let mut heap = Heap::new();
        let env = heap.cons(Value::Nil, Value::Nil);
        let params_body = heap.cons(Value::Nil, Value::Nil);
        let clo = heap.alloc(env, params_body);

        heap.collect([Value::Closure(clo)]);
        assert!(heap.is_live(clo));
        assert!(heap.is_live(env.as_pair().unwrap()));
        assert!(heap.is_live(params_body.as_pair().unwrap()));
    }

    #[test]
    fn second_collection_is_a_no_op() {
        let mut heap = Heap::new();
        let kept = heap.list(&[Value::Integer(1)]);
        heap.cons(Value::Nil, Value::Nil);

        let first = heap.collect([kept]);
        let second = heap.collect([kept]);
        assert_eq!(first.freed, 1);
        assert_eq!(second.freed, 0);
        assert_eq!(second.live_before, second.live_after);
        assert_eq!(heap.free_count(), 1);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::new();
        heap.cons(Value::Nil, Value::Nil);
        heap.collect([]);
        let total = heap.total_cells();
        let id = heap.alloc(Value::Integer(7), Value::Nil);
        assert_eq!(heap.total_cells(), total);
        assert_eq!(heap.car(id), Value::Integer(7));
        assert_eq!(heap.free_count(), 0);
    }

    #[test]
    fn marking_a_long_list_does_not_recurse() {
        let mut heap = Heap::new();
        let mut list = Value::Nil;
        for i in 0..200_000 {
            list = heap.cons(Value::Integer(i), list);
        }
        let mut deep = Value::Nil;
        for _ in 0..200_000 {
            deep = heap.cons(deep, Value::Nil);
        }
        let report = heap.collect([list, deep]);
        assert_eq!(report.freed, 0);
        assert_eq!(report.marked, 400_000);
    }

    #[test]
    fn reverse_relinks_in_place() {
        let mut heap = Heap::new();
        let list = heap.list(&[Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        let total = heap.total_cells();
        let rev = heap.reverse(list);
        assert_eq!(heap.total_cells(), total);
        assert_eq!(
            heap.list_to_vec(rev),
            Some(vec![Value::Integer(3), Value::Integer(2), Value::Integer(1)])
        );
    }

    #[test]
    fn car_of_atom_is_type_error() {
        let heap = Heap::new();
        assert_eq!(heap.car_val(Value::Nil), Ok(Value::Nil));
        assert!(matches!(heap.car_val(Value::Integer(5)), Err(LispError::Type(_))));
    }
}
