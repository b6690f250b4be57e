use crate::config::Config;
use crate::env;
use crate::error::{LispError, LispResult};
use crate::globals;
use crate::heap::{GcReport, Heap};
use crate::primitives::{BuiltinFn, BuiltinTable};
use crate::printer;
use crate::reader;
use crate::symbol::{sym, SymbolTable};
use crate::value::{BuiltinId, CellId, SymbolId, Value};

/// Special-form keywords. Recognised by the head symbol's id before any
/// environment lookup, so no binding can shadow them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyword {
    Quote,
    Define,
    Lambda,
    If,
    Defmacro,
    Set,
    Apply,
}

impl Keyword {
    fn from_symbol(id: SymbolId) -> Option<Self> {
        match id {
            sym::QUOTE => Some(Keyword::Quote),
            sym::DEFINE => Some(Keyword::Define),
            sym::LAMBDA => Some(Keyword::Lambda),
            sym::IF => Some(Keyword::If),
            sym::DEFMACRO => Some(Keyword::Defmacro),
            sym::SET => Some(Keyword::Set),
            sym::APPLY => Some(Keyword::Apply),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Keyword::Quote => "QUOTE",
            Keyword::Define => "DEFINE",
            Keyword::Lambda => "LAMBDA",
            Keyword::If => "IF",
            Keyword::Defmacro => "DEFMACRO",
            Keyword::Set => "SET!",
            Keyword::Apply => "APPLY",
        }
    }
}

/// What a frame is waiting for.
#[derive(Clone, Copy, Debug)]
enum Pending {
    /// The operator position of a call.
    Operator,
    /// Operator known; arguments are being evaluated, then it is applied.
    Call(Value),
    /// `(APPLY f list)`: both operands are being evaluated.
    Apply,
    /// A macro body is running in the frame above; its value is the expansion.
    Expand,
    /// `(IF test then else)`: the test.
    If,
    /// `(DEFINE name expr)`: the value to bind.
    Define(SymbolId),
    /// `(SET! name expr)`: the value to store.
    Set(SymbolId),
}

/// A continuation record on the explicit stack.
/// Every `Value` it holds is a collection root while the frame is live.
struct Frame {
    env: Value,
    pending: Pending,
    /// Argument expressions still to evaluate. For IF, the `(then else)` tail.
    unevaluated: Value,
    /// Evaluated arguments, most recent first.
    evaluated: Value,
    /// Body forms of the closure running in this frame that have not started.
    body: Value,
}

impl Frame {
    fn new(env: Value, pending: Pending, unevaluated: Value) -> Self {
        Frame {
            env,
            pending,
            unevaluated,
            evaluated: Value::Nil,
            body: Value::Nil,
        }
    }

    fn roots(&self) -> [Value; 5] {
        let op = match self.pending {
            Pending::Call(op) => op,
            _ => Value::Nil,
        };
        [self.env, op, self.unevaluated, self.evaluated, self.body]
    }
}

/// Trampoline state: the expression under evaluation, its environment and
/// the pending work. This is the evaluator's whole contribution to the root set.
struct Registers {
    expr: Value,
    env: Value,
    stack: Vec<Frame>,
}

impl Registers {
    fn roots(&self) -> impl Iterator<Item = Value> + '_ {
        [self.expr, self.env]
            .into_iter()
            .chain(self.stack.iter().flat_map(Frame::roots))
    }
}

/// Result of one trampoline step.
enum Step {
    /// `expr`/`env` were replaced; evaluate again.
    Eval,
    /// A value for the innermost frame (or the caller, if the stack is empty).
    Return(Value),
}

/// Counters exposed to hosts and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub collections: u64,
    pub steps: u64,
    /// Deepest explicit frame stack observed since the last reset.
    pub peak_frames: usize,
    pub last_gc: Option<GcReport>,
}

/// One runtime instance. All interpreter state lives here so GC can find
/// roots, and so independent machines never share symbols or cells.
pub struct Machine {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub builtins: BuiltinTable,

    /// The global environment. Always a collection root.
    pub global: Value,
    /// Host-held values that must survive collections between evaluations.
    pinned: Vec<Value>,

    config: Config,
    steps_since_gc: usize,
    stats: Stats,
}

impl Machine {
    /// A machine with an empty global environment.
    pub fn new(config: Config) -> Self {
        let mut heap = Heap::new();
        let global = env::create(&mut heap, Value::Nil);
        Machine {
            heap,
            symbols: SymbolTable::new(),
            builtins: BuiltinTable::new(),
            global,
            pinned: Vec::new(),
            config,
            steps_since_gc: 0,
            stats: Stats::default(),
        }
    }

    /// A machine whose global environment holds the primitive library and,
    /// when `config.prelude` is set, the Lisp prelude.
    pub fn with_primitives(config: Config) -> LispResult<Self> {
        let load_prelude = config.prelude;
        let mut machine = Machine::new(config);
        globals::install_primitives(&mut machine);
        if load_prelude {
            globals::load_prelude(&mut machine)?;
        }
        Ok(machine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
    }

    // ========================================================================
    // Host interface
    // ========================================================================

    /// The canonical symbol value for `name`.
    pub fn intern(&mut self, name: &str) -> Value {
        Value::Symbol(self.symbols.intern(name))
    }

    /// Register a native procedure and return its value.
    pub fn make_builtin(&mut self, name: &str, func: BuiltinFn) -> Value {
        self.builtins.register(name, func)
    }

    pub fn create_env(&mut self, parent: Value) -> Value {
        env::create(&mut self.heap, parent)
    }

    pub fn define(&mut self, env: Value, symbol: Value, value: Value) -> LispResult<()> {
        let name = self.expect_symbol(symbol)?;
        self.expect_env(env)?;
        env::define(&mut self.heap, env, name, value);
        Ok(())
    }

    pub fn get(&self, env: Value, symbol: Value) -> LispResult<Value> {
        let name = self.expect_symbol(symbol)?;
        self.expect_env(env)?;
        env::get(&self.heap, env, name).ok_or_else(|| self.unbound(name))
    }

    pub fn set(&mut self, env: Value, symbol: Value, value: Value) -> LispResult<()> {
        let name = self.expect_symbol(symbol)?;
        self.expect_env(env)?;
        if env::set(&mut self.heap, env, name, value) {
            Ok(())
        } else {
            Err(self.unbound(name))
        }
    }

    /// Keep `value` alive across collections until `unpin`.
    pub fn pin(&mut self, value: Value) {
        self.pinned.push(value);
    }

    /// Drop one pin of `value`.
    pub fn unpin(&mut self, value: Value) {
        if let Some(pos) = self.pinned.iter().rposition(|&v| v == value) {
            self.pinned.swap_remove(pos);
        }
    }

    /// Read and evaluate every form of `src` in the global environment, one
    /// form at a time. Returns the value of the last form.
    pub fn eval_str(&mut self, src: &str) -> LispResult<Value> {
        let mut pos = 0;
        let mut last = Value::Nil;
        while let Some((expr, next)) =
            reader::read_one_at(src, pos, &mut self.heap, &mut self.symbols)?
        {
            pos = next;
            last = self.eval(expr, self.global)?;
        }
        Ok(last)
    }

    /// Evaluate every form of `src` in the global environment, carrying on
    /// past evaluation errors. Each form yields its printed value or its
    /// error; a read error is the last entry.
    pub fn load_str(&mut self, src: &str) -> Vec<LispResult<String>> {
        let mut results = Vec::new();
        let mut pos = 0;
        loop {
            match reader::read_one_at(src, pos, &mut self.heap, &mut self.symbols) {
                Ok(Some((expr, next))) => {
                    pos = next;
                    let result = self.eval(expr, self.global).map(|v| self.print(v));
                    if let Err(e) = &result {
                        tracing::warn!(error = %e, "form failed while loading");
                    }
                    results.push(result);
                }
                Ok(None) => break,
                Err(e) => {
                    results.push(Err(e));
                    break;
                }
            }
        }
        results
    }

    /// Render a value in re-readable list syntax.
    pub fn print(&self, val: Value) -> String {
        printer::print_val(val, &self.heap, &self.symbols, &self.builtins)
    }

    fn expect_symbol(&self, val: Value) -> LispResult<SymbolId> {
        val.as_symbol()
            .ok_or_else(|| LispError::Type(format!("expected symbol, got {}", val.type_name())))
    }

    fn expect_env(&self, val: Value) -> LispResult<()> {
        if val.is_pair() {
            Ok(())
        } else {
            Err(LispError::Type(format!(
                "expected environment, got {}",
                val.type_name()
            )))
        }
    }

    fn unbound(&self, name: SymbolId) -> LispError {
        LispError::Unbound(self.symbols.name(name).to_string())
    }

    // ========================================================================
    // GC
    // ========================================================================

    /// Collect now. Roots are the global environment, pinned values and
    /// `extra`.
    pub fn collect(&mut self, extra: &[Value]) -> GcReport {
        self.collect_with(extra.iter().copied())
    }

    fn collect_with(&mut self, extra: impl IntoIterator<Item = Value>) -> GcReport {
        let roots = std::iter::once(self.global)
            .chain(self.pinned.iter().copied())
            .chain(extra);
        let report = self.heap.collect(roots);

        self.steps_since_gc = 0;
        self.stats.collections += 1;
        self.stats.last_gc = Some(report);
        tracing::debug!(
            marked = report.marked,
            freed = report.freed,
            live = report.live_after,
            "gc cycle"
        );
        report
    }

    /// Count one step; collect when the threshold is reached.
    fn tick(&mut self, regs: &Registers) {
        self.stats.steps += 1;
        self.steps_since_gc += 1;
        if self.steps_since_gc >= self.config.gc_threshold {
            self.collect_with(regs.roots());
        }
    }

    // ========================================================================
    // The trampoline
    // ========================================================================

    /// Evaluate `expr` in `env`.
    ///
    /// Runs as a loop over explicit state instead of native recursion: a
    /// step either rewrites `(expr, env, stack)` or yields a value that
    /// `resume` hands to the innermost frame. The first error aborts the
    /// whole evaluation and discards the frame stack; environments keep any
    /// definitions made before the error.
    pub fn eval(&mut self, expr: Value, env: Value) -> LispResult<Value> {
        self.expect_env(env)?;
        let mut regs = Registers {
            expr,
            env,
            stack: Vec::new(),
        };

        loop {
            self.tick(&regs);
            let mut step = self.step(&mut regs)?;
            while let Step::Return(value) = step {
                if regs.stack.is_empty() {
                    return Ok(value);
                }
                step = self.resume(value, &mut regs)?;
            }
        }
    }

    /// Dispatch on the current expression.
    fn step(&mut self, regs: &mut Registers) -> LispResult<Step> {
        let expr = regs.expr;
        let cell = match expr {
            Value::Symbol(id) => {
                return env::get(&self.heap, regs.env, id)
                    .map(Step::Return)
                    .ok_or_else(|| self.unbound(id));
            }
            Value::Pair(cell) => cell,
            literal => return Ok(Step::Return(literal)),
        };

        if !self.heap.is_proper_list(expr) {
            return Err(LispError::Syntax(format!(
                "improper list cannot be evaluated: {}",
                self.print(expr)
            )));
        }

        let op = self.heap.car(cell);
        let args = self.heap.cdr(cell);

        if let Some(keyword) = op.as_symbol().and_then(Keyword::from_symbol) {
            return self.special_form(keyword, args, regs);
        }

        // A builtin object in operator position is a call whose arguments
        // are already values.
        if let Value::Builtin(id) = op {
            return self.call_builtin(id, args).map(Step::Return);
        }

        self.push(regs, Pending::Operator, args);
        regs.expr = op;
        Ok(Step::Eval)
    }

    /// Push a frame that evaluates under the current environment.
    fn push(&mut self, regs: &mut Registers, pending: Pending, unevaluated: Value) {
        regs.stack.push(Frame::new(regs.env, pending, unevaluated));
        self.stats.peak_frames = self.stats.peak_frames.max(regs.stack.len());
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    fn special_form(
        &mut self,
        keyword: Keyword,
        args: Value,
        regs: &mut Registers,
    ) -> LispResult<Step> {
        tracing::trace!(form = keyword.name(), "special form");
        let argc = self.heap.list_len(args).unwrap_or(0);
        let first = self.heap.car_val(args)?;
        let rest = self.heap.cdr_val(args)?;

        match keyword {
            Keyword::Quote => {
                check_arity(keyword, argc == 1, "exactly 1 operand")?;
                Ok(Step::Return(first))
            }

            Keyword::If => {
                check_arity(keyword, argc == 3, "test, then and else")?;
                self.push(regs, Pending::If, rest);
                regs.expr = first;
                Ok(Step::Eval)
            }

            Keyword::Define => {
                check_arity(keyword, argc >= 2, "a target and a value")?;
                match first {
                    Value::Symbol(name) => {
                        check_arity(keyword, argc == 2, "a name and exactly 1 value")?;
                        self.push(regs, Pending::Define(name), Value::Nil);
                        regs.expr = self.heap.car_val(rest)?;
                        Ok(Step::Eval)
                    }
                    // (DEFINE (name . params) body...)
                    Value::Pair(target) => {
                        let name = self.expect_symbol(self.heap.car(target))?;
                        let params = self.heap.cdr(target);
                        let closure = self.make_closure(regs.env, params, rest)?;
                        env::define(&mut self.heap, regs.env, name, Value::Closure(closure));
                        Ok(Step::Return(Value::Symbol(name)))
                    }
                    other => Err(LispError::Syntax(format!(
                        "DEFINE target must be a symbol or list, got {}",
                        other.type_name()
                    ))),
                }
            }

            Keyword::Lambda => {
                check_arity(keyword, argc >= 2, "parameters and a body")?;
                let closure = self.make_closure(regs.env, first, rest)?;
                Ok(Step::Return(Value::Closure(closure)))
            }

            // (DEFMACRO (name . params) body...) or (DEFMACRO name params body...)
            Keyword::Defmacro => {
                check_arity(keyword, argc >= 2, "a signature and a body")?;
                let (name, params, body) = match first {
                    Value::Pair(target) => (
                        self.expect_symbol(self.heap.car(target))?,
                        self.heap.cdr(target),
                        rest,
                    ),
                    Value::Symbol(name) => {
                        check_arity(keyword, argc >= 3, "a name, parameters and a body")?;
                        (name, self.heap.car_val(rest)?, self.heap.cdr_val(rest)?)
                    }
                    other => {
                        return Err(LispError::Syntax(format!(
                            "DEFMACRO needs a name or (name . params) signature, got {}",
                            other.type_name()
                        )))
                    }
                };
                let cell = self.make_closure(regs.env, params, body)?;
                env::define(&mut self.heap, regs.env, name, Value::Macro(cell));
                Ok(Step::Return(Value::Symbol(name)))
            }

            Keyword::Set => {
                check_arity(keyword, argc == 2, "a name and exactly 1 value")?;
                let name = self.expect_symbol(first)?;
                self.push(regs, Pending::Set(name), Value::Nil);
                regs.expr = self.heap.car_val(rest)?;
                Ok(Step::Eval)
            }

            Keyword::Apply => {
                check_arity(keyword, argc == 2, "a procedure and an argument list")?;
                self.push(regs, Pending::Apply, rest);
                regs.expr = first;
                Ok(Step::Eval)
            }
        }
    }

    /// Build a closure cell: car = captured env, cdr = (params . body).
    fn make_closure(&mut self, env: Value, params: Value, body: Value) -> LispResult<CellId> {
        if !self.heap.is_proper_list(body) {
            return Err(LispError::Syntax("procedure body must be a list".into()));
        }

        // A proper list of symbols, optionally ending in a rest symbol.
        let mut current = params;
        loop {
            match current {
                Value::Nil | Value::Symbol(_) => break,
                Value::Pair(id) if self.heap.car(id).is_symbol() => current = self.heap.cdr(id),
                _ => {
                    return Err(LispError::Type(format!(
                        "malformed parameter list: {}",
                        self.print(params)
                    )))
                }
            }
        }

        let spec = self.heap.cons(params, body);
        Ok(self.heap.alloc(env, spec))
    }

    // ========================================================================
    // Frame completion
    // ========================================================================

    /// Hand `value` to the innermost frame and decide what runs next.
    fn resume(&mut self, value: Value, regs: &mut Registers) -> LispResult<Step> {
        let Some(frame) = regs.stack.last_mut() else {
            return Ok(Step::Return(value));
        };
        regs.env = frame.env;

        if !frame.body.is_nil() {
            // A non-final body form finished; its value is discarded.
            return Ok(self.next_body_form(regs));
        }

        match frame.pending {
            Pending::Operator => {
                if let Value::Macro(cell) = value {
                    // Bind the unevaluated operands and run the macro body in
                    // a frame of its own; this one waits for the expansion.
                    frame.pending = Pending::Expand;
                    let operands = std::mem::replace(&mut frame.unevaluated, Value::Nil);
                    self.push(regs, Pending::Call(value), Value::Nil);
                    return self.bind(cell, operands, regs);
                }
                frame.pending = Pending::Call(value);
            }

            Pending::Expand => {
                // The expansion runs under the environment of the macro call.
                regs.stack.pop();
                regs.expr = value;
                return Ok(Step::Eval);
            }

            Pending::If => {
                let branches = frame.unevaluated;
                regs.stack.pop();
                let branch = if value.is_nil() {
                    self.heap.cdr_val(branches)?
                } else {
                    branches
                };
                regs.expr = self.heap.car_val(branch)?;
                return Ok(Step::Eval);
            }

            Pending::Define(name) => {
                env::define(&mut self.heap, frame.env, name, value);
                regs.stack.pop();
                return Ok(Step::Return(Value::Symbol(name)));
            }

            Pending::Set(name) => {
                let env = frame.env;
                regs.stack.pop();
                if !env::set(&mut self.heap, env, name, value) {
                    return Err(self.unbound(name));
                }
                return Ok(Step::Return(Value::Symbol(name)));
            }

            Pending::Call(_) | Pending::Apply => {
                frame.evaluated = self.heap.cons(value, frame.evaluated);
            }
        }

        if let Value::Pair(next) = frame.unevaluated {
            regs.expr = self.heap.car(next);
            frame.unevaluated = self.heap.cdr(next);
            return Ok(Step::Eval);
        }

        self.finish_arguments(regs)
    }

    /// All operands of the innermost frame are evaluated: apply.
    fn finish_arguments(&mut self, regs: &mut Registers) -> LispResult<Step> {
        let Some(frame) = regs.stack.last_mut() else {
            return Ok(Step::Return(Value::Nil));
        };
        let evaluated = std::mem::replace(&mut frame.evaluated, Value::Nil);
        let args = self.heap.reverse(evaluated);

        match frame.pending {
            Pending::Call(op) => self.apply(op, args, regs),
            Pending::Apply => {
                let op = self.heap.car_val(args)?;
                let list = self.heap.car_val(self.heap.cdr_val(args)?)?;
                if !self.heap.is_proper_list(list) {
                    return Err(LispError::Syntax(
                        "APPLY needs a proper argument list".into(),
                    ));
                }
                frame.pending = Pending::Call(op);
                self.apply(op, list, regs)
            }
            other => Err(LispError::Syntax(format!(
                "frame waiting on {:?} has no operator",
                other
            ))),
        }
    }

    /// Apply a procedure to evaluated arguments in the innermost frame.
    fn apply(&mut self, op: Value, args: Value, regs: &mut Registers) -> LispResult<Step> {
        match op {
            Value::Builtin(id) => {
                regs.stack.pop();
                self.call_builtin(id, args).map(Step::Return)
            }
            Value::Closure(cell) => self.bind(cell, args, regs),
            other => Err(LispError::Type(format!(
                "{} is not a procedure",
                self.print(other)
            ))),
        }
    }

    fn call_builtin(&mut self, id: BuiltinId, args: Value) -> LispResult<Value> {
        let func = self
            .builtins
            .get(id)
            .map(|p| p.func)
            .ok_or_else(|| LispError::Type(format!("unknown builtin {}", id.0)))?;
        func(&mut self.heap, args)
    }

    /// Bind `args` to the closure's parameters in a fresh child of its
    /// captured environment, install that environment in the innermost
    /// frame and start the body.
    fn bind(&mut self, closure: CellId, args: Value, regs: &mut Registers) -> LispResult<Step> {
        let captured = self.heap.car(closure);
        let spec = self.heap.cdr(closure);
        let params = self.heap.car_val(spec)?;
        let body = self.heap.cdr_val(spec)?;

        let env = env::create(&mut self.heap, captured);
        let mut names = params;
        let mut rest = args;
        loop {
            match names {
                Value::Nil => break,
                // Rest parameter takes whatever is left.
                Value::Symbol(name) => {
                    env::define(&mut self.heap, env, name, rest);
                    rest = Value::Nil;
                    break;
                }
                Value::Pair(id) => {
                    let Value::Pair(arg) = rest else {
                        return Err(LispError::Args(format!(
                            "too few arguments for {}",
                            self.print(params)
                        )));
                    };
                    let name = self.expect_symbol(self.heap.car(id))?;
                    let value = self.heap.car(arg);
                    env::define(&mut self.heap, env, name, value);
                    names = self.heap.cdr(id);
                    rest = self.heap.cdr(arg);
                }
                other => {
                    return Err(LispError::Type(format!(
                        "malformed parameter list ending in {}",
                        other.type_name()
                    )))
                }
            }
        }
        if !rest.is_nil() {
            return Err(LispError::Args(format!(
                "too many arguments for {}",
                self.print(params)
            )));
        }

        tracing::trace!(closure = closure.0, depth = regs.stack.len(), "apply closure");
        if let Some(frame) = regs.stack.last_mut() {
            frame.env = env;
            frame.body = body;
            frame.evaluated = Value::Nil;
        }
        Ok(self.next_body_form(regs))
    }

    /// Start the next body form of the innermost frame. The frame is popped
    /// as its final form starts, so a tail call never grows the stack.
    fn next_body_form(&mut self, regs: &mut Registers) -> Step {
        let Some(frame) = regs.stack.last_mut() else {
            return Step::Return(Value::Nil);
        };
        let Value::Pair(cell) = frame.body else {
            regs.stack.pop();
            return Step::Return(Value::Nil);
        };

        regs.env = frame.env;
        regs.expr = self.heap.car(cell);
        let remaining = self.heap.cdr(cell);
        if remaining.is_nil() {
            regs.stack.pop();
        } else {
            frame.body = remaining;
        }
        Step::Eval
    }
}

fn check_arity(keyword: Keyword, ok: bool, expected: &str) -> LispResult<()> {
    if ok {
        Ok(())
    } else {
        Err(LispError::Args(format!("{} takes {}", keyword.name(), expected)))
    }
}
