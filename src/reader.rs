use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::symbol::{sym, SymbolTable};
use crate::value::{SymbolId, Value};

/// Source reader: parses program text into heap data.
///
/// Tokens are case-folded to upper case as they are read, so `car` and
/// `CAR` name the same symbol. A token that is a signed decimal number
/// becomes an integer; `NIL` becomes nil; anything else is interned.
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
    /// Set when the last whitespace skip ran into EOF inside a comment.
    open_comment: bool,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str, heap: &'a mut Heap, symbols: &'a mut SymbolTable) -> Self {
        Reader {
            input: input.as_bytes(),
            pos: 0,
            heap,
            symbols,
            open_comment: false,
        }
    }

    /// Read one datum. Returns None when only whitespace and comments remain.
    pub fn read(&mut self) -> LispResult<Option<Value>> {
        self.skip_atmosphere();
        if self.peek().is_none() {
            return Ok(None);
        }
        self.read_expr().map(Some)
    }

    /// Byte offset just past the last datum read.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read every datum in the input.
    pub fn read_all(&mut self) -> LispResult<Vec<Value>> {
        let mut results = Vec::new();
        while let Some(val) = self.read()? {
            results.push(val);
        }
        Ok(results)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_atmosphere(&mut self) {
        self.open_comment = false;
        while let Some(ch) = self.peek() {
            match ch {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b';' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                    self.open_comment = self.peek().is_none();
                }
                _ => break,
            }
        }
    }

    /// The error for running out of input where a datum is still required.
    fn eof_error(&self, context: &str) -> LispError {
        if self.open_comment {
            LispError::Syntax("unterminated comment".into())
        } else {
            LispError::Syntax(format!("unexpected end of input {}", context))
        }
    }

    fn read_expr(&mut self) -> LispResult<Value> {
        self.skip_atmosphere();
        let ch = self.peek().ok_or_else(|| self.eof_error("in datum"))?;

        match ch {
            b'(' => {
                self.pos += 1;
                self.read_list()
            }
            b')' => Err(LispError::Syntax("unexpected ')'".into())),
            b'\'' => self.read_prefixed(1, sym::QUOTE),
            b'`' => self.read_prefixed(1, sym::QUASIQUOTE),
            b',' if self.input.get(self.pos + 1) == Some(&b'@') => {
                self.read_prefixed(2, sym::UNQUOTE_SPLICING)
            }
            b',' => self.read_prefixed(1, sym::UNQUOTE),
            _ => {
                let token = self.read_token();
                self.atom(&token)
            }
        }
    }

    /// `'x` and friends: `(KEYWORD x)`.
    fn read_prefixed(&mut self, width: usize, keyword: SymbolId) -> LispResult<Value> {
        self.pos += width;
        let expr = self.read_expr()?;
        Ok(self.heap.list(&[Value::Symbol(keyword), expr]))
    }

    /// After `(`: elements up to `)`, with an optional `. tail`.
    fn read_list(&mut self) -> LispResult<Value> {
        let mut elements = Vec::new();
        let mut tail = Value::Nil;

        loop {
            self.skip_atmosphere();
            match self.peek() {
                None => return Err(self.eof_error("in list")),
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(b'.') if self.is_lone_dot() => {
                    if elements.is_empty() {
                        return Err(LispError::Syntax("dot with no preceding element".into()));
                    }
                    self.pos += 1;
                    tail = self.read_expr()?;
                    self.skip_atmosphere();
                    match self.peek() {
                        Some(b')') => self.pos += 1,
                        None => return Err(self.eof_error("after dotted tail")),
                        Some(_) => {
                            return Err(LispError::Syntax(
                                "expected ')' after dotted tail".into(),
                            ))
                        }
                    }
                    break;
                }
                Some(_) => elements.push(self.read_expr()?),
            }
        }

        let mut result = tail;
        for val in elements.into_iter().rev() {
            result = self.heap.cons(val, result);
        }
        Ok(result)
    }

    /// A `.` that is a token on its own.
    fn is_lone_dot(&self) -> bool {
        self.input
            .get(self.pos + 1)
            .map_or(true, |&next| is_delimiter(next))
    }

    fn read_token(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_delimiter(ch) {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).to_ascii_uppercase()
    }

    fn atom(&mut self, token: &str) -> LispResult<Value> {
        if token == "NIL" {
            return Ok(Value::Nil);
        }
        if is_numeric(token) {
            return token
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| LispError::Syntax(format!("integer out of range: {}", token)));
        }
        Ok(Value::Symbol(self.symbols.intern(token)))
    }
}

fn is_delimiter(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | b'(' | b')' | b';')
}

/// Optional sign followed by at least one decimal digit, nothing else.
fn is_numeric(token: &str) -> bool {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Read a single datum from a string.
pub fn read_str(input: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> LispResult<Value> {
    let mut reader = Reader::new(input, heap, symbols);
    reader
        .read()?
        .ok_or_else(|| LispError::Syntax("empty input".into()))
}

/// Read all data from a string.
pub fn read_all(input: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> LispResult<Vec<Value>> {
    Reader::new(input, heap, symbols).read_all()
}

/// Read one datum starting at byte offset `pos`.
/// Returns `Ok(Some((value, new_pos)))`, or `Ok(None)` if only whitespace
/// and comments remain.
pub fn read_one_at(
    input: &str,
    pos: usize,
    heap: &mut Heap,
    symbols: &mut SymbolTable,
) -> LispResult<Option<(Value, usize)>> {
    let rest = input.get(pos..).unwrap_or("");
    let mut reader = Reader::new(rest, heap, symbols);
    match reader.read()? {
        Some(val) => Ok(Some((val, pos + reader.position()))),
        None => Ok(None),
    }
}
