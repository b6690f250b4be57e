use thiserror::Error;

/// Errors returned by the reader, the evaluator and the primitive library.
///
/// The first error raised anywhere in an evaluation aborts that evaluation;
/// the heap and every environment stay usable for the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LispError {
    /// Malformed text, or a special form used with an illegal shape.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Symbol absent through the whole environment chain.
    #[error("Symbol not bound: {0}")]
    Unbound(String),

    /// Wrong operand count for a builtin, closure or special form.
    #[error("Wrong number of arguments: {0}")]
    Args(String),

    /// Operand of a variant the operation cannot handle.
    #[error("Wrong type: {0}")]
    Type(String),
}

/// The bare category of a `LispError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Unbound,
    Args,
    Type,
}

impl LispError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LispError::Syntax(_) => ErrorKind::Syntax,
            LispError::Unbound(_) => ErrorKind::Unbound,
            LispError::Args(_) => ErrorKind::Args,
            LispError::Type(_) => ErrorKind::Type,
        }
    }
}

pub type LispResult<T> = Result<T, LispError>;
