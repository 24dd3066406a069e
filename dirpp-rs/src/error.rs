//! Error taxonomy.
//!
//! Three layers:
//!
//! - [`ExprError`] is raised by the expression subsystem (tokenizer, tree
//!   builder, evaluator) and knows nothing about files or lines.
//! - [`DirectiveError`] is raised by directive handlers and the line
//!   processor; it wraps [`ExprError`] and adds structural, I/O, argument and
//!   user-triggered failures.
//! - [`Error`] is the single surfaced kind.  The engine attaches the raw
//!   offending line and the include stack to a [`DirectiveError`] at the
//!   point of failure.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// ── Expression errors ─────────────────────────────────────────────────────────

/// Failure inside the expression subsystem.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' in expression")]
    UnexpectedChar(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unsupported escape sequence '\\{0}'")]
    BadEscape(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("invalid numeric literal '{0}'")]
    BadNumber(String),

    #[error("unmatched bracket")]
    UnmatchedBracket,

    #[error("empty expression")]
    Empty,

    #[error("unexpected '{0}' in expression")]
    Unexpected(String),

    #[error("wrong number of arguments for {name}: expected {expected}, got {got}")]
    WrongArity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("can't place '{0}' in expression tree, check operator precedence and operands")]
    Placement(String),

    #[error("operator '{0}' is missing an operand")]
    MissingOperand(String),

    #[error("unsupported operand types for '{op}': {types}")]
    UnsupportedOperands { op: String, types: String },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("variable '{0}' is read-only")]
    ReadOnly(String),

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("expected a {expected} value, got {got}")]
    WrongType { expected: String, got: String },

    #[error("user function '{name}' failed: {message}")]
    Extension { name: String, message: String },

    #[error("internal expression error: {0}")]
    Internal(String),
}

impl ExprError {
    /// Category of this failure in the engine-wide taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExprError::UnexpectedChar(_)
            | ExprError::UnterminatedString
            | ExprError::BadEscape(_)
            | ExprError::UnknownOperator(_)
            | ExprError::BadNumber(_)
            | ExprError::UnmatchedBracket
            | ExprError::Empty
            | ExprError::Unexpected(_) => ErrorKind::Lexical,
            ExprError::WrongArity { .. }
            | ExprError::Placement(_)
            | ExprError::MissingOperand(_)
            | ExprError::UnsupportedOperands { .. }
            | ExprError::Arithmetic(_)
            | ExprError::Extension { .. }
            | ExprError::Internal(_) => ErrorKind::Semantic,
            ExprError::UnknownVariable(_)
            | ExprError::UnknownFunction(_)
            | ExprError::ReadOnly(_)
            | ExprError::WrongType { .. } => ErrorKind::Resolution,
        }
    }
}

// ── Directive errors ──────────────────────────────────────────────────────────

/// Failure raised while dispatching a directive or processing a text line.
#[derive(Error, Debug)]
pub enum DirectiveError {
    #[error(transparent)]
    Expr(#[from] ExprError),

    /// A closing directive without its opener, or an unclosed block.
    #[error("{0}")]
    Structure(String),

    /// Malformed directive arguments.
    #[error("{0}")]
    Syntax(String),

    #[error("{message}: {source}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// `//#error` and friends.
    #[error("{0}")]
    User(String),
}

impl DirectiveError {
    pub fn structure(msg: impl Into<String>) -> Self {
        DirectiveError::Structure(msg.into())
    }

    pub fn syntax(msg: impl Into<String>) -> Self {
        DirectiveError::Syntax(msg.into())
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        DirectiveError::Io {
            message: message.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DirectiveError::Expr(e) => e.kind(),
            DirectiveError::Structure(_) => ErrorKind::Structural,
            DirectiveError::Syntax(_) => ErrorKind::Lexical,
            DirectiveError::Io { .. } => ErrorKind::Io,
            DirectiveError::User(_) => ErrorKind::User,
        }
    }

    /// Attach location information, producing the surfaced [`Error`].
    pub fn at(self, source_line: Option<String>, include_stack: Vec<FilePosition>) -> Error {
        Error {
            kind: self.kind(),
            message: self.to_string(),
            source_line,
            include_stack,
        }
    }
}

// ── Surfaced error ────────────────────────────────────────────────────────────

/// Category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown character, unterminated string, unmatched bracket, bad directive syntax.
    Lexical,
    /// Wrong arity, no matching overload, non-value result.
    Semantic,
    /// Unknown variable, wrong required type.
    Resolution,
    /// Closing directive without opener, unclosed block.
    Structural,
    /// Missing include target, write failure.
    Io,
    /// `//#error`.
    User,
}

/// One entry of an include stack: a file and a 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePosition {
    pub file: PathBuf,
    pub line: usize,
}

impl fmt::Display for FilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// A preprocessing failure with its location.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// The raw offending source line, when the failure happened on one.
    pub source_line: Option<String>,
    /// Include stack at the failure point, outermost file first.
    pub include_stack: Vec<FilePosition>,
}

impl Error {
    /// Error not tied to any source line (configuration, file selection).
    pub fn detached(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            source_line: None,
            include_stack: Vec::new(),
        }
    }

    /// The innermost position, if any.
    pub fn position(&self) -> Option<&FilePosition> {
        self.include_stack.last()
    }

    /// Whether this failure stops the whole run rather than just one file.
    pub fn aborts_run(&self) -> bool {
        self.kind == ErrorKind::User
    }

    /// Multi-line diagnostic: message, offending line, include stack.
    pub fn report(&self) -> String {
        let mut out = String::new();
        match self.position() {
            Some(pos) => out.push_str(&format!("{pos}: {}", self.message)),
            None => out.push_str(&self.message),
        }
        if let Some(line) = &self.source_line {
            out.push_str(&format!("\n    {}", line.trim_end()));
        }
        for pos in self.include_stack.iter().rev().skip(1) {
            out.push_str(&format!("\n  included from {pos}"));
        }
        out
    }
}

/// Result type alias for preprocessing operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Tests ─────────────────────────────────────────────────────────────────────
