//! Expression items: the units produced by the tokenizer and stored in tree
//! nodes.

use std::fmt;

use super::builtins::BuiltinFunction;
use super::value::Value;

/// Largest number of arguments a variable-arity function accepts.
pub const MAX_ARGS: usize = 16;

/// Deepest bracket nesting and tree height an expression may reach.
pub const MAX_DEPTH: usize = 128;

// ── Priority ──────────────────────────────────────────────────────────────────

/// Insertion priority of a tree node.  Higher binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Logical = 1,
    Comparison = 2,
    Additive = 3,
    Multiplicative = 4,
    /// Prefix operators and function calls.
    Unary = 5,
    /// Literals and variables.
    Value = 6,
    /// A bracketed sub-expression, protected from rotation.
    Bracket = 255,
}

// ── Operators ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    Not,
    /// Unary minus; produced by the tree builder, never by the tokenizer.
    Neg,
}

impl Operator {
    /// Every keyword the tokenizer recognises, used for maximal munch.
    pub const KEYWORDS: &'static [&'static str] = &[
        "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "&&", "||", "^", "!",
    ];

    /// Look up an operator by keyword.  `-` maps to binary subtraction.
    pub fn from_keyword(kw: &str) -> Option<Operator> {
        Some(match kw {
            "+" => Operator::Add,
            "-" => Operator::Sub,
            "*" => Operator::Mul,
            "/" => Operator::Div,
            "%" => Operator::Mod,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "&&" => Operator::And,
            "||" => Operator::Or,
            "^" => Operator::Xor,
            "!" => Operator::Not,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub | Operator::Neg => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Xor => "^",
            Operator::Not => "!",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Operator::Not | Operator::Neg => 1,
            _ => 2,
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            Operator::And | Operator::Or | Operator::Xor => Priority::Logical,
            Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Le
            | Operator::Gt
            | Operator::Ge => Priority::Comparison,
            Operator::Add | Operator::Sub => Priority::Additive,
            Operator::Mul | Operator::Div | Operator::Mod => Priority::Multiplicative,
            Operator::Not | Operator::Neg => Priority::Unary,
        }
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Accepted argument counts of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one of these counts.
    Set(Vec<usize>),
    /// Any count up to [`MAX_ARGS`].
    Variable,
}

impl Arity {
    pub fn exactly(n: usize) -> Self {
        Arity::Set(vec![n])
    }

    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Set(counts) => counts.contains(&n),
            Arity::Variable => n <= MAX_ARGS,
        }
    }

    /// Whether a call must have an empty argument list.
    pub fn is_zero(&self) -> bool {
        matches!(self, Arity::Set(counts) if counts.as_slice() == [0])
    }

    pub fn describe(&self) -> String {
        match self {
            Arity::Set(counts) => counts
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
            Arity::Variable => format!("at most {MAX_ARGS}"),
        }
    }
}

/// A callable named in an expression.
#[derive(Debug, Clone)]
pub enum Function {
    Builtin(&'static BuiltinFunction),
    /// `$name(...)`, served by the user extension.  Stored without the `$`.
    User(String),
}

impl Function {
    pub fn name(&self) -> String {
        match self {
            Function::Builtin(f) => f.name.to_owned(),
            Function::User(name) => format!("${name}"),
        }
    }
}

// ── Items ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Open,
    Close,
}

/// One lexical unit of an expression.
#[derive(Debug, Clone)]
pub enum ExpressionItem {
    Value(Value),
    Variable(String),
    Operator(Operator),
    Function(Function),
    Delimiter(Delimiter),
}

impl ExpressionItem {
    /// Priority a node built from this item starts with.
    pub fn priority(&self) -> Priority {
        match self {
            ExpressionItem::Value(_) | ExpressionItem::Variable(_) => Priority::Value,
            ExpressionItem::Operator(op) => op.priority(),
            ExpressionItem::Function(_) => Priority::Unary,
            ExpressionItem::Delimiter(_) => Priority::Bracket,
        }
    }
}

impl fmt::Display for ExpressionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionItem::Value(Value::Str(s)) => write!(f, "\"{s}\""),
            ExpressionItem::Value(v) => write!(f, "{v}"),
            ExpressionItem::Variable(name) => f.write_str(name),
            ExpressionItem::Operator(op) => f.write_str(op.keyword()),
            ExpressionItem::Function(func) => f.write_str(&func.name()),
            ExpressionItem::Delimiter(Delimiter::Comma) => f.write_str(","),
            ExpressionItem::Delimiter(Delimiter::Open) => f.write_str("("),
            ExpressionItem::Delimiter(Delimiter::Close) => f.write_str(")"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_round_trip() {
        for kw in Operator::KEYWORDS {
            let op = Operator::from_keyword(kw).expect("known keyword");
            assert_eq!(op.keyword(), *kw);
        }
        assert_eq!(Operator::from_keyword("="), None);
    }

    #[test]
    fn priorities_order() {
        assert!(Operator::And.priority() < Operator::Eq.priority());
        assert!(Operator::Eq.priority() < Operator::Add.priority());
        assert!(Operator::Add.priority() < Operator::Mul.priority());
        assert!(Operator::Mul.priority() < Operator::Not.priority());
        assert!(Priority::Value < Priority::Bracket);
    }

    #[test]
    fn arity_sets() {
        assert!(Arity::exactly(2).accepts(2));
        assert!(!Arity::exactly(2).accepts(1));
        assert!(Arity::Set(vec![1, 2]).accepts(1));
        assert!(Arity::Variable.accepts(0));
        assert!(Arity::Variable.accepts(MAX_ARGS));
        assert!(!Arity::Variable.accepts(MAX_ARGS + 1));
        assert!(Arity::exactly(0).is_zero());
        assert_eq!(Arity::Set(vec![1, 2]).describe(), "1 or 2");
    }
}
