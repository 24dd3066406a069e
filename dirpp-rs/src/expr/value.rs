//! Runtime value type for the expression language.
//!
//! Unlike a loosely typed macro language, values here are strictly tagged:
//! operators and functions are selected by the exact tags of their operands
//! and there is no implicit string-to-number coercion.

use std::fmt;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f32),
    Str(String),
    Bool(bool),
}

/// Type tag of a [`Value`].
///
/// `Any` and `Unknown` never describe a live value; they exist for overload
/// tables and signature checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Float,
    Str,
    Bool,
    Any,
    Unknown,
}

impl ValueType {
    /// Whether a value of type `other` may be passed where `self` is expected.
    ///
    /// `Unknown` is compatible with nothing, `Any` with everything else.
    pub fn is_compatible(self, other: ValueType) -> bool {
        match (self, other) {
            (ValueType::Unknown, _) | (_, ValueType::Unknown) => false,
            (ValueType::Any, _) | (_, ValueType::Any) => true,
            (a, b) => a == b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Int => "integer",
            ValueType::Float => "float",
            ValueType::Str => "string",
            ValueType::Bool => "boolean",
            ValueType::Any => "any",
            ValueType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                // Always show a fractional part so floats stay recognisable.
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Bool(_) => ValueType::Bool,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Parse a textual value as given on the command line or in a config
    /// file: `true`/`false`, decimal or `0x` hex integers, floats, a quoted
    /// string, or otherwise the raw text as a string.
    pub fn parse_literal(text: &str) -> Value {
        let t = text.trim();
        match t {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
            if let Ok(n) = i64::from_str_radix(hex, 16) {
                return Value::Int(n);
            }
        }
        if let Ok(n) = t.parse::<i64>() {
            return Value::Int(n);
        }
        if t.contains('.') {
            if let Ok(x) = t.parse::<f32>() {
                return Value::Float(x);
            }
        }
        if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
            return Value::Str(t[1..t.len() - 1].to_owned());
        }
        Value::Str(t.to_owned())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
