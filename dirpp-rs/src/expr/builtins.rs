//! Built-in expression functions.
//!
//! Each function declares its accepted argument counts and a list of
//! per-argument type signatures.  A call is dispatched to the first
//! signature, in declaration order, that every argument is compatible with.

use std::fmt;

use crate::error::ExprError;

use super::item::Arity;
use super::value::{Value, ValueType};
use super::EvalContext;

use ValueType::{Any, Bool, Float, Int, Str};

pub type BuiltinFn = fn(&[Value], &dyn EvalContext) -> Result<Value, ExprError>;

pub struct BuiltinFunction {
    pub name: &'static str,
    pub arities: &'static [usize],
    pub signatures: &'static [&'static [ValueType]],
    pub result: ValueType,
    apply: BuiltinFn,
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFunction")
            .field("name", &self.name)
            .field("arities", &self.arities)
            .field("result", &self.result)
            .finish()
    }
}

impl BuiltinFunction {
    pub fn arity(&self) -> Arity {
        Arity::Set(self.arities.to_vec())
    }

    /// Call with already-evaluated arguments.
    pub fn call(&self, args: &[Value], ctx: &dyn EvalContext) -> Result<Value, ExprError> {
        let matched = self.signatures.iter().any(|sig| {
            sig.len() == args.len()
                && sig
                    .iter()
                    .zip(args)
                    .all(|(want, got)| want.is_compatible(got.value_type()))
        });
        if !matched {
            return Err(ExprError::UnsupportedOperands {
                op: self.name.to_owned(),
                types: type_list(args),
            });
        }
        (self.apply)(args, ctx)
    }
}

pub(crate) fn type_list(args: &[Value]) -> String {
    args.iter()
        .map(|a| a.value_type().name())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Registry ──────────────────────────────────────────────────────────────────

static BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction {
        name: "abs",
        arities: &[1],
        signatures: &[&[Int], &[Float]],
        result: Any,
        apply: abs,
    },
    BuiltinFunction {
        name: "round",
        arities: &[1],
        signatures: &[&[Float], &[Int]],
        result: Int,
        apply: round,
    },
    BuiltinFunction {
        name: "strlen",
        arities: &[1],
        signatures: &[&[Str]],
        result: Int,
        apply: strlen,
    },
    BuiltinFunction {
        name: "str2int",
        arities: &[1],
        signatures: &[&[Str], &[Int], &[Float], &[Bool]],
        result: Int,
        apply: str2int,
    },
    BuiltinFunction {
        name: "str2web",
        arities: &[1],
        signatures: &[&[Str]],
        result: Str,
        apply: str2web,
    },
    BuiltinFunction {
        name: "str2json",
        arities: &[1],
        signatures: &[&[Str]],
        result: Str,
        apply: str2json,
    },
    BuiltinFunction {
        name: "str2java",
        arities: &[1],
        signatures: &[&[Str]],
        result: Str,
        apply: str2java,
    },
    BuiltinFunction {
        name: "str2xml",
        arities: &[1],
        signatures: &[&[Str]],
        result: Str,
        apply: str2xml,
    },
    BuiltinFunction {
        name: "str2csv",
        arities: &[1],
        signatures: &[&[Str]],
        result: Str,
        apply: str2csv,
    },
    BuiltinFunction {
        name: "issubstr",
        arities: &[2],
        signatures: &[&[Str, Str]],
        result: Bool,
        apply: issubstr,
    },
    BuiltinFunction {
        name: "trimlines",
        arities: &[1],
        signatures: &[&[Str]],
        result: Str,
        apply: trimlines,
    },
    BuiltinFunction {
        name: "defined",
        arities: &[1],
        signatures: &[&[Str]],
        result: Bool,
        apply: defined,
    },
];

/// Look up a built-in function by name.
pub fn find(name: &str) -> Option<&'static BuiltinFunction> {
    BUILTINS.iter().find(|f| f.name == name)
}

/// All built-in functions, in registration order.
pub fn all() -> &'static [BuiltinFunction] {
    BUILTINS
}

// ── Implementations ───────────────────────────────────────────────────────────

fn str_arg(args: &[Value], i: usize) -> Result<&str, ExprError> {
    args.get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| ExprError::Internal(format!("argument {} is not a string", i + 1)))
}

fn abs(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    match args.first() {
        Some(Value::Int(n)) => Ok(Value::Int(n.wrapping_abs())),
        Some(Value::Float(x)) => Ok(Value::Float(x.abs())),
        _ => Err(ExprError::Internal("abs: bad argument".into())),
    }
}

fn round(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    match args.first() {
        Some(Value::Float(x)) => Ok(Value::Int(x.round() as i64)),
        Some(Value::Int(n)) => Ok(Value::Int(*n)),
        _ => Err(ExprError::Internal("round: bad argument".into())),
    }
}

fn strlen(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    Ok(Value::Int(str_arg(args, 0)?.chars().count() as i64))
}

fn str2int(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    match args.first() {
        Some(Value::Int(n)) => Ok(Value::Int(*n)),
        Some(Value::Float(x)) => Ok(Value::Int(x.trunc() as i64)),
        Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        Some(Value::Str(s)) => {
            let t = s.trim();
            let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16).ok(),
                None => t
                    .parse::<i64>()
                    .ok()
                    .or_else(|| t.parse::<f32>().ok().map(|x| x.trunc() as i64)),
            };
            parsed
                .map(Value::Int)
                .ok_or_else(|| ExprError::BadNumber(s.clone()))
        }
        None => Err(ExprError::Internal("str2int: missing argument".into())),
    }
}

fn str2web(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    let s = str_arg(args, 0)?;
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c if (c as u32) > 0x7f => out.push_str(&format!("&#{};", c as u32)),
            c => out.push(c),
        }
    }
    Ok(Value::Str(out))
}

fn escape_c_like(s: &str, escape_non_ascii: bool) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c if escape_non_ascii && (c as u32) > 0x7e => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn str2json(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    Ok(Value::Str(escape_c_like(str_arg(args, 0)?, false)))
}

fn str2java(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    Ok(Value::Str(escape_c_like(str_arg(args, 0)?, true)))
}

fn str2xml(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    let s = str_arg(args, 0)?;
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Ok(Value::Str(out))
}

fn str2csv(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    let s = str_arg(args, 0)?;
    if s.contains([',', '"', '\n', '\r']) {
        Ok(Value::Str(format!("\"{}\"", s.replace('"', "\"\""))))
    } else {
        Ok(Value::Str(s.to_owned()))
    }
}

fn issubstr(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    let needle = str_arg(args, 0)?.to_lowercase();
    let haystack = str_arg(args, 1)?.to_lowercase();
    Ok(Value::Bool(haystack.contains(&needle)))
}

fn trimlines(args: &[Value], _: &dyn EvalContext) -> Result<Value, ExprError> {
    let s = str_arg(args, 0)?;
    let lines: Vec<&str> = s
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    Ok(Value::Str(lines.join("\n")))
}

fn defined(args: &[Value], ctx: &dyn EvalContext) -> Result<Value, ExprError> {
    Ok(Value::Bool(ctx.resolve(str_arg(args, 0)?).is_some()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
