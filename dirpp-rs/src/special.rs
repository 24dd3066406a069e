//! Special-variable providers.
//!
//! A provider claims a fixed set of names (usually by prefix) and is
//! consulted before the local and global scopes.  Providers are shared by
//! every forked context; the per-file data they read lives in
//! [`EngineState`], which the engine keeps current.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ExprError;
use crate::expr::Value;

/// Per-file data visible through the engine namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    /// Root source file of the current run unit.
    pub source: PathBuf,
    /// Destination the merged output is written to.
    pub destination: PathBuf,
    /// File currently being read (differs from `source` inside includes).
    pub file: PathBuf,
    /// 1-based line number in `file`.
    pub line: usize,
    /// Run start, in seconds since the Unix epoch.
    pub started: u64,
}

pub trait SpecialVariables {
    /// Whether `name` belongs to this provider.
    fn claims(&self, name: &str) -> bool;

    fn get(&self, name: &str, state: &EngineState) -> Option<Value>;

    /// Write a claimed variable.  Read-only by default.
    fn set(&self, name: &str, _value: &Value, _state: &mut EngineState) -> Result<(), ExprError> {
        Err(ExprError::ReadOnly(name.to_owned()))
    }
}

// ── Environment ───────────────────────────────────────────────────────────────

const ENV_PREFIX: &str = "env.";

/// `env.NAME`: process environment, read-only.
#[derive(Debug, Default)]
pub struct EnvironmentVariables {
    /// Fixed values replacing the process environment (tests, embedding).
    fixed: Option<HashMap<String, String>>,
}

impl EnvironmentVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvironmentVariables {
            fixed: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

impl SpecialVariables for EnvironmentVariables {
    fn claims(&self, name: &str) -> bool {
        name.starts_with(ENV_PREFIX)
    }

    fn get(&self, name: &str, _: &EngineState) -> Option<Value> {
        let key = name.strip_prefix(ENV_PREFIX)?;
        match &self.fixed {
            Some(vars) => vars.get(key).cloned().map(Value::Str),
            None => std::env::var(key).ok().map(Value::Str),
        }
    }
}

// ── Engine namespace ──────────────────────────────────────────────────────────

const ENGINE_NAMES: &[&str] = &[
    "__line__",
    "__file__",
    "__filename__",
    "__filefolder__",
    "__date__",
    "__time__",
    "__timestamp__",
];

/// `__line__`, `__file__`, dates, and the `pp.` namespace.
#[derive(Debug, Default)]
pub struct EngineVariables;

fn path_value(p: &Path) -> Value {
    Value::Str(p.to_string_lossy().into_owned())
}

fn file_name(p: &Path) -> Value {
    Value::Str(
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    )
}

fn parent_dir(p: &Path) -> Value {
    Value::Str(
        p.parent()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default(),
    )
}

impl SpecialVariables for EngineVariables {
    fn claims(&self, name: &str) -> bool {
        name.starts_with("pp.") || ENGINE_NAMES.contains(&name)
    }

    fn get(&self, name: &str, state: &EngineState) -> Option<Value> {
        Some(match name {
            "__line__" => Value::Int(state.line as i64),
            "__file__" => path_value(&state.file),
            "__filename__" => file_name(&state.file),
            "__filefolder__" => parent_dir(&state.file),
            "__date__" => Value::Str(format_utc("%b %d %Y", state.started)),
            "__time__" => Value::Str(format_utc("%H:%M:%S", state.started)),
            "__timestamp__" => Value::Str(format_utc("%a %b %d %H:%M:%S %Y", state.started)),
            "pp.version" => Value::Str(env!("CARGO_PKG_VERSION").to_owned()),
            "pp.src.path" => path_value(&state.source),
            "pp.src.name" => file_name(&state.source),
            "pp.src.dir" => parent_dir(&state.source),
            "pp.dst.path" => path_value(&state.destination),
            "pp.dst.name" => file_name(&state.destination),
            "pp.dst.dir" => parent_dir(&state.destination),
            _ => return None,
        })
    }

    fn set(&self, name: &str, value: &Value, state: &mut EngineState) -> Result<(), ExprError> {
        let text = value.as_str().ok_or_else(|| ExprError::WrongType {
            expected: "string".into(),
            got: value.value_type().name().into(),
        })?;
        match name {
            "pp.dst.dir" => {
                let name = state.destination.file_name().map(|n| n.to_os_string());
                let mut dst = PathBuf::from(text);
                if let Some(n) = name {
                    dst.push(n);
                }
                state.destination = dst;
                Ok(())
            }
            "pp.dst.name" => {
                state.destination.set_file_name(text);
                Ok(())
            }
            _ => Err(ExprError::ReadOnly(name.to_owned())),
        }
    }
}

// ── UTC time formatting ───────────────────────────────────────────────────────

/// Decompose days-since-epoch into (year, month 1-12, day 1-31).
/// Algorithm: Howard Hinnant's `civil_from_days`.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let mo = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe as i64 + era * 400 + if mo <= 2 { 1 } else { 0 };
    (y, mo, d)
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Format a Unix timestamp (UTC).  Codes: `%H %M %S %Y %m %d %a %b %%`.
pub fn format_utc(fmt: &str, secs: u64) -> String {
    let secs = secs as i64;
    let days = secs.div_euclid(86_400);
    let day_secs = secs.rem_euclid(86_400);
    let (h, m, s) = (day_secs / 3600, (day_secs % 3600) / 60, day_secs % 60);
    let (year, month, day) = civil_from_days(days);
    // The epoch was a Thursday.
    let wday = (days + 4).rem_euclid(7) as usize;

    let mut out = String::with_capacity(fmt.len() + 16);
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('H') => out.push_str(&format!("{h:02}")),
            Some('M') => out.push_str(&format!("{m:02}")),
            Some('S') => out.push_str(&format!("{s:02}")),
            Some('Y') => out.push_str(&year.to_string()),
            Some('m') => out.push_str(&format!("{month:02}")),
            Some('d') => out.push_str(&format!("{day:02}")),
            Some('a') => out.push_str(WEEKDAYS[wday]),
            Some('b') => out.push_str(MONTHS[month as usize - 1]),
            Some('%') | None => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
