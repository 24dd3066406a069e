//! Directive argument grammar.
//!
//! Helpers that split a directive's raw argument text according to its
//! [`ArgumentKind`](super::ArgumentKind).  Expressions are returned as text
//! and evaluated by the caller.

use crate::error::DirectiveError;

/// Whether `c` may appear in a variable name.
pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// No arguments.  A trailing `//` comment is allowed.
pub fn expect_none(directive: &str, args: &str) -> Result<(), DirectiveError> {
    let rest = args.trim();
    if rest.is_empty() || rest.starts_with("//") {
        Ok(())
    } else {
        Err(DirectiveError::syntax(format!(
            "//#{directive} takes no arguments, got '{rest}'"
        )))
    }
}

/// A single variable name.
pub fn parse_identifier<'a>(directive: &str, args: &'a str) -> Result<&'a str, DirectiveError> {
    let name = args.trim();
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(is_name_start) && chars.all(is_name_char);
    if valid {
        Ok(name)
    } else if name.is_empty() {
        Err(DirectiveError::syntax(format!("//#{directive} requires a variable name")))
    } else {
        Err(DirectiveError::syntax(format!(
            "//#{directive}: '{name}' is not a valid variable name"
        )))
    }
}

/// `name`, `name expr` or `name = expr`.  The expression part is `None`
/// when absent.
pub fn parse_name_expr<'a>(
    directive: &str,
    args: &'a str,
) -> Result<(&'a str, Option<&'a str>), DirectiveError> {
    let text = args.trim();
    let end = text
        .char_indices()
        .find(|&(_, c)| !is_name_char(c))
        .map_or(text.len(), |(i, _)| i);
    let name = parse_identifier(directive, &text[..end])?;
    let mut rest = text[end..].trim_start();
    if let Some(after) = rest.strip_prefix('=') {
        if !after.starts_with('=') {
            rest = after.trim_start();
            if rest.is_empty() {
                return Err(DirectiveError::syntax(format!(
                    "//#{directive} {name} = requires an expression"
                )));
            }
        }
    }
    let rest = rest.trim_end();
    Ok((name, (!rest.is_empty()).then_some(rest)))
}

/// Comma-separated expressions.  Commas inside string literals or
/// brackets do not split.  Empty text gives an empty list.
pub fn split_expr_list<'a>(directive: &str, args: &'a str) -> Result<Vec<&'a str>, DirectiveError> {
    let text = args.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    DirectiveError::syntax(format!("//#{directive}: unmatched ')'"))
                })?
            }
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_string || depth != 0 {
        return Err(DirectiveError::syntax(format!(
            "//#{directive}: unterminated string or bracket"
        )));
    }
    parts.push(text[start..].trim());
    if parts.iter().any(|p| p.is_empty()) {
        return Err(DirectiveError::syntax(format!(
            "//#{directive}: empty expression in list"
        )));
    }
    Ok(parts)
}

/// `on`/`off` and the usual synonyms.
pub fn parse_on_off(directive: &str, args: &str) -> Result<bool, DirectiveError> {
    match args.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(DirectiveError::syntax(format!(
            "//#{directive} expects on or off, got '{other}'"
        ))),
    }
}

/// Non-empty expression text.
pub fn expect_expr<'a>(directive: &str, args: &'a str) -> Result<&'a str, DirectiveError> {
    let text = args.trim();
    if text.is_empty() {
        Err(DirectiveError::syntax(format!("//#{directive} requires an expression")))
    } else {
        Ok(text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
