//! Path patterns for file-selection exclusion filters.
//!
//! ## Syntax
//!
//! | Form | Meaning |
//! |------|---------|
//! | `re:<regex>` | [`regex`] crate syntax, matched against the whole relative path |
//! | `*` | any run of characters except `/` |
//! | `**` | any run of characters including `/` (`**/` also matches nothing) |
//! | `?` | one character except `/` |
//! | `[...]` | character class with ranges; `[!...]` or `[^...]` negated |
//! | `\x` | literal `x` |
//!
//! Paths are matched with `/` separators regardless of platform.

use regex::Regex;
use thiserror::Error;

/// Error returned when a pattern cannot be compiled.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("regex error: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("glob error: {0}")]
    InvalidGlob(String),
}

#[derive(Debug, Clone)]
enum Compiled {
    Regex(Regex),
    Glob(Vec<char>),
}

/// A compiled exclusion pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    src: String,
    compiled: Compiled,
}

impl PathPattern {
    pub fn new(src: &str) -> Result<Self, PatternError> {
        let compiled = match src.strip_prefix("re:") {
            Some(re) => Compiled::Regex(
                regex::RegexBuilder::new(&format!("^(?:{re})$"))
                    .dot_matches_new_line(true)
                    .build()?,
            ),
            None => {
                check_glob(src).map_err(PatternError::InvalidGlob)?;
                Compiled::Glob(src.chars().collect())
            }
        };
        Ok(PathPattern {
            src: src.to_owned(),
            compiled,
        })
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    /// Whether `path` (relative, `/`-separated) matches.
    pub fn matches(&self, path: &str) -> bool {
        match &self.compiled {
            Compiled::Regex(re) => re.is_match(path),
            Compiled::Glob(pat) => {
                let text: Vec<char> = path.chars().collect();
                smatch(pat, &text, MAX_DEPTH)
            }
        }
    }
}

/// Compile every pattern, failing on the first invalid one.
pub fn compile_all<S: AsRef<str>>(sources: &[S]) -> Result<Vec<PathPattern>, PatternError> {
    sources.iter().map(|s| PathPattern::new(s.as_ref())).collect()
}

// ── Glob matching ─────────────────────────────────────────────────────────────

/// Recursion budget for `*` backtracking.  Exhaustion counts as no match.
const MAX_DEPTH: usize = 256;

fn smatch(mut pat: &[char], mut s: &[char], depth: usize) -> bool {
    if depth == 0 {
        return false;
    }
    loop {
        let Some(&p) = pat.first() else {
            return s.is_empty();
        };
        match p {
            '*' if pat.get(1) == Some(&'*') => {
                let mut rest = &pat[2..];
                // `**/` may also match zero directories.
                if rest.first() == Some(&'/') && smatch(&rest[1..], s, depth - 1) {
                    return true;
                }
                while rest.first() == Some(&'*') {
                    rest = &rest[1..];
                }
                return (0..=s.len()).any(|i| smatch(rest, &s[i..], depth - 1));
            }
            '*' => {
                let rest = &pat[1..];
                let limit = s.iter().position(|c| *c == '/').unwrap_or(s.len());
                return (0..=limit).any(|i| smatch(rest, &s[i..], depth - 1));
            }
            '?' => match s.first() {
                Some(c) if *c != '/' => {
                    pat = &pat[1..];
                    s = &s[1..];
                }
                _ => return false,
            },
            '[' => {
                let Some(&c) = s.first() else {
                    return false;
                };
                match cmatch(&pat[1..], c) {
                    Some(rest) => {
                        pat = rest;
                        s = &s[1..];
                    }
                    None => return false,
                }
            }
            '\\' if pat.len() > 1 => {
                if s.first() != Some(&pat[1]) {
                    return false;
                }
                pat = &pat[2..];
                s = &s[1..];
            }
            lit => {
                if s.first() != Some(&lit) {
                    return false;
                }
                pat = &pat[1..];
                s = &s[1..];
            }
        }
    }
}

/// Match a character class against `ch`.  `class` starts after the `[`.
/// Returns the pattern after the closing `]` on match.
fn cmatch(mut class: &[char], ch: char) -> Option<&[char]> {
    let negated = matches!(class.first(), Some('!' | '^'));
    if negated {
        class = &class[1..];
    }
    let mut matched = false;
    let mut first = true;
    loop {
        match class.first().copied() {
            None => return None,
            Some(']') if !first => break,
            Some('\\') if class.len() > 1 => {
                matched |= class[1] == ch;
                class = &class[2..];
            }
            Some(lo) => {
                if class.len() >= 3 && class[1] == '-' && class[2] != ']' {
                    matched |= lo <= ch && ch <= class[2];
                    class = &class[3..];
                } else {
                    matched |= lo == ch;
                    class = &class[1..];
                }
            }
        }
        first = false;
    }
    if matched != negated && ch != '/' {
        Some(&class[1..])
    } else {
        None
    }
}

/// Validate glob syntax: brackets must close, and a pattern may not end in
/// a lone backslash.
pub fn check_glob(pat: &str) -> Result<(), String> {
    let mut chars = pat.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if chars.next().is_none() {
                    return Err("trailing '\\'".into());
                }
            }
            '[' => {
                let mut found = false;
                let mut first = true;
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        chars.next();
                    } else if c == ']' && !first {
                        found = true;
                        break;
                    } else if first && (c == '!' || c == '^') {
                        continue;
                    }
                    first = false;
                }
                if !found {
                    return Err("unmatched '['".into());
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(p: &str, s: &str) -> bool {
        PathPattern::new(p).unwrap().matches(s)
    }

    #[test]
    fn star_stays_in_segment() {
        assert!(glob("*.txt", "a.txt"));
        assert!(!glob("*.txt", "dir/a.txt"));
        assert!(glob("dir/*.txt", "dir/a.txt"));
        assert!(glob("*", ""));
    }

    #[test]
    fn double_star_crosses_segments() {
        assert!(glob("**/*.txt", "a.txt"));
        assert!(glob("**/*.txt", "x/y/a.txt"));
        assert!(glob("gen/**", "gen/a/b.c"));
        assert!(!glob("gen/**", "src/a.c"));
    }

    #[test]
    fn single_char_and_classes() {
        assert!(glob("file?.c", "file1.c"));
        assert!(!glob("file?.c", "file/.c"));
        assert!(glob("[a-c]*.h", "b_x.h"));
        assert!(!glob("[!a-c]*.h", "b_x.h"));
        assert!(glob("[^a-c]*.h", "z.h"));
        assert!(glob("[]]x", "]x"));
        assert!(glob("a\\*b", "a*b"));
        assert!(!glob("a\\*b", "axb"));
    }

    #[test]
    fn regex_patterns_match_whole_path() {
        let p = PathPattern::new("re:.*_test\\.(c|h)").unwrap();
        assert!(p.matches("src/x_test.c"));
        assert!(!p.matches("src/x_test.cpp"));
        assert_eq!(p.src(), "re:.*_test\\.(c|h)");
    }

    #[test]
    fn invalid_patterns() {
        assert!(matches!(PathPattern::new("[abc"), Err(PatternError::InvalidGlob(_))));
        assert!(matches!(PathPattern::new("abc\\"), Err(PatternError::InvalidGlob(_))));
        assert!(matches!(PathPattern::new("re:("), Err(PatternError::InvalidRegex(_))));
        assert!(compile_all(&["*.c", "re:x"]).is_ok());
    }

    #[test]
    fn pathological_pattern_terminates() {
        let text = "a".repeat(200);
        assert!(!glob("**a**a**a**a**b", &text));
    }
}
