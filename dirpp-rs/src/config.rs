//! Run configuration and `dirpp.conf` parser.
//!
//! The file format is one setting per line:
//!
//! | Line | Action |
//! |------|--------|
//! | `key = value` | set a run option (see [`Config::set`]) |
//! | `global NAME = value` | predefine a global variable |
//! | Lines starting with `#` or `;` | comment, ignored |
//!
//! Unknown keys and malformed values are reported as [`ConfigError`]s;
//! loading continues with the next line.

use std::path::{Path, PathBuf};

use crate::comments::CommentMode;
use crate::output::Eol;
use crate::pattern::PathPattern;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Extensions processed when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "c", "cpp", "cs", "css", "h", "hpp", "html", "java", "js", "json", "md", "properties", "rs",
    "ts", "txt", "xml",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Source roots (directories or single files).
    pub sources: Vec<PathBuf>,
    /// Destination root.
    pub target: PathBuf,
    /// Extensions (lowercase, no dot) whose files are preprocessed.  `*`
    /// matches any extension.
    pub extensions: Vec<String>,
    /// Extensions whose files are copied unchanged.
    pub copy_extensions: Vec<String>,
    /// Copy-only extensions whose files still take part in the global
    /// phase.
    pub scan_extensions: Vec<String>,
    /// Glob or `re:` patterns of source-relative paths to skip.
    pub excludes: Vec<String>,
    /// Unknown variables read as `false` in inline substitutions.
    pub unknown_as_false: bool,
    /// Directives may be indented.
    pub allow_whitespace: bool,
    pub comments: CommentMode,
    /// Leave destinations alone when their bytes would not change.
    pub only_if_changed: bool,
    /// Process everything, write nothing.
    pub dry_run: bool,
    pub eol: Eol,
    /// Predefined global variables, as `(name, literal)`.
    pub globals: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sources: Vec::new(),
            target: PathBuf::from("out"),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            copy_extensions: Vec::new(),
            scan_extensions: Vec::new(),
            excludes: Vec::new(),
            unknown_as_false: false,
            allow_whitespace: false,
            comments: CommentMode::KeepAll,
            only_if_changed: false,
            dry_run: false,
            eol: Eol::Lf,
            globals: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string on top of the defaults.
    ///
    /// Returns the config and a list of any errors on individual lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let errors = config.apply_str(s);
        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply every line of `s` to this config.
    pub fn apply_str(&mut self, s: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        for (i, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Err(message) = self.apply_line(line) {
                errors.push(ConfigError { line: i + 1, message });
            }
        }
        errors
    }

    fn apply_line(&mut self, line: &str) -> Result<(), String> {
        if let Some(rest) = line.strip_prefix("global") {
            if rest.starts_with(char::is_whitespace) {
                let (name, value) = split_assignment(rest)?;
                self.define(name, value)?;
                return Ok(());
            }
        }
        let (key, value) = split_assignment(line)?;
        self.set(key, value)
    }

    /// Set one option by its config-file key.
    ///
    /// Keys: `source` and `exclude` (repeatable), `target`, `extensions`,
    /// `copy-extensions`, `scan-extensions`, `unknown-as-false`, `allow-whitespace`,
    /// `comments`, `only-if-changed`, `dry-run`, `eol`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "source" => self.sources.push(PathBuf::from(value)),
            "target" => self.target = PathBuf::from(value),
            "extensions" => self.extensions = split_list(value),
            "copy-extensions" => self.copy_extensions = split_list(value),
            "scan-extensions" => self.scan_extensions = split_list(value),
            "exclude" => {
                PathPattern::new(value).map_err(|e| format!("exclude '{value}': {e}"))?;
                self.excludes.push(value.to_owned());
            }
            "unknown-as-false" => self.unknown_as_false = parse_flag(key, value)?,
            "allow-whitespace" => self.allow_whitespace = parse_flag(key, value)?,
            "comments" => self.comments = value.parse()?,
            "only-if-changed" => self.only_if_changed = parse_flag(key, value)?,
            "dry-run" => self.dry_run = parse_flag(key, value)?,
            "eol" => self.eol = value.parse()?,
            _ => return Err(format!("unknown setting '{key}'")),
        }
        Ok(())
    }

    /// Predefine (or redefine) a global variable.
    pub fn define(&mut self, name: &str, value: &str) -> Result<(), String> {
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.');
        if !valid {
            return Err(format!("'{name}' is not a valid variable name"));
        }
        self.globals.retain(|(n, _)| n != name);
        self.globals.push((name.to_owned(), value.to_owned()));
        Ok(())
    }
}

// ── Value parsers ─────────────────────────────────────────────────────────────

/// Split `key = value`.  The value may be empty.
fn split_assignment(line: &str) -> Result<(&str, &str), String> {
    let Some((key, value)) = line.split_once('=') else {
        return Err(format!("expected 'key = value', got '{}'", line.trim()));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err("missing setting name before '='".into());
    }
    Ok((key, value.trim()))
}

/// Comma or whitespace separated extensions, lowercased, leading dots
/// removed.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn parse_flag(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("{key}: expected on or off, got '{value}'")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert!(cfg.sources.is_empty());
        assert_eq!(cfg.target, PathBuf::from("out"));
        assert!(cfg.extensions.iter().any(|e| e == "java"));
        assert_eq!(cfg.comments, CommentMode::KeepAll);
        assert_eq!(cfg.eol, Eol::Lf);
    }

    #[test]
    fn realistic_file() {
        let src = "\
# dirpp settings\n\
source = src/main\n\
source = src/extra\n\
target = build/gen\n\
extensions = .java, .XML txt\n\
copy-extensions = png, tmpl\n\
scan-extensions = tmpl\n\
exclude = **/*Test.java\n\
exclude = re:gen/.*\n\
\n\
; behaviour\n\
unknown-as-false = on\n\
allow-whitespace = yes\n\
comments = directives\n\
only-if-changed = true\n\
eol = crlf\n\
global DEBUG = true\n\
global VERSION = \"1.2\"\n\
";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.sources, vec![PathBuf::from("src/main"), PathBuf::from("src/extra")]);
        assert_eq!(cfg.target, PathBuf::from("build/gen"));
        assert_eq!(cfg.extensions, vec!["java", "xml", "txt"]);
        assert_eq!(cfg.copy_extensions, vec!["png", "tmpl"]);
        assert_eq!(cfg.scan_extensions, vec!["tmpl"]);
        assert_eq!(cfg.excludes.len(), 2);
        assert!(cfg.unknown_as_false && cfg.allow_whitespace && cfg.only_if_changed);
        assert!(!cfg.dry_run);
        assert_eq!(cfg.comments, CommentMode::RemoveDirectives);
        assert_eq!(cfg.eol, Eol::CrLf);
        assert_eq!(
            cfg.globals,
            vec![
                ("DEBUG".to_owned(), "true".to_owned()),
                ("VERSION".to_owned(), "\"1.2\"".to_owned())
            ]
        );
    }

    #[test]
    fn errors_carry_line_numbers_and_loading_continues() {
        let (cfg, errs) = Config::load_str("target = a\nbogus = 1\ndry-run = perhaps\nno equals\ntarget = b\n");
        assert_eq!(errs.iter().map(|e| e.line).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(errs[0].to_string(), "line 2: unknown setting 'bogus'");
        assert_eq!(cfg.target, PathBuf::from("b"));
    }

    #[test]
    fn invalid_values() {
        let (_, errs) = Config::load_str("exclude = [abc\ncomments = strip\neol = cr\nglobal 9x = 1\n");
        assert_eq!(errs.len(), 4);
    }

    #[test]
    fn global_redefinition_replaces() {
        let mut cfg = Config::new();
        cfg.define("X", "1").unwrap();
        cfg.define("X", "2").unwrap();
        assert_eq!(cfg.globals, vec![("X".to_owned(), "2".to_owned())]);
    }

    #[test]
    fn key_named_like_global_prefix() {
        // `globalx = 1` is a (bad) setting, not a global definition.
        let (_, errs) = Config::load_str("globalx = 1");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("unknown setting"));
    }
}
