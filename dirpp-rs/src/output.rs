//! Output buffers and destination materialization.
//!
//! Emitted lines go to one of three buffers.  A flush merges them in the
//! fixed order prefix, normal, postfix and clears all three.

use std::path::Path;
use std::str::FromStr;

use tracing::info;

use crate::error::DirectiveError;
use crate::fs::FileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferKind {
    Prefix,
    #[default]
    Normal,
    Postfix,
}

/// Line terminator written between output lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eol {
    #[default]
    Lf,
    CrLf,
}

impl Eol {
    pub fn as_str(self) -> &'static str {
        match self {
            Eol::Lf => "\n",
            Eol::CrLf => "\r\n",
        }
    }
}

impl FromStr for Eol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lf" | "unix" => Ok(Eol::Lf),
            "crlf" | "dos" | "windows" => Ok(Eol::CrLf),
            other => Err(format!("unknown line ending '{other}' (expected lf or crlf)")),
        }
    }
}

#[derive(Debug, Default)]
pub struct OutputBuffers {
    prefix: Vec<String>,
    normal: Vec<String>,
    postfix: Vec<String>,
    selected: BufferKind,
}

impl OutputBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, kind: BufferKind) {
        self.selected = kind;
    }

    pub fn selected(&self) -> BufferKind {
        self.selected
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        let buf = match self.selected {
            BufferKind::Prefix => &mut self.prefix,
            BufferKind::Normal => &mut self.normal,
            BufferKind::Postfix => &mut self.postfix,
        };
        buf.push(line.into());
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.normal.is_empty() && self.postfix.is_empty()
    }

    /// Merge prefix, normal and postfix into one text, every line
    /// terminated by `eol`, and clear the buffers.
    pub fn take_merged(&mut self, eol: Eol) -> String {
        let mut out = String::new();
        for line in self
            .prefix
            .drain(..)
            .chain(self.normal.drain(..))
            .chain(self.postfix.drain(..))
        {
            out.push_str(&line);
            out.push_str(eol.as_str());
        }
        out
    }
}

// ── Materialization ───────────────────────────────────────────────────────────

/// Outcome of [`materialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    Written,
    /// The destination already held identical bytes.
    Unchanged,
    /// Dry run: nothing was written.
    DryRun,
}

/// Write `bytes` to `dst`.
///
/// With `only_if_changed` the write is skipped when the existing file has
/// the same length and bytes.
pub fn materialize(
    fs: &dyn FileSystem,
    dst: &Path,
    bytes: &[u8],
    only_if_changed: bool,
    dry_run: bool,
) -> Result<Materialized, DirectiveError> {
    if only_if_changed && fs.is_file(dst) {
        if let Ok(existing) = fs.read(dst) {
            if existing.len() == bytes.len() && existing == bytes {
                return Ok(Materialized::Unchanged);
            }
        }
    }
    if dry_run {
        return Ok(Materialized::DryRun);
    }
    fs.write(dst, bytes)
        .map_err(|e| DirectiveError::io(format!("cannot write {}", dst.display()), e))?;
    info!(target: "dirpp::output", path = %dst.display(), bytes = bytes.len(), "wrote destination");
    Ok(Materialized::Written)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_order_is_fixed() {
        let mut out = OutputBuffers::new();
        out.push_line("body1");
        out.select(BufferKind::Postfix);
        out.push_line("tail");
        out.select(BufferKind::Prefix);
        out.push_line("head");
        out.select(BufferKind::Normal);
        out.push_line("body2");
        assert_eq!(out.take_merged(Eol::Lf), "head\nbody1\nbody2\ntail\n");
        assert!(out.is_empty());
        assert_eq!(out.selected(), BufferKind::Normal);
    }

    #[test]
    fn crlf_endings() {
        let mut out = OutputBuffers::new();
        out.push_line("a");
        out.push_line("b");
        assert_eq!(out.take_merged(Eol::CrLf), "a\r\nb\r\n");
        assert_eq!("CRLF".parse::<Eol>(), Ok(Eol::CrLf));
        assert!("cr".parse::<Eol>().is_err());
    }

    #[test]
    fn only_if_changed_skips_identical() {
        let fs = MemoryFs::new().with("out/a.txt", "same\n");
        let dst = Path::new("out/a.txt");
        assert_eq!(
            materialize(&fs, dst, b"same\n", true, false).unwrap(),
            Materialized::Unchanged
        );
        assert_eq!(
            materialize(&fs, dst, b"same\n", false, false).unwrap(),
            Materialized::Written
        );
        assert_eq!(
            materialize(&fs, dst, b"other\n", true, false).unwrap(),
            Materialized::Written
        );
        assert_eq!(fs.text(dst).as_deref(), Some("other\n"));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let fs = MemoryFs::new();
        let dst = Path::new("out/new.txt");
        assert_eq!(
            materialize(&fs, dst, b"x", false, true).unwrap(),
            Materialized::DryRun
        );
        assert!(!fs.is_file(dst));
    }
}
