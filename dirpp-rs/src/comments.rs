//! Comment removal, applied to merged output at flush time.
//!
//! Recognises `//` line comments and `/* */` block comments outside of
//! `"..."` and `'...'` literals.  String literals end at the line end even
//! when unterminated, so prose with apostrophes is left alone.

use std::str::FromStr;

/// What to strip from the merged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentMode {
    #[default]
    KeepAll,
    RemoveAll,
    /// Only comments that look like directives: `//#`, `//$`, `/*$ ... */`, `/*-*/`.
    RemoveDirectives,
}

impl FromStr for CommentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" | "none" => Ok(CommentMode::KeepAll),
            "remove" | "all" => Ok(CommentMode::RemoveAll),
            "directives" => Ok(CommentMode::RemoveDirectives),
            other => Err(format!(
                "unknown comment mode '{other}' (expected keep, remove or directives)"
            )),
        }
    }
}

impl CommentMode {
    pub fn name(self) -> &'static str {
        match self {
            CommentMode::KeepAll => "keep",
            CommentMode::RemoveAll => "remove",
            CommentMode::RemoveDirectives => "directives",
        }
    }

    /// Apply the transform.  A line that held only removed comments and
    /// whitespace is dropped entirely.
    pub fn apply(self, text: &str) -> String {
        if self == CommentMode::KeepAll {
            return text.to_owned();
        }
        Stripper::new(text, self).run()
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

struct Stripper {
    src: Vec<char>,
    pos: usize,
    mode: CommentMode,
    out: String,
    line: String,
    removed: bool,
}

impl Stripper {
    fn new(text: &str, mode: CommentMode) -> Self {
        Stripper {
            src: text.chars().collect(),
            pos: 0,
            mode,
            out: String::with_capacity(text.len()),
            line: String::new(),
            removed: false,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn end_line(&mut self) {
        if !(self.removed && self.line.trim().is_empty()) {
            self.out.push_str(&self.line);
            self.out.push('\n');
        }
        self.line.clear();
        self.removed = false;
    }

    fn run(mut self) -> String {
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    self.pos += 1;
                    self.end_line();
                }
                '"' | '\'' => self.literal(c),
                '/' if self.peek(1) == Some('/') => self.line_comment(),
                '/' if self.peek(1) == Some('*') => self.block_comment(),
                _ => {
                    self.line.push(c);
                    self.pos += 1;
                }
            }
        }
        if !self.line.is_empty() && !(self.removed && self.line.trim().is_empty()) {
            self.out.push_str(&self.line);
        }
        self.out
    }

    fn literal(&mut self, quote: char) {
        self.line.push(quote);
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                return;
            }
            self.line.push(c);
            self.pos += 1;
            if c == '\\' {
                if let Some(next) = self.peek(0).filter(|n| *n != '\n') {
                    self.line.push(next);
                    self.pos += 1;
                }
            } else if c == quote {
                return;
            }
        }
    }

    fn line_comment(&mut self) {
        let end = self.src[self.pos..]
            .iter()
            .position(|c| *c == '\n')
            .map_or(self.src.len(), |n| self.pos + n);
        let remove = match self.mode {
            CommentMode::RemoveAll => true,
            _ => matches!(self.peek(2), Some('#' | '$')),
        };
        if remove {
            self.removed = true;
        } else {
            self.line.extend(&self.src[self.pos..end]);
        }
        self.pos = end;
    }

    fn block_comment(&mut self) {
        let close = self.src[self.pos + 2..]
            .windows(2)
            .position(|w| w == ['*', '/'])
            .map(|n| self.pos + 2 + n + 2);
        let end = close.unwrap_or(self.src.len());
        let body = &self.src[self.pos..end];
        let remove = match self.mode {
            CommentMode::RemoveAll => true,
            _ => body.get(2) == Some(&'$') || body == ['/', '*', '-', '*', '/'],
        };
        if !remove {
            let kept: String = body.iter().collect();
            self.line.push_str(&kept);
            self.pos = end;
            return;
        }
        // Newlines inside a removed block close the lines they end.
        let newlines = body.iter().filter(|c| **c == '\n').count();
        for _ in 0..newlines {
            self.removed = true;
            self.end_line();
        }
        self.removed = true;
        self.pos = end;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
