//! Directive registry.
//!
//! Every directive is a plain [`Directive`] record in one static table: its
//! name, argument grammar, phase eligibility, gating behaviour and handler
//! function.  [`Registry::lookup`] matches a line (after the `//#` marker)
//! against all names at once, longest name first.

pub mod args;
mod control;
mod misc;
mod output;
mod vars;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::engine::FileRun;
use crate::error::DirectiveError;
use crate::state::Transition;

// ── Descriptors ───────────────────────────────────────────────────────────────

/// Argument grammar of a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    None,
    /// Free text up to end of line, with inline substitution.
    TailText,
    BoolExpr,
    Identifier,
    /// `name [expr]` or `name = expr`.
    NameExpr,
    /// A single expression.
    Expr,
    ExprList,
    OnOff,
}

impl ArgumentKind {
    /// Argument synopsis for reference text.
    pub fn synopsis(self) -> &'static str {
        match self {
            ArgumentKind::None => "",
            ArgumentKind::TailText => "<text>",
            ArgumentKind::BoolExpr => "<condition>",
            ArgumentKind::Identifier => "<name>",
            ArgumentKind::NameExpr => "<name> [= <expr>]",
            ArgumentKind::Expr => "<expr>",
            ArgumentKind::ExprList => "<expr>[, <expr>...]",
            ArgumentKind::OnOff => "on|off",
        }
    }
}

/// Directive handler.  `Invocation::args` is the raw text after the name.
pub type Handler = fn(&mut FileRun<'_>, &Invocation<'_>) -> Result<Transition, DirectiveError>;

pub struct Directive {
    pub name: &'static str,
    pub args: ArgumentKind,
    /// Dispatched in the global phase.
    pub global_phase: bool,
    /// Dispatched in the preprocessing phase.
    pub preprocessing_phase: bool,
    /// Runs even inside an inactive block (structural directives).
    pub always_runs: bool,
    pub deprecated: bool,
    pub summary: &'static str,
    pub handler: Handler,
}

impl std::fmt::Debug for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directive")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("global_phase", &self.global_phase)
            .field("preprocessing_phase", &self.preprocessing_phase)
            .field("always_runs", &self.always_runs)
            .field("deprecated", &self.deprecated)
            .finish()
    }
}

/// One dispatched directive line.
#[derive(Debug)]
pub struct Invocation<'a> {
    pub directive: &'static Directive,
    pub args: &'a str,
    /// 0-based index of the directive's line in the current file.
    pub line: usize,
}

// ── Table ─────────────────────────────────────────────────────────────────────

const fn pre(
    name: &'static str,
    args: ArgumentKind,
    always_runs: bool,
    summary: &'static str,
    handler: Handler,
) -> Directive {
    Directive {
        name,
        args,
        global_phase: false,
        preprocessing_phase: true,
        always_runs,
        deprecated: false,
        summary,
        handler,
    }
}

const fn global(
    name: &'static str,
    args: ArgumentKind,
    always_runs: bool,
    summary: &'static str,
    handler: Handler,
) -> Directive {
    Directive {
        name,
        args,
        global_phase: true,
        preprocessing_phase: false,
        always_runs,
        deprecated: false,
        summary,
        handler,
    }
}

const fn deprecated(d: Directive) -> Directive {
    Directive { deprecated: true, ..d }
}

use ArgumentKind as A;

static DIRECTIVES: &[Directive] = &[
    // conditionals and loops
    pre("if", A::BoolExpr, true, "open a conditional block", control::if_),
    pre("ifdefined", A::Identifier, true, "open a conditional block, true when the variable is defined", control::ifdefined),
    pre("ifndef", A::Identifier, true, "open a conditional block, true when the variable is not defined", control::ifndef),
    pre("else", A::None, true, "invert the innermost conditional", control::else_),
    pre("endif", A::None, true, "close a conditional block", control::endif),
    global("_if", A::BoolExpr, true, "open a global-phase conditional block", control::if_),
    global("_else", A::None, true, "invert the innermost global-phase conditional", control::else_),
    global("_endif", A::None, true, "close a global-phase conditional block", control::endif),
    pre("while", A::BoolExpr, true, "open a loop", control::while_),
    pre("end", A::None, true, "close a loop, iterating again unless broken", control::end),
    pre("break", A::None, false, "leave the innermost loop at its end", control::break_),
    pre("continue", A::None, false, "go back to the start of the innermost loop", control::continue_),
    pre("exit", A::None, false, "stop reading the current file", control::exit),
    pre("exitif", A::BoolExpr, false, "stop reading the current file when the condition holds", control::exitif),
    // variables
    pre("define", A::NameExpr, false, "set a global variable (default true)", vars::define),
    pre("definel", A::NameExpr, false, "set a local variable (default true)", vars::definel),
    pre("undef", A::Identifier, false, "remove a local, else a global variable", vars::undef),
    pre("local", A::NameExpr, false, "set a local variable", vars::local),
    global("global", A::NameExpr, false, "set a global variable in the global phase", vars::global),
    // files
    global("excludeif", A::BoolExpr, false, "skip this file when the condition holds after the global phase", misc::excludeif),
    pre("include", A::Expr, false, "process another file in place", misc::include),
    pre("action", A::ExprList, false, "pass values to the extension's action hook", misc::action),
    // output
    pre("flush", A::None, false, "write the buffered output now", output::flush),
    pre("noautoflush", A::None, false, "do not write the output at end of file", output::noautoflush),
    pre("autoflush", A::OnOff, false, "switch the end-of-file write on or off", output::autoflush),
    pre("prefix+", A::None, false, "send output to the prefix buffer", output::prefix_on),
    pre("prefix-", A::None, false, "send output back to the normal buffer", output::prefix_off),
    pre("postfix+", A::None, false, "send output to the postfix buffer", output::postfix_on),
    pre("postfix-", A::None, false, "send output back to the normal buffer", output::postfix_off),
    pre("-", A::None, false, "suspend text output", output::suspend),
    pre("+", A::None, false, "resume text output", output::resume),
    pre("//", A::None, false, "comment out the next output line", output::comment_next),
    pre("outdir", A::Expr, false, "set the destination directory", output::outdir),
    pre("outname", A::Expr, false, "set the destination file name", output::outname),
    pre("outenabled", A::BoolExpr, false, "enable or disable writing the destination", output::outenabled),
    // messages
    pre("echo", A::TailText, false, "log an informational message", misc::echo),
    pre("msg", A::TailText, false, "log an informational message", misc::echo),
    pre("warning", A::TailText, false, "log a warning", misc::warning),
    pre("error", A::TailText, false, "fail with a message, stopping the run", misc::error),
    pre("abort", A::TailText, false, "stop the run after writing buffered output", misc::abort),
    deprecated(pre("assert", A::TailText, false, "same as echo", misc::echo)),
];

// ── Registry ──────────────────────────────────────────────────────────────────

/// Name matcher over a directive table.
pub struct Registry {
    directives: &'static [Directive],
    matcher: AhoCorasick,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("directives", &self.directives.len())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Registry {
    pub fn new() -> Self {
        Self::with_directives(DIRECTIVES)
    }

    pub fn with_directives(directives: &'static [Directive]) -> Self {
        let matcher = AhoCorasickBuilder::new()
            .anchored(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(directives.iter().map(|d| d.name));
        Registry { directives, matcher }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static Directive> {
        self.directives.iter()
    }

    pub fn get(&self, name: &str) -> Option<&'static Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    /// Match the start of `text` (the part after `//#`) against every
    /// directive name.  Returns the directive and its raw argument text.
    ///
    /// A name ending in a letter must not run into further identifier
    /// characters, so `ifdefinedX` is not `ifdefined` and `endif` is never
    /// read as `end`.
    pub fn lookup<'t>(&self, text: &'t str) -> Option<(&'static Directive, &'t str)> {
        let m = self.matcher.find(text)?;
        let directive = &self.directives[m.pattern()];
        let rest = &text[m.end()..];
        let ends_in_letter = directive
            .name
            .chars()
            .last()
            .is_some_and(|c| c.is_alphabetic());
        if ends_in_letter && rest.chars().next().is_some_and(is_ident_char) {
            return None;
        }
        Some((directive, rest))
    }

    /// Reference text listing every directive.
    pub fn reference(&self) -> String {
        let mut rows: Vec<(String, &Directive)> = self
            .directives
            .iter()
            .map(|d| {
                let synopsis = d.args.synopsis();
                let usage = if synopsis.is_empty() {
                    format!("//#{}", d.name)
                } else {
                    format!("//#{} {}", d.name, synopsis)
                };
                (usage, d)
            })
            .collect();
        rows.sort_by(|a, b| a.1.name.cmp(b.1.name));
        let width = rows.iter().map(|(u, _)| u.len()).max().unwrap_or(0);
        let mut out = String::new();
        for (usage, d) in rows {
            out.push_str(&format!("{usage:<width$}  {}", d.summary));
            if d.global_phase {
                out.push_str(" [global phase]");
            }
            if d.deprecated {
                out.push_str(" [deprecated]");
            }
            out.push('\n');
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_are_unique() {
        let mut seen = HashSet::new();
        for d in DIRECTIVES {
            assert!(seen.insert(d.name), "duplicate directive {}", d.name);
        }
    }

    #[test]
    fn longest_name_wins() {
        let reg = Registry::new();
        let (d, rest) = reg.lookup("ifdefined FOO").unwrap();
        assert_eq!(d.name, "ifdefined");
        assert_eq!(rest, " FOO");
        assert_eq!(reg.lookup("endif").unwrap().0.name, "endif");
        assert_eq!(reg.lookup("end").unwrap().0.name, "end");
        assert_eq!(reg.lookup("exitif x").unwrap().0.name, "exitif");
        assert_eq!(reg.lookup("definel X 1").unwrap().0.name, "definel");
        assert_eq!(reg.lookup("_endif").unwrap().0.name, "_endif");
    }

    #[test]
    fn names_need_a_boundary() {
        let reg = Registry::new();
        assert!(reg.lookup("ifx").is_none());
        assert!(reg.lookup("endless").is_none());
        assert!(reg.lookup("nothing").is_none());
        let (d, rest) = reg.lookup("if(x)").unwrap();
        assert_eq!((d.name, rest), ("if", "(x)"));
    }

    #[test]
    fn punctuation_names() {
        let reg = Registry::new();
        assert_eq!(reg.lookup("prefix+").unwrap().0.name, "prefix+");
        assert_eq!(reg.lookup("postfix-").unwrap().0.name, "postfix-");
        assert_eq!(reg.lookup("-").unwrap().0.name, "-");
        assert_eq!(reg.lookup("+").unwrap().0.name, "+");
        assert_eq!(reg.lookup("//").unwrap().0.name, "//");
    }

    #[test]
    fn phase_flags() {
        let reg = Registry::new();
        let g = reg.get("global").unwrap();
        assert!(g.global_phase && !g.preprocessing_phase);
        let i = reg.get("if").unwrap();
        assert!(i.always_runs && i.preprocessing_phase && !i.global_phase);
        assert!(!reg.get("define").unwrap().always_runs);
        assert!(reg.get("assert").unwrap().deprecated);
    }

    #[test]
    fn reference_lists_everything() {
        let text = Registry::new().reference();
        assert_eq!(text.lines().count(), DIRECTIVES.len());
        assert!(text.contains("//#define <name> [= <expr>]"));
        assert!(text.contains("[deprecated]"));
    }
}
