//! Two-phase preprocessing pipeline.
//!
//! A run first scans every processable file in the **global phase**: only
//! global-phase directives (`//#global`, `//#_if`, `//#excludeif`, ...)
//! execute and nothing is emitted.  The collected `//#excludeif`
//! predicates are then evaluated against the completed global scope.  The
//! **preprocessing phase** reopens each remaining file and runs the full
//! directive set, substituting `/*$expr$*/` and buffering output until a
//! flush hands it to the destination.
//!
//! Each file is processed by a [`FileRun`] holding a fork of the base
//! [`VariableContext`] and its own [`PreprocessingState`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, trace, warn};

use crate::config::Config;
use crate::context::{Lines, VariableContext};
use crate::directive::{Invocation, Registry};
use crate::error::{DirectiveError, Error, FilePosition, Result};
use crate::expr::{self, Lookup, Value};
use crate::extension::Extension;
use crate::fs::{DiskFs, FileSystem};
use crate::output::{materialize, Materialized, OutputBuffers};
use crate::sources::{self, SourceFile};
use crate::special::{EngineVariables, EnvironmentVariables, SpecialVariables};
use crate::state::{ExcludeIfInfo, PreprocessingState, StateFlags, Transition};

/// Marker that cuts the rest of a text line.
const CUT_MARKER: &str = "/*-*/";
const SUBST_OPEN: &str = "/*$";
const SUBST_CLOSE: &str = "$*/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Global,
    Preprocessing,
}

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
}

/// A message produced by `//#echo`, `//#warning` or `//#abort`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
    pub position: FilePosition,
}

/// What a run did.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    /// Materialized (source, destination) pairs.  Under dry run these are
    /// the destinations that would have been written.
    pub written: Vec<(PathBuf, PathBuf)>,
    /// Destinations skipped because their content was already current.
    pub unchanged: Vec<PathBuf>,
    /// Copy-only (source, destination) pairs.
    pub copied: Vec<(PathBuf, PathBuf)>,
    /// Sources skipped by `//#excludeif`.
    pub excluded: Vec<PathBuf>,
    pub messages: Vec<Message>,
    /// Files that failed; each stopped only its own file.
    pub errors: Vec<Error>,
    /// The run was stopped by `//#abort`.
    pub aborted: bool,
}

impl RunReport {
    /// Whether every file went through without an error.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record a per-file failure, or hand back one that stops the run.
    fn fail(&mut self, e: Error) -> Result<()> {
        if e.aborts_run() {
            return Err(e);
        }
        error!(target: "dirpp::engine", "{}", e.report());
        self.errors.push(e);
        Ok(())
    }

    fn record(&mut self, source: &Path, destination: &Path, outcome: Materialized) {
        match outcome {
            Materialized::Written | Materialized::DryRun => {
                let pair = (source.to_path_buf(), destination.to_path_buf());
                if !self.written.contains(&pair) {
                    self.written.push(pair);
                }
            }
            Materialized::Unchanged => {
                if !self.unchanged.iter().any(|p| p == destination) {
                    self.unchanged.push(destination.to_path_buf());
                }
            }
        }
    }
}

// ── Preprocessor ──────────────────────────────────────────────────────────────

pub struct Preprocessor {
    config: Config,
    fs: Rc<dyn FileSystem>,
    registry: Registry,
    base: VariableContext,
}

impl Preprocessor {
    /// A preprocessor reading and writing the real file system.
    pub fn new(config: Config) -> Self {
        Self::with_fs(config, Rc::new(DiskFs))
    }

    pub fn with_fs(config: Config, fs: Rc<dyn FileSystem>) -> Self {
        let mut base = VariableContext::new();
        base.register(Rc::new(EnvironmentVariables::new()));
        base.register(Rc::new(EngineVariables));
        base.set_unknown_as_false(config.unknown_as_false);
        base.state.started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        for (name, value) in &config.globals {
            if let Err(e) = base.set_global(name, Value::parse_literal(value)) {
                warn!(target: "dirpp::engine", "ignoring predefined {name}: {e}");
            }
        }
        Preprocessor {
            config,
            fs,
            registry: Registry::new(),
            base,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The base context every file run forks from.
    pub fn context(&self) -> &VariableContext {
        &self.base
    }

    pub fn context_mut(&mut self) -> &mut VariableContext {
        &mut self.base
    }

    /// Register an additional special-variable provider.  The built-in
    /// `env.` and engine providers keep precedence on names they claim.
    pub fn register(&mut self, provider: Rc<dyn SpecialVariables>) {
        self.base.register(provider);
    }

    pub fn set_extension(&mut self, extension: Rc<RefCell<dyn Extension>>) {
        self.base.set_extension(extension);
    }

    /// Select files as configured and run both phases over them.
    pub fn run_config(&self) -> Result<RunReport> {
        let files = sources::collect(&self.config, &*self.fs)?;
        self.run(&files)
    }

    /// Run both phases over `files`.
    ///
    /// A failure in one file is recorded in [`RunReport::errors`] and the
    /// run moves on to the next file; only errors that
    /// [abort the run](Error::aborts_run) are returned.
    pub fn run(&self, files: &[SourceFile]) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut failed = HashSet::new();

        let mut excludes = Vec::new();
        for file in files.iter().filter(|f| !f.copy_only || f.scan) {
            let scanned = self.load_root(&file.source).and_then(|lines| {
                let mut run = FileRun::new(self, Phase::Global, file, &mut report, Sink::Materialize);
                run.process(lines)?;
                Ok(std::mem::take(&mut run.excludes))
            });
            match scanned {
                Ok(mut found) => excludes.append(&mut found),
                Err(e) => {
                    report.fail(e)?;
                    failed.insert(file.source.clone());
                }
            }
        }
        let mut excluded = HashSet::new();
        for info in &excludes {
            match self.exclude_holds(info) {
                Ok(true) => {
                    excluded.insert(info.file.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    report.fail(e)?;
                    failed.insert(info.file.clone());
                }
            }
        }

        for file in files {
            if report.aborted {
                break;
            }
            if failed.contains(&file.source) {
                continue;
            }
            if excluded.contains(&file.source) {
                debug!(target: "dirpp::engine", source = %file.source.display(), "excluded");
                report.excluded.push(file.source.clone());
                continue;
            }
            if file.copy_only {
                if let Err(e) = self.copy(file, &mut report) {
                    report.fail(e)?;
                }
                continue;
            }
            let processed = self.load_root(&file.source).and_then(|lines| {
                let mut run = FileRun::new(self, Phase::Preprocessing, file, &mut report, Sink::Materialize);
                run.process(lines)
            });
            if let Err(e) = processed {
                report.fail(e)?;
            }
        }
        Ok(report)
    }

    /// Run both phases over one in-memory text and return the merged
    /// output.  An `//#excludeif` that holds yields empty output.
    pub fn process_str(&self, name: &str, text: &str) -> Result<String> {
        let path = PathBuf::from(name);
        let lines: Lines = Rc::new(split_lines(text));
        let file = SourceFile {
            source: path.clone(),
            destination: path,
            copy_only: false,
            scan: false,
        };
        let mut report = RunReport::default();

        let mut run = FileRun::new(self, Phase::Global, &file, &mut report, Sink::Materialize);
        run.process(Rc::clone(&lines))?;
        let excludes = std::mem::take(&mut run.excludes);
        for info in &excludes {
            if self.exclude_holds(info)? {
                return Ok(String::new());
            }
        }

        let mut run = FileRun::new(
            self,
            Phase::Preprocessing,
            &file,
            &mut report,
            Sink::Capture(String::new()),
        );
        run.process(lines)?;
        Ok(match run.sink {
            Sink::Capture(text) => text,
            Sink::Materialize => String::new(),
        })
    }

    /// Whether an `//#excludeif` predicate holds against the completed
    /// global scope.
    fn exclude_holds(&self, info: &ExcludeIfInfo) -> Result<bool> {
        let mut ctx = self.base.fork();
        ctx.state.source = info.file.clone();
        ctx.state.file = info.file.clone();
        ctx.state.line = info.line;
        expr::eval_bool(&info.condition, &mut ctx, Lookup::Enforced).map_err(|e| {
            DirectiveError::from(e).at(
                Some(format!("//#excludeif {}", info.condition)),
                vec![position(&info.file, info.line)],
            )
        })
    }

    fn copy(&self, file: &SourceFile, report: &mut RunReport) -> Result<()> {
        let bytes = self
            .fs
            .read(&file.source)
            .map_err(|e| io_error(&file.source, "cannot read", e))?;
        let outcome = materialize(
            &*self.fs,
            &file.destination,
            &bytes,
            self.config.only_if_changed,
            self.config.dry_run,
        )
        .map_err(|e| e.at(None, vec![position(&file.source, 0)]))?;
        match outcome {
            Materialized::Unchanged => report.unchanged.push(file.destination.clone()),
            _ => report
                .copied
                .push((file.source.clone(), file.destination.clone())),
        }
        Ok(())
    }

    fn load_root(&self, path: &Path) -> Result<Lines> {
        load_lines(&self.base, &*self.fs, path).map_err(|e| e.at(None, vec![position(path, 0)]))
    }
}

fn position(path: &Path, line: usize) -> FilePosition {
    FilePosition {
        file: path.to_path_buf(),
        line,
    }
}

fn io_error(path: &Path, what: &str, e: std::io::Error) -> Error {
    DirectiveError::io(format!("{what} {}", path.display()), e).at(None, vec![position(path, 0)])
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_owned).collect()
}

/// Read `path` through the shared resource table.
fn load_lines(ctx: &VariableContext, fs: &dyn FileSystem, path: &Path) -> std::result::Result<Lines, DirectiveError> {
    if let Some(lines) = ctx.cached(path) {
        return Ok(lines);
    }
    let text = fs
        .read_to_string(path)
        .map_err(|e| DirectiveError::io(format!("cannot read {}", path.display()), e))?;
    let lines: Lines = Rc::new(split_lines(&text));
    ctx.cache(path.to_path_buf(), Rc::clone(&lines));
    Ok(lines)
}

// ── File run ──────────────────────────────────────────────────────────────────

enum Sink {
    /// Write flushed text to the destination.
    Materialize,
    /// Collect flushed text in memory.
    Capture(String),
}

/// Processing of one root file in one phase.
pub struct FileRun<'a> {
    pre: &'a Preprocessor,
    report: &'a mut RunReport,
    phase: Phase,
    pub(crate) ctx: VariableContext,
    pub(crate) state: PreprocessingState,
    pub(crate) output: OutputBuffers,
    /// `//#outenabled`: whether flushes reach the destination.
    pub(crate) out_enabled: bool,
    pub(crate) excludes: Vec<ExcludeIfInfo>,
    /// Destination and text of earlier flushes; later flushes append.
    flushed: Option<(PathBuf, String)>,
    sink: Sink,
}

impl<'a> FileRun<'a> {
    fn new(
        pre: &'a Preprocessor,
        phase: Phase,
        file: &SourceFile,
        report: &'a mut RunReport,
        sink: Sink,
    ) -> Self {
        let mut ctx = pre.base.fork();
        ctx.state.source = file.source.clone();
        ctx.state.destination = file.destination.clone();
        ctx.state.file = file.source.clone();
        FileRun {
            pre,
            report,
            phase,
            ctx,
            state: PreprocessingState::new(),
            output: OutputBuffers::new(),
            out_enabled: true,
            excludes: Vec::new(),
            flushed: None,
            sink,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Process the root file from its first line, then flush.
    fn process(&mut self, lines: Lines) -> Result<()> {
        let source = self.ctx.state.source.clone();
        debug!(target: "dirpp::engine", phase = ?self.phase, source = %source.display(), "processing");
        self.state.push_include(source, lines);
        self.drive()?;

        if self.phase == Phase::Global {
            return Ok(());
        }
        let aborted = self.state.flags.contains(StateFlags::ABORT_PROCESSING);
        if aborted {
            self.report.aborted = true;
        }
        let pending = !self.output.is_empty() || self.flushed.is_none();
        if pending && (aborted || !self.state.flags.contains(StateFlags::NO_AUTO_FLUSH)) {
            self.flush()
                .map_err(|e| e.at(None, vec![position(&self.ctx.state.file, self.ctx.state.line)]))?;
        }
        Ok(())
    }

    /// The line loop: read, dispatch, apply the transition.
    fn drive(&mut self) -> Result<()> {
        loop {
            if self.state.flags.contains(StateFlags::ABORT_PROCESSING) {
                return Ok(());
            }
            let Some(line) = self.state.next_line() else {
                if let Err((err, stack)) = self.state.pop_include() {
                    let text = self.state.current().and_then(|f| {
                        let index = stack.last()?.line.checked_sub(1)?;
                        f.lines.get(index).cloned()
                    });
                    return Err(err.at(text, stack));
                }
                if self.state.include_depth() == 0 {
                    return Ok(());
                }
                continue;
            };
            if let Some(frame) = self.state.current() {
                if self.ctx.state.file != frame.path {
                    self.ctx.state.file = frame.path.clone();
                }
                self.ctx.state.line = frame.line;
            }
            let transition = self
                .process_line(&line)
                .map_err(|e| e.at(Some(line.clone()), self.state.include_stack()))?;
            self.state.apply(transition);
        }
    }

    fn process_line(&mut self, line: &str) -> std::result::Result<Transition, DirectiveError> {
        let head = if self.pre.config.allow_whitespace {
            line.trim_start()
        } else {
            line
        };
        if let Some(rest) = head.strip_prefix("//#") {
            return self.dispatch(rest);
        }
        if self.phase == Phase::Global || !self.state.is_executable() {
            return Ok(Transition::Continue);
        }
        if let Some(rest) = head.strip_prefix("//$$") {
            self.emit(rest.to_owned());
        } else if let Some(rest) = head.strip_prefix("//$") {
            let text = self.substitute(rest)?;
            self.emit(text);
        } else {
            let text = match line.find(CUT_MARKER) {
                Some(at) if line[..at].trim().is_empty() => return Ok(Transition::Continue),
                Some(at) => &line[..at],
                None => line,
            };
            let text = self.substitute(text)?;
            self.emit(text);
        }
        Ok(Transition::Continue)
    }

    fn dispatch(&mut self, text: &str) -> std::result::Result<Transition, DirectiveError> {
        let Some((directive, args)) = self.pre.registry.lookup(text) else {
            if self.phase == Phase::Preprocessing && self.state.is_executable() {
                let name = text.split_whitespace().next().unwrap_or_default();
                return Err(DirectiveError::syntax(format!("unknown directive //#{name}")));
            }
            return Ok(Transition::Continue);
        };
        let eligible = match self.phase {
            Phase::Global => directive.global_phase,
            Phase::Preprocessing => directive.preprocessing_phase,
        };
        if !eligible || (!directive.always_runs && !self.state.is_executable()) {
            return Ok(Transition::Continue);
        }
        let line = self.state.current_index();
        if directive.deprecated {
            warn!(
                target: "dirpp::directive",
                file = %self.ctx.state.file.display(),
                line = line + 1,
                "//#{} is deprecated",
                directive.name
            );
        }
        trace!(target: "dirpp::directive", name = directive.name, line = line + 1, "dispatch");
        let inv = Invocation {
            directive,
            args,
            line,
        };
        (directive.handler)(self, &inv)
    }

    fn emit(&mut self, text: String) {
        if self.state.flags.contains(StateFlags::OUTPUT_SUSPENDED) {
            return;
        }
        if self.state.flags.contains(StateFlags::COMMENT_NEXT_LINE) {
            self.state.flags.remove(StateFlags::COMMENT_NEXT_LINE);
            self.output.push_line(format!("// {text}"));
        } else {
            self.output.push_line(text);
        }
    }

    // ── Services for directive handlers ───────────────────────────────────────

    /// Evaluate a directive argument (unknown variables fail).
    pub(crate) fn eval(&mut self, src: &str) -> std::result::Result<Value, DirectiveError> {
        Ok(expr::eval_str(src, &mut self.ctx, Lookup::Enforced)?)
    }

    /// Evaluate a directive condition, which must be boolean.
    pub(crate) fn eval_condition(&mut self, src: &str) -> std::result::Result<bool, DirectiveError> {
        Ok(expr::eval_bool(src, &mut self.ctx, Lookup::Enforced)?)
    }

    /// Replace every `/*$expr$*/` in `text` with the value of `expr`.
    /// An opener without a closer is left as it is.
    pub(crate) fn substitute(&mut self, text: &str) -> std::result::Result<String, DirectiveError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(SUBST_OPEN) {
            let body = &rest[start + SUBST_OPEN.len()..];
            let Some(end) = find_closer(body) else {
                break;
            };
            out.push_str(&rest[..start]);
            let value = expr::eval_str(&body[..end], &mut self.ctx, Lookup::Lenient)?;
            out.push_str(&value.to_string());
            rest = &body[end + SUBST_CLOSE.len()..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Read a file through the include cache.
    pub(crate) fn load(&mut self, path: &Path) -> std::result::Result<Lines, DirectiveError> {
        load_lines(&self.ctx, &*self.pre.fs, path)
    }

    pub(crate) fn message(&mut self, level: MessageLevel, text: String) {
        let position = FilePosition {
            file: self.ctx.state.file.clone(),
            line: self.ctx.state.line,
        };
        self.report.messages.push(Message {
            level,
            text,
            position,
        });
    }

    /// Merge the buffers, strip comments as configured and hand the text
    /// to the sink.  Repeated flushes to one destination accumulate.
    pub(crate) fn flush(&mut self) -> std::result::Result<(), DirectiveError> {
        let pre = self.pre;
        let config = &pre.config;
        let text = config.comments.apply(&self.output.take_merged(config.eol));
        if self.phase == Phase::Global {
            return Ok(());
        }
        match &mut self.sink {
            Sink::Capture(buf) => {
                buf.push_str(&text);
                self.flushed = Some((self.ctx.state.destination.clone(), String::new()));
            }
            Sink::Materialize => {
                if !self.out_enabled {
                    debug!(target: "dirpp::engine", source = %self.ctx.state.source.display(), "output disabled");
                    return Ok(());
                }
                let destination = self.ctx.state.destination.clone();
                let content = match self.flushed.take() {
                    Some((previous, mut acc)) if previous == destination => {
                        acc.push_str(&text);
                        acc
                    }
                    _ => text,
                };
                let outcome = materialize(
                    &*pre.fs,
                    &destination,
                    content.as_bytes(),
                    config.only_if_changed,
                    config.dry_run,
                )?;
                self.report.record(&self.ctx.state.source, &destination, outcome);
                self.flushed = Some((destination, content));
            }
        }
        Ok(())
    }
}

/// Position of the `$*/` ending a substitution body, skipping string
/// literals.  An unbalanced quote falls back to the first closer so the
/// expression reports it.
fn find_closer(body: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if body[i..].starts_with(SUBST_CLOSE) {
            return Some(i);
        }
    }
    body.find(SUBST_CLOSE)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
