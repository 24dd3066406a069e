//! Preprocessing state machine.
//!
//! Holds the include stack (open files and their line cursors), the
//! conditional and loop stacks, and the flags that gate execution.  Loops
//! iterate by rewinding the include frame's cursor to the `while` line
//! ([`Transition::RewindToLoopStart`]); there is no host loop.

use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::context::Lines;
use crate::error::{DirectiveError, FilePosition};

bitflags! {
    /// Execution gates and output switches.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct StateFlags: u8 {
        /// The innermost executed conditional is false.
        const CONDITION_FALSE = 1 << 0;
        /// The innermost executed loop was broken or its condition is false.
        const BREAK_LOOP = 1 << 1;
        /// Stop the whole run after flushing.
        const ABORT_PROCESSING = 1 << 2;
        /// Text lines are not emitted (`//#-`).
        const OUTPUT_SUSPENDED = 1 << 3;
        /// Prefix the next emitted text line with `// `.
        const COMMENT_NEXT_LINE = 1 << 4;
        /// Skip the end-of-file flush.
        const NO_AUTO_FLUSH = 1 << 5;
    }
}

/// What the line driver does after a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Continue,
    /// Move the current file's cursor back to a loop's `while` line.
    RewindToLoopStart { line: usize },
    /// Stop reading the current file.
    ExitFile,
}

/// One open file.
#[derive(Debug, Clone)]
pub struct IncludeFrame {
    pub path: PathBuf,
    pub lines: Lines,
    /// Index of the next line to read.
    pub cursor: usize,
    /// 1-based number of the line read last.
    pub line: usize,
}

/// A conditional or loop frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFrame {
    /// Index into the include stack of the file that opened the frame.
    pub owner: usize,
    /// 0-based index of the opening directive's line.
    pub line: usize,
    /// Whether the opening directive was executed.
    pub active: bool,
    /// Conditional-stack depth when a loop frame was pushed.
    pub if_depth: usize,
}

/// A deferred `//#excludeif` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeIfInfo {
    pub condition: String,
    pub file: PathBuf,
    /// 1-based line number.
    pub line: usize,
}

#[derive(Debug, Default)]
pub struct PreprocessingState {
    pub flags: StateFlags,
    includes: Vec<IncludeFrame>,
    ifs: Vec<BlockFrame>,
    loops: Vec<BlockFrame>,
}

impl PreprocessingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether ordinary directives and text lines execute.
    pub fn is_executable(&self) -> bool {
        self.ifs.last().map_or(true, |f| f.active)
            && self.loops.last().map_or(true, |f| f.active)
            && !self
                .flags
                .intersects(StateFlags::CONDITION_FALSE | StateFlags::BREAK_LOOP)
    }

    pub fn if_depth(&self) -> usize {
        self.ifs.len()
    }

    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    fn owner(&self) -> usize {
        self.includes.len().saturating_sub(1)
    }

    fn frame(&self, line: usize, active: bool) -> BlockFrame {
        BlockFrame {
            owner: self.owner(),
            line,
            active,
            if_depth: self.ifs.len(),
        }
    }

    // ── Conditionals ──────────────────────────────────────────────────────────

    /// Open a conditional.  `condition` is `None` when the block is entered
    /// while not executable; nothing was evaluated then.
    pub fn open_if(&mut self, line: usize, condition: Option<bool>) {
        let frame = self.frame(line, condition.is_some());
        self.ifs.push(frame);
        if condition == Some(false) {
            self.flags.insert(StateFlags::CONDITION_FALSE);
        }
    }

    pub fn toggle_else(&mut self, name: &str) -> Result<(), DirectiveError> {
        if self.innermost_if(name)? {
            self.flags.toggle(StateFlags::CONDITION_FALSE);
        }
        Ok(())
    }

    pub fn close_if(&mut self, name: &str) -> Result<(), DirectiveError> {
        let active = self.innermost_if(name)?;
        if active && !self.is_executable() {
            self.flags.remove(StateFlags::CONDITION_FALSE);
        }
        self.ifs.pop();
        Ok(())
    }

    /// Whether the innermost conditional was entered, provided `name` may
    /// touch it from the current file and loop.
    fn innermost_if(&self, name: &str) -> Result<bool, DirectiveError> {
        let Some(top) = self.ifs.last() else {
            return Err(DirectiveError::structure(format!("{name} without matching if")));
        };
        if top.owner != self.owner() {
            return Err(DirectiveError::structure(format!(
                "{name} belongs to a conditional opened in another file"
            )));
        }
        if self
            .loops
            .last()
            .is_some_and(|l| l.if_depth >= self.ifs.len())
        {
            return Err(DirectiveError::structure(format!(
                "{name} belongs to a conditional opened outside the enclosing loop"
            )));
        }
        Ok(top.active)
    }

    // ── Loops ─────────────────────────────────────────────────────────────────

    /// Open a loop at `line`.  `condition` as for [`open_if`](Self::open_if).
    pub fn open_loop(&mut self, line: usize, condition: Option<bool>) {
        let frame = self.frame(line, condition.is_some());
        self.loops.push(frame);
        if condition == Some(false) {
            self.flags.insert(StateFlags::BREAK_LOOP);
        }
    }

    /// Close the innermost loop and decide whether to iterate again.
    pub fn close_loop(&mut self) -> Result<Transition, DirectiveError> {
        let frame = self.pop_loop("end")?;
        if !frame.active {
            return Ok(Transition::Continue);
        }
        if self.flags.contains(StateFlags::BREAK_LOOP) {
            self.flags.remove(StateFlags::BREAK_LOOP);
            return Ok(Transition::Continue);
        }
        Ok(Transition::RewindToLoopStart { line: frame.line })
    }

    pub fn break_loop(&mut self) -> Result<(), DirectiveError> {
        if self.loops.is_empty() {
            return Err(DirectiveError::structure("break outside of a loop"));
        }
        self.flags.insert(StateFlags::BREAK_LOOP);
        Ok(())
    }

    /// Drop conditionals opened inside the innermost loop, close it and
    /// go back to its start.
    pub fn continue_loop(&mut self) -> Result<Transition, DirectiveError> {
        let depth = match self.loops.last() {
            Some(frame) => frame.if_depth,
            None => return Err(DirectiveError::structure("continue outside of a loop")),
        };
        self.ifs.truncate(depth);
        let frame = self.pop_loop("continue")?;
        Ok(Transition::RewindToLoopStart { line: frame.line })
    }

    fn pop_loop(&mut self, name: &str) -> Result<BlockFrame, DirectiveError> {
        let Some(top) = self.loops.last() else {
            return Err(DirectiveError::structure(format!("{name} without matching while")));
        };
        if top.owner != self.owner() {
            return Err(DirectiveError::structure(format!(
                "{name} closes a loop opened in another file"
            )));
        }
        if self.ifs.len() > top.if_depth {
            return Err(DirectiveError::structure(format!(
                "{name} inside a conditional that is still open"
            )));
        }
        self.loops
            .pop()
            .ok_or_else(|| DirectiveError::structure(format!("{name} without matching while")))
    }

    // ── Include stack ─────────────────────────────────────────────────────────

    pub fn push_include(&mut self, path: PathBuf, lines: Lines) {
        self.includes.push(IncludeFrame {
            path,
            lines,
            cursor: 0,
            line: 0,
        });
    }

    pub fn include_depth(&self) -> usize {
        self.includes.len()
    }

    pub fn current(&self) -> Option<&IncludeFrame> {
        self.includes.last()
    }

    /// Whether `path` is already open (include recursion).
    pub fn is_open(&self, path: &Path) -> bool {
        self.includes.iter().any(|f| f.path == path)
    }

    /// Read the next line of the innermost file.  `None` when it is
    /// exhausted; the caller then closes it with [`pop_include`](Self::pop_include).
    pub fn next_line(&mut self) -> Option<String> {
        let frame = self.includes.last_mut()?;
        let text = frame.lines.get(frame.cursor)?.clone();
        frame.cursor += 1;
        frame.line = frame.cursor;
        Some(text)
    }

    /// Apply a directive's transition to the innermost file.
    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Continue => {}
            Transition::RewindToLoopStart { line } => {
                if let Some(frame) = self.includes.last_mut() {
                    frame.cursor = line;
                }
            }
            Transition::ExitFile => {
                let owner = self.owner();
                self.ifs.retain(|f| f.owner < owner);
                self.loops.retain(|f| f.owner < owner);
                if let Some(frame) = self.includes.last_mut() {
                    frame.cursor = frame.lines.len();
                }
            }
        }
    }

    /// Close the innermost file.  Fails when it left a conditional or loop
    /// open; the error cites the innermost unclosed directive.
    pub fn pop_include(&mut self) -> Result<(), (DirectiveError, Vec<FilePosition>)> {
        let owner = self.owner();
        let unclosed_if = self.ifs.last().filter(|f| f.owner == owner);
        let unclosed_loop = self.loops.last().filter(|f| f.owner == owner);
        let unclosed = match (unclosed_if, unclosed_loop) {
            (Some(i), Some(l)) if l.line > i.line => Some(("while", l.line)),
            (Some(i), _) => Some(("if", i.line)),
            (None, Some(l)) => Some(("while", l.line)),
            (None, None) => None,
        };
        if let Some((kind, line)) = unclosed {
            let mut stack = self.include_stack();
            if let Some(last) = stack.last_mut() {
                last.line = line + 1;
            }
            return Err((
                DirectiveError::structure(format!("unclosed {kind} at end of file")),
                stack,
            ));
        }
        self.includes.pop();
        Ok(())
    }

    /// Positions of every open file, outermost first.
    pub fn include_stack(&self) -> Vec<FilePosition> {
        self.includes
            .iter()
            .map(|f| FilePosition {
                file: f.path.clone(),
                line: f.line,
            })
            .collect()
    }

    /// Raw text of the line read last, for diagnostics.
    pub fn current_text(&self) -> Option<String> {
        let frame = self.includes.last()?;
        frame.lines.get(frame.line.checked_sub(1)?).cloned()
    }

    /// 0-based index of the line read last.
    pub fn current_index(&self) -> usize {
        self.includes.last().map_or(0, |f| f.line.saturating_sub(1))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn open(state: &mut PreprocessingState, lines: &[&str]) {
        state.push_include(
            PathBuf::from("main.txt"),
            Rc::new(lines.iter().map(|l| l.to_string()).collect()),
        );
    }

    /// Mirror of the engine's conditional handling for `if`.
    fn if_(state: &mut PreprocessingState, line: usize, cond: bool) {
        let c = state.is_executable().then_some(cond);
        state.open_if(line, c);
    }

    #[test]
    fn nested_conditionals_gate() {
        let mut s = PreprocessingState::new();
        assert!(s.is_executable());
        if_(&mut s, 0, true);
        assert!(s.is_executable());
        if_(&mut s, 1, false);
        assert!(!s.is_executable());
        if_(&mut s, 2, true); // inside a false block: inactive
        assert!(!s.is_executable());
        s.toggle_else("else").unwrap(); // inactive frame: no toggle
        assert!(!s.is_executable());
        s.close_if("endif").unwrap();
        assert!(!s.is_executable());
        s.toggle_else("else").unwrap();
        assert!(s.is_executable());
        s.close_if("endif").unwrap();
        assert!(s.is_executable());
        s.close_if("endif").unwrap();
        assert_eq!(s.if_depth(), 0);
    }

    #[test]
    fn endif_restores_after_false_block() {
        let mut s = PreprocessingState::new();
        if_(&mut s, 0, false);
        assert!(!s.is_executable());
        s.close_if("endif").unwrap();
        assert!(s.is_executable());
        assert!(!s.flags.contains(StateFlags::CONDITION_FALSE));
    }

    #[test]
    fn unmatched_closers() {
        let mut s = PreprocessingState::new();
        assert!(matches!(s.close_if("endif"), Err(DirectiveError::Structure(_))));
        assert!(matches!(s.toggle_else("else"), Err(DirectiveError::Structure(_))));
        assert!(matches!(s.close_loop(), Err(DirectiveError::Structure(_))));
        assert!(matches!(s.break_loop(), Err(DirectiveError::Structure(_))));
        assert!(matches!(s.continue_loop(), Err(DirectiveError::Structure(_))));
    }

    #[test]
    fn loop_rewinds_until_broken() {
        let mut s = PreprocessingState::new();
        s.open_loop(4, Some(true));
        assert_eq!(s.close_loop().unwrap(), Transition::RewindToLoopStart { line: 4 });
        s.open_loop(4, Some(true));
        s.break_loop().unwrap();
        assert!(!s.is_executable());
        assert_eq!(s.close_loop().unwrap(), Transition::Continue);
        assert!(s.is_executable());
        s.open_loop(4, Some(false));
        assert!(!s.is_executable());
        assert_eq!(s.close_loop().unwrap(), Transition::Continue);
        assert!(s.is_executable());
    }

    #[test]
    fn inactive_loop_never_rewinds() {
        let mut s = PreprocessingState::new();
        if_(&mut s, 0, false);
        s.open_loop(1, None);
        assert_eq!(s.close_loop().unwrap(), Transition::Continue);
        s.close_if("endif").unwrap();
        assert!(s.is_executable());
    }

    #[test]
    fn continue_drops_inner_conditionals() {
        let mut s = PreprocessingState::new();
        s.open_loop(2, Some(true));
        if_(&mut s, 3, true);
        assert_eq!(
            s.continue_loop().unwrap(),
            Transition::RewindToLoopStart { line: 2 }
        );
        assert_eq!(s.if_depth(), 0);
        assert_eq!(s.loop_depth(), 0);
    }

    #[test]
    fn crossed_blocks_are_structural_errors() {
        let mut s = PreprocessingState::new();
        if_(&mut s, 0, true);
        s.open_loop(1, Some(true));
        assert!(matches!(s.close_if("endif"), Err(DirectiveError::Structure(_))));

        let mut s = PreprocessingState::new();
        s.open_loop(0, Some(true));
        if_(&mut s, 1, true);
        assert!(matches!(s.close_loop(), Err(DirectiveError::Structure(_))));
    }

    #[test]
    fn else_cannot_reach_across_a_loop_or_include() {
        let mut s = PreprocessingState::new();
        if_(&mut s, 0, true);
        s.open_loop(1, Some(true));
        assert!(matches!(s.toggle_else("else"), Err(DirectiveError::Structure(_))));
        assert!(s.is_executable());

        let mut s = PreprocessingState::new();
        open(&mut s, &["//#if false", "//#include \"b\""]);
        s.next_line();
        if_(&mut s, 0, false);
        s.next_line();
        s.push_include(PathBuf::from("b.txt"), Rc::new(vec!["//#else".into()]));
        s.next_line();
        assert!(matches!(s.toggle_else("else"), Err(DirectiveError::Structure(_))));
        assert!(s.pop_include().is_ok());
        assert!(s.toggle_else("else").is_ok());
        assert!(s.is_executable());
    }

    #[test]
    fn rewind_moves_cursor() {
        let mut s = PreprocessingState::new();
        open(&mut s, &["a", "b", "c"]);
        assert_eq!(s.next_line().as_deref(), Some("a"));
        assert_eq!(s.next_line().as_deref(), Some("b"));
        assert_eq!(s.current_text().as_deref(), Some("b"));
        s.apply(Transition::RewindToLoopStart { line: 0 });
        assert_eq!(s.next_line().as_deref(), Some("a"));
        s.apply(Transition::ExitFile);
        assert_eq!(s.next_line(), None);
        assert!(s.pop_include().is_ok());
        assert_eq!(s.include_depth(), 0);
    }

    #[test]
    fn unclosed_block_cites_its_line() {
        let mut s = PreprocessingState::new();
        open(&mut s, &["x", "//#if true", "y"]);
        s.next_line();
        s.next_line();
        if_(&mut s, 1, true);
        s.next_line();
        let (err, stack) = s.pop_include().unwrap_err();
        assert!(matches!(err, DirectiveError::Structure(_)));
        assert_eq!(stack.last().map(|p| p.line), Some(2));
    }

    #[test]
    fn blocks_cannot_be_closed_from_an_include() {
        let mut s = PreprocessingState::new();
        open(&mut s, &["//#if true", "//#include \"b\""]);
        s.next_line();
        if_(&mut s, 0, true);
        s.next_line();
        s.push_include(PathBuf::from("b.txt"), Rc::new(vec!["//#endif".into()]));
        s.next_line();
        assert!(matches!(s.close_if("endif"), Err(DirectiveError::Structure(_))));
        assert!(s.pop_include().is_ok());
        assert!(s.close_if("endif").is_ok());
    }

    #[test]
    fn nested_include_positions() {
        let mut s = PreprocessingState::new();
        open(&mut s, &["//#include \"b\""]);
        s.next_line();
        s.push_include(PathBuf::from("b.txt"), Rc::new(vec!["one".into(), "two".into()]));
        s.next_line();
        s.next_line();
        let stack = s.include_stack();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].line, 1);
        assert_eq!(stack[1].to_string(), "b.txt:2");
        assert!(s.is_open(Path::new("main.txt")));
    }
}
