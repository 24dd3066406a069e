//! Includes, exclusion, extension actions and messages.

use std::path::PathBuf;

use tracing::{info, warn};

use super::args::{expect_expr, split_expr_list};
use super::Invocation;
use crate::engine::{FileRun, MessageLevel};
use crate::error::{DirectiveError, ExprError};
use crate::expr::Value;
use crate::state::{ExcludeIfInfo, StateFlags, Transition};

pub(super) fn excludeif(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let condition = expect_expr(inv.directive.name, inv.args)?;
    let info = ExcludeIfInfo {
        condition: condition.to_owned(),
        file: run.ctx.state.source.clone(),
        line: inv.line + 1,
    };
    run.excludes.push(info);
    Ok(Transition::Continue)
}

pub(super) fn include(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let value = run.eval(expect_expr(inv.directive.name, inv.args)?)?;
    let target = match value {
        Value::Str(s) => s,
        other => {
            return Err(ExprError::WrongType {
                expected: "string".into(),
                got: other.value_type().name().into(),
            }
            .into())
        }
    };
    let target = PathBuf::from(target);
    let path = match run.state.current().and_then(|f| f.path.parent()) {
        Some(dir) if target.is_relative() => dir.join(&target),
        _ => target,
    };
    if run.state.is_open(&path) {
        return Err(DirectiveError::structure(format!(
            "recursive include of {}",
            path.display()
        )));
    }
    let lines = run.load(&path)?;
    run.state.push_include(path, lines);
    Ok(Transition::Continue)
}

pub(super) fn action(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let mut values = Vec::new();
    for src in split_expr_list(inv.directive.name, inv.args)? {
        values.push(run.eval(src)?);
    }
    let Some(ext) = run.ctx.extension().cloned() else {
        return Err(ExprError::Extension {
            name: "action".into(),
            message: "no extension registered".into(),
        }
        .into());
    };
    let result = ext.borrow_mut().action(&values);
    result.map_err(|message| ExprError::Extension {
        name: "action".into(),
        message,
    })?;
    Ok(Transition::Continue)
}

pub(super) fn echo(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let text = run.substitute(inv.args.trim())?;
    info!(target: "dirpp::echo", "{text}");
    run.message(MessageLevel::Info, text);
    Ok(Transition::Continue)
}

pub(super) fn warning(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let text = run.substitute(inv.args.trim())?;
    warn!(target: "dirpp::echo", "{text}");
    run.message(MessageLevel::Warning, text);
    Ok(Transition::Continue)
}

pub(super) fn error(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let text = run.substitute(inv.args.trim())?;
    let text = if text.is_empty() { "//#error".to_owned() } else { text };
    Err(DirectiveError::User(text))
}

pub(super) fn abort(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let text = run.substitute(inv.args.trim())?;
    if !text.is_empty() {
        warn!(target: "dirpp::echo", "aborting: {text}");
        run.message(MessageLevel::Warning, text);
    }
    run.state.flags.insert(StateFlags::ABORT_PROCESSING);
    Ok(Transition::Continue)
}
