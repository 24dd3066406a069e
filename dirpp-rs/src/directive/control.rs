//! Conditionals, loops and early exit.

use super::args::{expect_expr, expect_none, parse_identifier};
use super::Invocation;
use crate::engine::FileRun;
use crate::error::DirectiveError;
use crate::state::Transition;

/// Evaluate `eval` only when the enclosing block executes.
fn gated<'a>(
    run: &mut FileRun<'a>,
    eval: impl FnOnce(&mut FileRun<'a>) -> Result<bool, DirectiveError>,
) -> Result<Option<bool>, DirectiveError> {
    if run.state.is_executable() {
        eval(run).map(Some)
    } else {
        Ok(None)
    }
}

pub(super) fn if_(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let name = inv.directive.name;
    let condition = gated(run, |run| run.eval_condition(expect_expr(name, inv.args)?))?;
    run.state.open_if(inv.line, condition);
    Ok(Transition::Continue)
}

pub(super) fn ifdefined(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let var = parse_identifier(inv.directive.name, inv.args)?;
    let condition = gated(run, |run| Ok(run.ctx.is_defined(var)))?;
    run.state.open_if(inv.line, condition);
    Ok(Transition::Continue)
}

pub(super) fn ifndef(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let var = parse_identifier(inv.directive.name, inv.args)?;
    let condition = gated(run, |run| Ok(!run.ctx.is_defined(var)))?;
    run.state.open_if(inv.line, condition);
    Ok(Transition::Continue)
}

pub(super) fn else_(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    expect_none(inv.directive.name, inv.args)?;
    run.state.toggle_else(inv.directive.name)?;
    Ok(Transition::Continue)
}

pub(super) fn endif(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    expect_none(inv.directive.name, inv.args)?;
    run.state.close_if(inv.directive.name)?;
    Ok(Transition::Continue)
}

pub(super) fn while_(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let name = inv.directive.name;
    let condition = gated(run, |run| run.eval_condition(expect_expr(name, inv.args)?))?;
    run.state.open_loop(inv.line, condition);
    Ok(Transition::Continue)
}

pub(super) fn end(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    expect_none(inv.directive.name, inv.args)?;
    run.state.close_loop()
}

pub(super) fn break_(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    expect_none(inv.directive.name, inv.args)?;
    run.state.break_loop()?;
    Ok(Transition::Continue)
}

pub(super) fn continue_(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    expect_none(inv.directive.name, inv.args)?;
    run.state.continue_loop()
}

pub(super) fn exit(_run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    expect_none(inv.directive.name, inv.args)?;
    Ok(Transition::ExitFile)
}

pub(super) fn exitif(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    if run.eval_condition(expect_expr(inv.directive.name, inv.args)?)? {
        Ok(Transition::ExitFile)
    } else {
        Ok(Transition::Continue)
    }
}
