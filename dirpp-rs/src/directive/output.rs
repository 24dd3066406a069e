//! Output routing and destination control.

use super::args::{expect_expr, expect_none, parse_on_off};
use super::Invocation;
use crate::engine::FileRun;
use crate::error::DirectiveError;
use crate::output::BufferKind;
use crate::state::{StateFlags, Transition};

fn no_args(inv: &Invocation<'_>) -> Result<(), DirectiveError> {
    expect_none(inv.directive.name, inv.args)
}

pub(super) fn flush(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    no_args(inv)?;
    run.flush()?;
    Ok(Transition::Continue)
}

pub(super) fn noautoflush(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    no_args(inv)?;
    run.state.flags.insert(StateFlags::NO_AUTO_FLUSH);
    Ok(Transition::Continue)
}

pub(super) fn autoflush(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let on = parse_on_off(inv.directive.name, inv.args)?;
    run.state.flags.set(StateFlags::NO_AUTO_FLUSH, !on);
    Ok(Transition::Continue)
}

fn select(run: &mut FileRun<'_>, inv: &Invocation<'_>, kind: BufferKind) -> Result<Transition, DirectiveError> {
    no_args(inv)?;
    run.output.select(kind);
    Ok(Transition::Continue)
}

pub(super) fn prefix_on(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    select(run, inv, BufferKind::Prefix)
}

pub(super) fn prefix_off(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    select(run, inv, BufferKind::Normal)
}

pub(super) fn postfix_on(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    select(run, inv, BufferKind::Postfix)
}

pub(super) fn postfix_off(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    select(run, inv, BufferKind::Normal)
}

pub(super) fn suspend(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    no_args(inv)?;
    run.state.flags.insert(StateFlags::OUTPUT_SUSPENDED);
    Ok(Transition::Continue)
}

pub(super) fn resume(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    no_args(inv)?;
    run.state.flags.remove(StateFlags::OUTPUT_SUSPENDED);
    Ok(Transition::Continue)
}

pub(super) fn comment_next(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    no_args(inv)?;
    run.state.flags.insert(StateFlags::COMMENT_NEXT_LINE);
    Ok(Transition::Continue)
}

/// Write an engine variable through its provider, so the destination
/// rules live in one place.
fn set_destination(run: &mut FileRun<'_>, inv: &Invocation<'_>, var: &str) -> Result<Transition, DirectiveError> {
    let value = run.eval(expect_expr(inv.directive.name, inv.args)?)?;
    run.ctx.set_local(var, value)?;
    Ok(Transition::Continue)
}

pub(super) fn outdir(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    set_destination(run, inv, "pp.dst.dir")
}

pub(super) fn outname(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    set_destination(run, inv, "pp.dst.name")
}

pub(super) fn outenabled(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    run.out_enabled = run.eval_condition(expect_expr(inv.directive.name, inv.args)?)?;
    Ok(Transition::Continue)
}
