//! Variable definition directives.

use super::args::{parse_identifier, parse_name_expr};
use super::Invocation;
use crate::engine::FileRun;
use crate::error::DirectiveError;
use crate::expr::Value;
use crate::state::Transition;

#[derive(Clone, Copy)]
enum Scope {
    Local,
    Global,
}

fn assign(
    run: &mut FileRun<'_>,
    inv: &Invocation<'_>,
    scope: Scope,
    require_value: bool,
) -> Result<Transition, DirectiveError> {
    let directive = inv.directive.name;
    let (name, expr) = parse_name_expr(directive, inv.args)?;
    let value = match expr {
        Some(src) => run.eval(src)?,
        None if require_value => {
            return Err(DirectiveError::syntax(format!(
                "//#{directive} {name} requires '= <expr>'"
            )))
        }
        None => Value::Bool(true),
    };
    match scope {
        Scope::Local => run.ctx.set_local(name, value)?,
        Scope::Global => run.ctx.set_global(name, value)?,
    }
    Ok(Transition::Continue)
}

pub(super) fn define(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    assign(run, inv, Scope::Global, false)
}

pub(super) fn definel(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    assign(run, inv, Scope::Local, false)
}

pub(super) fn local(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    assign(run, inv, Scope::Local, true)
}

pub(super) fn global(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    assign(run, inv, Scope::Global, true)
}

pub(super) fn undef(run: &mut FileRun<'_>, inv: &Invocation<'_>) -> Result<Transition, DirectiveError> {
    let name = parse_identifier(inv.directive.name, inv.args)?;
    run.ctx.remove(name)?;
    Ok(Transition::Continue)
}
