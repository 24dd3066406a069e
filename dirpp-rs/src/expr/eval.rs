//! Tree evaluation.

use crate::error::ExprError;

use super::item::{ExpressionItem, Function};
use super::ops;
use super::tree::{ExpressionTree, NodeId};
use super::value::Value;
use super::EvalContext;

/// How an unresolved variable is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Unknown variables always fail (directive conditions and arguments).
    Enforced,
    /// Unknown variables read as `false` when the context's
    /// unknown-as-false policy is on (inline substitution).
    Lenient,
}

/// Evaluate a built tree bottom-up.  Every child is evaluated before its
/// parent is applied; there is no short-circuiting.
pub fn evaluate(
    tree: &ExpressionTree,
    ctx: &mut dyn EvalContext,
    lookup: Lookup,
) -> Result<Value, ExprError> {
    match tree.root() {
        Some(root) => eval_node(tree, root, ctx, lookup),
        None => Err(ExprError::Empty),
    }
}

fn eval_node(
    tree: &ExpressionTree,
    id: NodeId,
    ctx: &mut dyn EvalContext,
    lookup: Lookup,
) -> Result<Value, ExprError> {
    let node = tree.node(id);
    match &node.item {
        ExpressionItem::Value(v) => Ok(v.clone()),
        ExpressionItem::Variable(name) => match ctx.resolve(name) {
            Some(v) => Ok(v),
            None if lookup == Lookup::Lenient && ctx.unknown_as_false() => Ok(Value::Bool(false)),
            None => Err(ExprError::UnknownVariable(name.clone())),
        },
        ExpressionItem::Operator(op) => {
            if node.children.len() != op.arity() {
                return Err(ExprError::MissingOperand(op.keyword().to_owned()));
            }
            let args = eval_children(tree, &node.children, ctx, lookup)?;
            ops::apply(*op, &args)
        }
        ExpressionItem::Function(func) => {
            let args = eval_children(tree, &node.children, ctx, lookup)?;
            match func {
                Function::Builtin(f) => f.call(&args, &*ctx),
                Function::User(name) => ctx.call_user_function(name, &args),
            }
        }
        ExpressionItem::Delimiter(_) => Err(ExprError::Internal(format!(
            "delimiter '{}' left in expression tree",
            node.item
        ))),
    }
}

fn eval_children(
    tree: &ExpressionTree,
    children: &[NodeId],
    ctx: &mut dyn EvalContext,
    lookup: Lookup,
) -> Result<Vec<Value>, ExprError> {
    children
        .iter()
        .map(|c| eval_node(tree, *c, ctx, lookup))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
