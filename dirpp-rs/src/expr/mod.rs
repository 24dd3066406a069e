//! The directive expression language.
//!
//! Expressions are tokenized ([`lexer`]), built into a priority-climbing
//! arena tree ([`tree`]) and evaluated against an [`EvalContext`]
//! ([`eval`]).  Operators dispatch on operand type tags ([`ops`]); built-in
//! functions match declared signatures ([`builtins`]).
//!
//! Operator precedence (lowest → highest):
//!   logical (`&& || ^`)  →  comparison  →  additive  →  multiplicative  →
//!   unary (`! -`, function calls)  →  primary

pub mod builtins;
pub mod eval;
pub mod item;
pub mod lexer;
pub mod ops;
pub mod tree;
pub mod value;

pub use eval::{evaluate, Lookup};
pub use item::{Arity, ExpressionItem, Operator};
pub use tree::ExpressionTree;
pub use value::{Value, ValueType};

use crate::error::ExprError;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the tree builder and evaluator.
///
/// The preprocessor's variable scope implements this trait to give
/// expressions access to special, local and global variables and to the
/// user extension.
pub trait EvalContext {
    /// Resolve a variable through every layer.  `None` when unknown.
    fn resolve(&self, name: &str) -> Option<Value>;

    /// Whether unknown variables read as `false` under [`Lookup::Lenient`].
    fn unknown_as_false(&self) -> bool {
        false
    }

    /// Accepted argument counts of the `$name` user function.
    fn user_function_arity(&self, _name: &str) -> Option<Arity> {
        None
    }

    /// Call the `$name` user function.
    fn call_user_function(&mut self, name: &str, _args: &[Value]) -> Result<Value, ExprError> {
        Err(ExprError::UnknownFunction(format!("${name}")))
    }
}

/// Parse and evaluate `src` in one step.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext, lookup: Lookup) -> Result<Value, ExprError> {
    let tree = ExpressionTree::parse(src, &*ctx)?;
    evaluate(&tree, ctx, lookup)
}

/// Evaluate `src` and require a boolean result.
pub fn eval_bool(src: &str, ctx: &mut dyn EvalContext, lookup: Lookup) -> Result<bool, ExprError> {
    let value = eval_str(src, ctx, lookup)?;
    value.as_bool().ok_or_else(|| ExprError::WrongType {
        expected: ValueType::Bool.name().to_owned(),
        got: value.value_type().name().to_owned(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
