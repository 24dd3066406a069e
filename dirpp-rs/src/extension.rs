//! User-extension hook.
//!
//! An embedding program registers one [`Extension`] with the
//! [`Preprocessor`](crate::engine::Preprocessor) to serve `$name(...)`
//! functions and the `//#action` directive.

use crate::expr::{Arity, Value};

pub trait Extension {
    /// Accepted argument counts of `$name`, or `None` when it is not provided.
    fn function_arity(&self, name: &str) -> Option<Arity>;

    /// Call `$name` with evaluated arguments.
    fn call_function(&mut self, name: &str, args: &[Value]) -> Result<Value, String>;

    /// Handle `//#action` with its evaluated arguments.
    fn action(&mut self, args: &[Value]) -> Result<(), String>;
}

/// An extension assembled from closures.
#[derive(Default)]
pub struct FnExtension {
    functions: Vec<(String, Arity, Box<dyn FnMut(&[Value]) -> Result<Value, String>>)>,
    action: Option<Box<dyn FnMut(&[Value]) -> Result<(), String>>>,
}

impl FnExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(
        mut self,
        name: impl Into<String>,
        arity: Arity,
        f: impl FnMut(&[Value]) -> Result<Value, String> + 'static,
    ) -> Self {
        self.functions.push((name.into(), arity, Box::new(f)));
        self
    }

    pub fn on_action(mut self, f: impl FnMut(&[Value]) -> Result<(), String> + 'static) -> Self {
        self.action = Some(Box::new(f));
        self
    }
}

impl Extension for FnExtension {
    fn function_arity(&self, name: &str) -> Option<Arity> {
        self.functions
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, arity, _)| arity.clone())
    }

    fn call_function(&mut self, name: &str, args: &[Value]) -> Result<Value, String> {
        match self.functions.iter_mut().find(|(n, _, _)| n == name) {
            Some((_, _, f)) => f(args),
            None => Err(format!("no function named '{name}'")),
        }
    }

    fn action(&mut self, args: &[Value]) -> Result<(), String> {
        match &mut self.action {
            Some(f) => f(args),
            None => Err("no action handler registered".into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_dispatch_by_name() {
        let mut ext = FnExtension::new()
            .function("twice", Arity::exactly(1), |args| match args {
                [Value::Int(n)] => Ok(Value::Int(n * 2)),
                _ => Err("expected an integer".into()),
            })
            .on_action(|_| Ok(()));
        assert_eq!(ext.function_arity("twice"), Some(Arity::exactly(1)));
        assert_eq!(ext.function_arity("other"), None);
        assert_eq!(ext.call_function("twice", &[Value::Int(4)]), Ok(Value::Int(8)));
        assert!(ext.call_function("other", &[]).is_err());
        assert!(ext.action(&[]).is_ok());
    }

    #[test]
    fn missing_action_handler() {
        assert!(FnExtension::new().action(&[Value::Int(1)]).is_err());
    }
}
