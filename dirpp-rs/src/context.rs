//! Layered variable context.
//!
//! Resolution order: special providers, then the per-file local map, then
//! the run-wide global map.  A [`VariableContext::fork`] shares the global
//! map, the include cache, the providers and the extension with its source
//! and starts with an empty local map.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::ExprError;
use crate::expr::{Arity, EvalContext, Value};
use crate::extension::Extension;
use crate::special::{EngineState, SpecialVariables};

/// Cached file contents, split into lines.
pub type Lines = Rc<Vec<String>>;

pub struct VariableContext {
    globals: Rc<RefCell<HashMap<String, Value>>>,
    locals: HashMap<String, Value>,
    providers: Rc<Vec<Rc<dyn SpecialVariables>>>,
    resources: Rc<RefCell<HashMap<PathBuf, Lines>>>,
    extension: Option<Rc<RefCell<dyn Extension>>>,
    unknown_as_false: bool,
    /// Per-file data read by the engine namespace.
    pub state: EngineState,
}

impl Default for VariableContext {
    fn default() -> Self {
        VariableContext {
            globals: Rc::default(),
            locals: HashMap::new(),
            providers: Rc::new(Vec::new()),
            resources: Rc::default(),
            extension: None,
            unknown_as_false: false,
            state: EngineState::default(),
        }
    }
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a special-variable provider.  Providers registered earlier
    /// take precedence when two claim the same name.
    pub fn register(&mut self, provider: Rc<dyn SpecialVariables>) {
        Rc::make_mut(&mut self.providers).push(provider);
    }

    pub fn set_extension(&mut self, extension: Rc<RefCell<dyn Extension>>) {
        self.extension = Some(extension);
    }

    pub fn extension(&self) -> Option<&Rc<RefCell<dyn Extension>>> {
        self.extension.as_ref()
    }

    pub fn set_unknown_as_false(&mut self, on: bool) {
        self.unknown_as_false = on;
    }

    /// A working copy for one file: same globals, cache, providers and
    /// extension; fresh locals and engine state.
    pub fn fork(&self) -> VariableContext {
        VariableContext {
            globals: Rc::clone(&self.globals),
            locals: HashMap::new(),
            providers: Rc::clone(&self.providers),
            resources: Rc::clone(&self.resources),
            extension: self.extension.clone(),
            unknown_as_false: self.unknown_as_false,
            state: EngineState {
                started: self.state.started,
                ..EngineState::default()
            },
        }
    }

    fn provider_for(&self, name: &str) -> Option<&Rc<dyn SpecialVariables>> {
        self.providers.iter().find(|p| p.claims(name))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(p) = self.provider_for(name) {
            return p.get(name, &self.state);
        }
        self.locals
            .get(name)
            .cloned()
            .or_else(|| self.globals.borrow().get(name).cloned())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Write `name` into the local map, or into its provider when claimed.
    pub fn set_local(&mut self, name: &str, value: Value) -> Result<(), ExprError> {
        if let Some(p) = self.provider_for(name).cloned() {
            return p.set(name, &value, &mut self.state);
        }
        self.locals.insert(name.to_owned(), value);
        Ok(())
    }

    /// Write `name` into the global map, or into its provider when claimed.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), ExprError> {
        if let Some(p) = self.provider_for(name).cloned() {
            return p.set(name, &value, &mut self.state);
        }
        self.globals.borrow_mut().insert(name.to_owned(), value);
        Ok(())
    }

    /// Remove `name` from the local map, else from the global map.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> Result<bool, ExprError> {
        if self.provider_for(name).is_some() {
            return Err(ExprError::ReadOnly(name.to_owned()));
        }
        if self.locals.remove(name).is_some() {
            return Ok(true);
        }
        Ok(self.globals.borrow_mut().remove(name).is_some())
    }

    /// Sorted copy of the global map.
    pub fn globals(&self) -> BTreeMap<String, Value> {
        self.globals
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    // ── Include cache ─────────────────────────────────────────────────────────

    pub fn cached(&self, path: &Path) -> Option<Lines> {
        self.resources.borrow().get(path).cloned()
    }

    pub fn cache(&self, path: PathBuf, lines: Lines) {
        self.resources.borrow_mut().insert(path, lines);
    }
}

impl EvalContext for VariableContext {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn unknown_as_false(&self) -> bool {
        self.unknown_as_false
    }

    fn user_function_arity(&self, name: &str) -> Option<Arity> {
        self.extension.as_ref()?.borrow().function_arity(name)
    }

    fn call_user_function(&mut self, name: &str, args: &[Value]) -> Result<Value, ExprError> {
        let Some(ext) = &self.extension else {
            return Err(ExprError::UnknownFunction(format!("${name}")));
        };
        ext.borrow_mut()
            .call_function(name, args)
            .map_err(|message| ExprError::Extension {
                name: format!("${name}"),
                message,
            })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{eval_str, Lookup};
    use crate::extension::FnExtension;
    use crate::special::{EngineVariables, EnvironmentVariables};

    fn ctx() -> VariableContext {
        let mut ctx = VariableContext::new();
        ctx.register(Rc::new(EnvironmentVariables::with_vars([("USER", "ann")])));
        ctx.register(Rc::new(EngineVariables));
        ctx
    }

    #[test]
    fn local_shadows_global() {
        let mut c = ctx();
        c.set_global("X", Value::Int(1)).unwrap();
        assert_eq!(c.get("X"), Some(Value::Int(1)));
        c.set_local("X", Value::Int(2)).unwrap();
        assert_eq!(c.get("X"), Some(Value::Int(2)));
        assert_eq!(c.remove("X"), Ok(true));
        assert_eq!(c.get("X"), Some(Value::Int(1)));
        assert_eq!(c.remove("X"), Ok(true));
        assert_eq!(c.remove("X"), Ok(false));
        assert!(!c.is_defined("X"));
    }

    #[test]
    fn special_resolved_first() {
        let mut c = ctx();
        assert_eq!(c.get("env.USER"), Some(Value::Str("ann".into())));
        c.state.line = 7;
        assert_eq!(c.get("__line__"), Some(Value::Int(7)));
        assert_eq!(
            c.set_global("env.USER", "bob".into()),
            Err(ExprError::ReadOnly("env.USER".into()))
        );
        assert_eq!(
            c.remove("__line__"),
            Err(ExprError::ReadOnly("__line__".into()))
        );
    }

    #[test]
    fn fork_shares_globals_not_locals() {
        let mut base = ctx();
        base.set_global("G", Value::Bool(true)).unwrap();
        base.set_local("L", Value::Int(1)).unwrap();
        base.cache(PathBuf::from("inc.txt"), Rc::new(vec!["x".into()]));

        let mut child = base.fork();
        assert_eq!(child.get("G"), Some(Value::Bool(true)));
        assert_eq!(child.get("L"), None);
        assert!(child.cached(Path::new("inc.txt")).is_some());
        assert_eq!(child.get("env.USER"), Some(Value::Str("ann".into())));

        child.set_global("H", Value::Int(3)).unwrap();
        assert_eq!(base.get("H"), Some(Value::Int(3)));
        assert_eq!(base.globals().keys().cloned().collect::<Vec<_>>(), vec!["G", "H"]);
    }

    #[test]
    fn extension_functions() {
        let mut c = ctx();
        let ext = FnExtension::new().function("inc", Arity::exactly(1), |args| match args {
            [Value::Int(n)] => Ok(Value::Int(n + 1)),
            _ => Err("bad argument".into()),
        });
        c.set_extension(Rc::new(RefCell::new(ext)));
        assert_eq!(eval_str("$inc(41)", &mut c, Lookup::Enforced), Ok(Value::Int(42)));
        assert!(matches!(
            eval_str("$inc(\"x\")", &mut c, Lookup::Enforced),
            Err(ExprError::Extension { .. })
        ));
    }

    #[test]
    fn unknown_as_false_policy() {
        let mut c = ctx();
        c.set_unknown_as_false(true);
        assert_eq!(eval_str("NOPE", &mut c, Lookup::Lenient), Ok(Value::Bool(false)));
        assert!(eval_str("NOPE", &mut c, Lookup::Enforced).is_err());
    }
}
