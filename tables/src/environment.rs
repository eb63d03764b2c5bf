use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

/// A single layer of bindings.
#[derive(Debug)]
struct Scope {
    bindings: IndexMap<String, Value>,
    parent: Option<Rc<Scope>>,
}

#[derive(Clone, Default)]
pub struct Environment {
    head: Option<Rc<Scope>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment { head: None }
    }

    /// Build a single-scope environment. Later duplicates win.
    pub fn from_bindings<K, I>(bindings: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let bindings: IndexMap<String, Value> = bindings
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        Environment::new().push(bindings)
    }

    pub fn single(name: impl Into<String>, value: Value) -> Self {
        let name: String = name.into();
        Environment::from_bindings([(name, value)])
    }

    fn push(&self, bindings: IndexMap<String, Value>) -> Self {
        if bindings.is_empty() {
            return self.clone();
        }
        Environment {
            head: Some(Rc::new(Scope {
                bindings,
                parent: self.head.clone(),
            })),
        }
    }

    /// Layer `contribution`'s visible bindings on top of `self`.
    pub fn extend(&self, contribution: &Environment) -> Environment {
        if self.head.is_none() {
            return contribution.clone();
        }
        self.push(contribution.bindings())
    }

    /// Look up a binding, searching from the newest scope outward.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes().find_map(|scope| scope.bindings.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of layered scopes.
    pub fn depth(&self) -> usize {
        self.scopes().count()
    }

    /// Visible bindings with shadowing resolved, oldest definition first.
    pub fn bindings(&self) -> IndexMap<String, Value> {
        let mut layers: Vec<&Scope> = self.scopes().collect();
        layers.reverse();
        let mut visible = IndexMap::new();
        for scope in layers {
            for (name, value) in &scope.bindings {
                visible.insert(name.clone(), value.clone());
            }
        }
        visible
    }

    pub fn names(&self) -> Vec<String> {
        self.bindings().into_keys().collect()
    }

    fn scopes(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(self.head.as_deref(), |&scope| scope.parent.as_deref())
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.bindings() == other.bindings()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.bindings()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_leaves_original_untouched() {
        let base = Environment::single("x", Value::Number(1.0));
        let extended = base.extend(&Environment::single("y", Value::Number(2.0)));

        assert!(!base.contains("y"));
        assert_eq!(extended.get("x"), Some(&Value::Number(1.0)));
        assert_eq!(extended.get("y"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn newer_bindings_shadow_older() {
        let env = Environment::single("x", Value::Number(1.0))
            .extend(&Environment::single("x", Value::from("shadow")));
        assert_eq!(env.get("x"), Some(&Value::from("shadow")));
        assert_eq!(env.names(), vec!["x".to_string()]);
    }

    #[test]
    fn extension_is_layered() {
        let mut env = Environment::new();
        for i in 0..10 {
            env = env.extend(&Environment::single(format!("v{}", i), Value::Number(i as f64)));
        }
        assert_eq!(env.depth(), 10);
        assert_eq!(env.names().first().map(String::as_str), Some("v0"));
    }

    #[test]
    fn empty_contribution_adds_no_scope() {
        let env = Environment::single("x", Value::Null);
        assert_eq!(env.extend(&Environment::new()).depth(), 1);
    }
}
