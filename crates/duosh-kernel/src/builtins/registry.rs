//! Name → builtin lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{Builtin, BuiltinSchema};

#[derive(Default)]
pub struct BuiltinRegistry {
    builtins: HashMap<String, Arc<dyn Builtin>>,
}

impl BuiltinRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every builtin the kernel ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        super::register_builtins(&mut registry);
        registry
    }

    /// Register a builtin, replacing any earlier one of the same name.
    pub fn register(&mut self, builtin: impl Builtin + 'static) {
        self.builtins
            .insert(builtin.name().to_string(), Arc::new(builtin));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Builtin>> {
        self.builtins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Sorted names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn schemas(&self) -> Vec<BuiltinSchema> {
        self.names()
            .into_iter()
            .filter_map(|n| self.builtins.get(n))
            .map(|b| b.schema())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_registered() {
        let registry = BuiltinRegistry::with_defaults();
        for name in ["echo", "put", "each", "fail", "return", "wait", "to-json"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(registry.get("no-such-thing").is_none());
    }

    #[test]
    fn names_are_sorted_and_match_schemas() {
        let registry = BuiltinRegistry::with_defaults();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        for (name, schema) in names.iter().zip(registry.schemas()) {
            assert_eq!(*name, schema.name);
        }
    }
}
