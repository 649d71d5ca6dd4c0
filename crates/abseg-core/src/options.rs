//! Persisted site-wide options
//!
//! Operators force a segment for every visitor by setting
//! `ab-select-group-<cache group>` in an [`OptionStore`].

use parking_lot::RwLock;
use std::collections::HashMap;

/// Read access to persisted options
pub trait OptionStore: Send + Sync {
    /// Current value of option `name`
    fn get_option(&self, name: &str) -> Option<String>;
}

impl OptionStore for HashMap<String, String> {
    fn get_option(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// In-process option store, writable at runtime
#[derive(Debug, Default)]
pub struct MemoryOptions {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryOptions {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set option `name`, returning the previous value
    pub fn set_option(&self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.write().insert(name.into(), value.into())
    }

    /// Remove option `name`, returning its value
    pub fn delete_option(&self, name: &str) -> Option<String> {
        self.values.write().remove(name)
    }

    /// Number of options set
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether no options are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl From<HashMap<String, String>> for MemoryOptions {
    fn from(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }
}

impl OptionStore for MemoryOptions {
    fn get_option(&self, name: &str) -> Option<String> {
        self.values.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let options = MemoryOptions::new();
        assert!(options.is_empty());

        assert_eq!(options.set_option("ab-select-group-exp", "B"), None);
        assert_eq!(options.get_option("ab-select-group-exp").as_deref(), Some("B"));

        assert_eq!(
            options.set_option("ab-select-group-exp", "A").as_deref(),
            Some("B")
        );
        assert_eq!(options.len(), 1);

        assert_eq!(options.delete_option("ab-select-group-exp").as_deref(), Some("A"));
        assert_eq!(options.get_option("ab-select-group-exp"), None);
    }

    #[test]
    fn hash_map_store() {
        let mut map = HashMap::new();
        map.insert("k".to_string(), "v".to_string());
        assert_eq!(map.get_option("k").as_deref(), Some("v"));
        assert_eq!(MemoryOptions::from(map).get_option("k").as_deref(), Some("v"));
    }
}
