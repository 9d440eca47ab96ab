use std::collections::BTreeMap;

use crate::error::{ConfigError, Resource, Result};
use crate::value::Value;

/// A fallback value registered for a key of the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultEntry {
    pub key: String,
    pub value: Value,
}

impl DefaultEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Fallback values, kept apart from the live entries they shadow.
#[derive(Debug, Clone)]
pub(crate) struct DefaultRegistry {
    entries: BTreeMap<String, Value>,
    capacity: usize,
}

impl DefaultRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    /// Register or replace the default for `key`; the last registration wins.
    pub(crate) fn register(&mut self, key: &str, value: Value) -> Result<()> {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            return Err(ConfigError::Full(Resource::Defaults));
        }
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
