//! Case-insensitive containers.
//!
//! Nicknames, capability names, property keys, metadata keys and monitor
//! targets all compare under RFC1459 casemapping. These wrappers fold every
//! key through [`coracle_proto::irc_to_lower`] at the boundary so no caller
//! ever casefolds ad hoc.

use std::collections::{HashMap, HashSet};

use coracle_proto::irc_to_lower;

/// A map with RFC1459 case-insensitive string keys.
#[derive(Debug, Clone, Default)]
pub struct CaseMap<V> {
    inner: HashMap<String, V>,
}

impl<V> CaseMap<V> {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        self.inner.insert(irc_to_lower(key), value)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.inner.get(&irc_to_lower(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.inner.remove(&irc_to_lower(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(&irc_to_lower(key))
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Iterate over `(folded_key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A set with RFC1459 case-insensitive members.
#[derive(Debug, Clone, Default)]
pub struct CaseSet {
    inner: HashSet<String>,
}

impl CaseSet {
    pub fn new() -> Self {
        Self {
            inner: HashSet::new(),
        }
    }

    pub fn insert(&mut self, value: &str) -> bool {
        self.inner.insert(irc_to_lower(value))
    }

    pub fn remove(&mut self, value: &str) -> bool {
        self.inner.remove(&irc_to_lower(value))
    }

    pub fn contains(&self, value: &str) -> bool {
        self.inner.contains(&irc_to_lower(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.inner.iter()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
