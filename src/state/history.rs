//! Bounded, expiring client history.
//!
//! Recently-disconnected identities are kept in an LRU + TTL map so WHOWAS
//! style lookups keep working for a day after a client leaves. Capacity and
//! age are bounded; a nickname collision overwrites the previous entry (the
//! map holds the *current* entry per nickname, never a list).

use std::collections::{HashMap, VecDeque};

/// Identity snapshot recorded when a registered session disconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHistoryEntry {
    pub nickname: String,
    pub username: String,
    pub hostname: String,
    pub realname: String,
    pub account: Option<String>,
}

/// An LRU map whose entries also expire after a fixed age.
///
/// Timestamps are supplied by the caller (the server's wall-clock tick), so
/// the container itself never consults a clock.
#[derive(Debug)]
pub struct ExpiringMap<V> {
    max_len: usize,
    max_age_secs: i64,
    entries: HashMap<String, (i64, V)>,
    order: VecDeque<String>,
}

impl<V> ExpiringMap<V> {
    pub fn new(max_len: usize, max_age_secs: i64) -> Self {
        Self {
            max_len,
            max_age_secs,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Insert or overwrite the entry for `key`.
    pub fn insert(&mut self, key: String, value: V, now: i64) {
        if self.entries.insert(key.clone(), (now, value)).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);

        while self.entries.len() > self.max_len {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Fetch the entry for `key`, dropping it instead when it has expired.
    pub fn get(&mut self, key: &str, now: i64) -> Option<&V> {
        let expired = match self.entries.get(key) {
            Some((inserted, _)) => now - inserted > self.max_age_secs,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            self.order.retain(|k| k != key);
            return None;
        }
        self.entries.get(key).map(|(_, v)| v)
    }

    /// Drop every entry older than the age bound.
    pub fn prune(&mut self, now: i64) {
        while let Some(front) = self.order.front() {
            match self.entries.get(front) {
                Some((inserted, _)) if now - inserted > self.max_age_secs => {
                    let key = self.order.pop_front().expect("front exists");
                    self.entries.remove(&key);
                }
                _ => break,
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(cap: usize, age: i64) -> ExpiringMap<u32> {
        ExpiringMap::new(cap, age)
    }

    #[test]
    fn overwrites_on_collision() {
        let mut m = map(4, 100);
        m.insert("alice".into(), 1, 0);
        m.insert("alice".into(), 2, 1);
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("alice", 2), Some(&2));
    }

    #[test]
    fn evicts_least_recently_inserted() {
        let mut m = map(2, 100);
        m.insert("a".into(), 1, 0);
        m.insert("b".into(), 2, 1);
        m.insert("c".into(), 3, 2);
        assert_eq!(m.len(), 2);
        assert!(!m.contains_key("a"));
        assert!(m.contains_key("b"));
        assert!(m.contains_key("c"));
    }

    #[test]
    fn reinsert_refreshes_lru_position() {
        let mut m = map(2, 100);
        m.insert("a".into(), 1, 0);
        m.insert("b".into(), 2, 1);
        m.insert("a".into(), 3, 2);
        m.insert("c".into(), 4, 3);
        assert!(m.contains_key("a"));
        assert!(!m.contains_key("b"));
    }

    #[test]
    fn entries_expire() {
        let mut m = map(4, 10);
        m.insert("a".into(), 1, 0);
        assert_eq!(m.get("a", 5), Some(&1));
        assert_eq!(m.get("a", 11), None);
        assert!(m.is_empty());
    }

    #[test]
    fn prune_drops_only_stale() {
        let mut m = map(4, 10);
        m.insert("a".into(), 1, 0);
        m.insert("b".into(), 2, 8);
        m.prune(12);
        assert!(!m.contains_key("a"));
        assert!(m.contains_key("b"));
    }
}
