//! In-process cache store used when no Redis is configured.
//!
//! Mirrors the subset of Redis semantics the cache facade relies on:
//! string values with optional expiry, integer increments on string values,
//! sets, and glob-style pattern deletes. Expired entries are dropped lazily
//! on access and in bulk by `purge_expired`.

use dashmap::DashMap;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum MemoryValue {
    Str(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Error for operations against a key of the wrong type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("WRONGTYPE operation against key {0}")]
    WrongType(String),

    #[error("value at {0} is not an integer")]
    NotAnInteger(String),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

fn deadline(ttl_secs: u64) -> Option<Instant> {
    if ttl_secs == 0 {
        None
    } else {
        Some(Instant::now() + Duration::from_secs(ttl_secs))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop `key` if it has expired
    fn purge_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        self.purge_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                MemoryValue::Str(s) => Ok(Some(s.clone())),
                MemoryValue::Set(_) => Err(MemoryError::WrongType(key.to_string())),
            },
            None => Ok(None),
        }
    }

    pub fn set(&self, key: &str, value: String, ttl_secs: u64) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: MemoryValue::Str(value),
                expires_at: deadline(ttl_secs),
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some((_, entry)) => !entry.is_expired(now),
            None => false,
        }
    }

    pub fn delete_pattern(&self, pattern: &str) -> u64 {
        let now = Instant::now();
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in matching {
            if let Some((_, entry)) = self.entries.remove(&key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        removed
    }

    pub fn exists(&self, key: &str) -> bool {
        self.purge_if_expired(key);
        self.entries.contains_key(key)
    }

    /// Set a new expiry on an existing key. `ttl_secs == 0` removes the key,
    /// like a non-positive EXPIRE in Redis.
    pub fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        self.purge_if_expired(key);
        if ttl_secs == 0 {
            return self.entries.remove(key).is_some();
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = deadline(ttl_secs);
                true
            }
            None => false,
        }
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.purge_if_expired(key);
        let expires_at = self.entries.get(key)?.expires_at?;
        let left = expires_at.saturating_duration_since(Instant::now());
        Some(left.as_secs() + u64::from(left.subsec_nanos() > 0))
    }

    pub fn increment(&self, key: &str, by: i64) -> Result<i64, MemoryError> {
        self.purge_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: MemoryValue::Str("0".to_string()),
            expires_at: None,
        });

        let current = match &entry.value {
            MemoryValue::Str(s) => s
                .parse::<i64>()
                .map_err(|_| MemoryError::NotAnInteger(key.to_string()))?,
            MemoryValue::Set(_) => return Err(MemoryError::WrongType(key.to_string())),
        };
        let next = current
            .checked_add(by)
            .ok_or_else(|| MemoryError::NotAnInteger(key.to_string()))?;
        entry.value = MemoryValue::Str(next.to_string());
        Ok(next)
    }

    pub fn s_add(&self, key: &str, members: &[String]) -> Result<u64, MemoryError> {
        self.purge_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: MemoryValue::Set(HashSet::new()),
            expires_at: None,
        });

        match &mut entry.value {
            MemoryValue::Set(set) => Ok(members
                .iter()
                .filter(|m| set.insert((*m).clone()))
                .count() as u64),
            MemoryValue::Str(_) => Err(MemoryError::WrongType(key.to_string())),
        }
    }

    pub fn s_members(&self, key: &str) -> Result<Vec<String>, MemoryError> {
        self.purge_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                MemoryValue::Set(set) => {
                    let mut members: Vec<String> = set.iter().cloned().collect();
                    members.sort();
                    Ok(members)
                }
                MemoryValue::Str(_) => Err(MemoryError::WrongType(key.to_string())),
            },
            None => Ok(Vec::new()),
        }
    }

    pub fn s_is_member(&self, key: &str, member: &str) -> Result<bool, MemoryError> {
        self.purge_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                MemoryValue::Set(set) => Ok(set.contains(member)),
                MemoryValue::Str(_) => Err(MemoryError::WrongType(key.to_string())),
            },
            None => Ok(false),
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.purge_expired();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Redis-style glob match supporting `*` and `?`
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(sp) = star {
            pi = sp + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("trips_search:*", "trips_search:abc"));
        assert!(glob_match("trips_search:*", "trips_search:"));
        assert!(!glob_match("trips_search:*", "trip:1"));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("*:user:*", "airbar:user:42"));
        assert!(!glob_match("abc", "abcd"));
    }

    #[test]
    fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", "v".to_string(), 0);
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        assert!(store.delete("k"));
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.delete("k"));
    }

    #[test]
    fn test_expiry_is_lazy_but_invisible() {
        let store = MemoryStore::new();
        store.set("k", "v".to_string(), 1);
        assert!(store.exists("k"));
        {
            let mut entry = store.entries.get_mut("k").unwrap();
            entry.expires_at = Some(Instant::now() - Duration::from_millis(1));
        }
        assert!(!store.exists("k"));
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_increment_and_wrong_type() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("n", 1).unwrap(), 1);
        assert_eq!(store.increment("n", 5).unwrap(), 6);

        store.s_add("s", &["a".to_string()]).unwrap();
        assert!(matches!(store.increment("s", 1), Err(MemoryError::WrongType(_))));

        store.set("text", "hello".to_string(), 0);
        assert!(matches!(store.increment("text", 1), Err(MemoryError::NotAnInteger(_))));
    }

    #[test]
    fn test_sets() {
        let store = MemoryStore::new();
        let added = store
            .s_add("s", &["b".to_string(), "a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.s_members("s").unwrap(), vec!["a", "b"]);
        assert!(store.s_is_member("s", "a").unwrap());
        assert!(!store.s_is_member("s", "z").unwrap());
        assert!(store.s_members("missing").unwrap().is_empty());
    }

    #[test]
    fn test_delete_pattern() {
        let store = MemoryStore::new();
        store.set("trips_search:1", "x".to_string(), 0);
        store.set("trips_search:2", "x".to_string(), 0);
        store.set("trip:1", "x".to_string(), 0);
        assert_eq!(store.delete_pattern("trips_search:*"), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_purge_expired_drops_only_stale_entries() {
        let store = MemoryStore::new();
        store.set("fresh", "1".to_string(), 60);
        store.set("forever", "2".to_string(), 0);
        store.set("stale", "3".to_string(), 60);
        {
            let mut entry = store.entries.get_mut("stale").unwrap();
            entry.expires_at = Some(Instant::now() - Duration::from_secs(1));
        }

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.entries.len(), 2);
        assert_eq!(store.purge_expired(), 0);
    }
}
