//! A capacity-bounded LRU cache keyed by canonical URL (spec.md §4.1,
//! §9 "conditional cache generics"). Ported from `LRUCache` in
//! `lib/aio/util.py`.
//!
//! The Open Question in spec.md §9 ("least-recently added" comment vs.
//! actual pop-then-reinsert semantics) is resolved as **least-recently
//! touched**: `add()` moves the key to the back of the order on every
//! call, including on a cache-hit refresh, which is what the original's
//! `dict.pop` + re-`dict[key] = value` actually does regardless of what
//! its comment says.

use std::collections::HashMap;

/// Default cache capacity (spec.md §3 invariants).
pub const DEFAULT_CAPACITY: usize = 128;

/// An ordered map with move-to-back-on-touch eviction, the way the
/// design note in spec.md §9 prefers over a hash map plus a doubly
/// linked list.
pub struct LruCache<V> {
    capacity: usize,
    order: Vec<String>,
    entries: HashMap<String, V>,
}

impl<V> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert or refresh `key`, moving it to most-recently-touched and
    /// evicting the least-recently-touched entry while over capacity.
    pub fn add(&mut self, key: String, value: V) {
        if let Some(pos) = self.order.iter().position(|k| k == &key) {
            self.order.remove(pos);
        }
        self.entries.remove(&key);

        self.order.push(key.clone());
        self.entries.insert(key, value);

        while self.order.len() > self.capacity {
            let oldest = self.order.remove(0);
            tracing::debug!(key = %oldest, "evicting cached data");
            self.entries.remove(&oldest);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn keys(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_touched_when_over_capacity() {
        let mut cache = LruCache::new(2);
        cache.add("a".into(), 1);
        cache.add("b".into(), 2);
        cache.add("c".into(), 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(&2));
        assert_eq!(cache.get("c"), Some(&3));
    }

    #[test]
    fn touching_an_entry_saves_it_from_eviction() {
        let mut cache = LruCache::new(2);
        cache.add("a".into(), 1);
        cache.add("b".into(), 2);
        // Touch "a" again: it becomes most-recently-touched.
        cache.add("a".into(), 1);
        cache.add("c".into(), 3);
        // "b" is now least-recently-touched and should be evicted, not "a".
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(&1));
        assert_eq!(cache.get("c"), Some(&3));
    }

    #[test]
    fn resident_set_is_always_the_n_most_recently_touched() {
        let mut cache = LruCache::new(3);
        for i in 0..10 {
            cache.add(format!("k{i}"), i);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.keys(), &["k7".to_string(), "k8".to_string(), "k9".to_string()]);
    }
}
