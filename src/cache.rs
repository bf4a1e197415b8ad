use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// In-process object cache standing in for the site's object-cache layer.
/// This is the component the benchmark varies: with the cache disabled every
/// lookup is a miss, which is exactly the contrast the comparison engine
/// surfaces.
///
/// Hit/miss counters accumulate until drained with `take_counts`, so each
/// work unit can attribute exactly its own cache activity.
pub struct ObjectCache {
    entries: Mutex<HashMap<String, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
    enabled: AtomicBool,
}

impl ObjectCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
        if !on {
            self.flush();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if !self.is_enabled() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: &str, value: &str) {
        if !self.is_enabled() {
            return;
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn flush(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Drain the accumulated hit/miss counters.
    pub fn take_counts(&self) -> (u64, u64) {
        (
            self.hits.swap(0, Ordering::Relaxed),
            self.misses.swap(0, Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_and_miss_counting() {
        let cache = ObjectCache::new(true);
        assert!(cache.get("a").is_none());
        cache.put("a", "1");
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.take_counts(), (1, 1));
        // Drained.
        assert_eq!(cache.take_counts(), (0, 0));
    }

    #[test]
    fn disabled_cache_always_misses() {
        let cache = ObjectCache::new(false);
        cache.put("a", "1");
        assert!(cache.get("a").is_none());
        assert_eq!(cache.take_counts(), (0, 1));
    }

    #[test]
    fn disabling_flushes_entries() {
        let cache = ObjectCache::new(true);
        cache.put("a", "1");
        cache.set_enabled(false);
        cache.set_enabled(true);
        assert!(cache.get("a").is_none());
    }
}
