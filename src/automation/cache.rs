//! Process-local memoization for repeated lookups within a request

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keyed cache of shared values.
///
/// A disabled cache computes every value and stores nothing.
#[derive(Clone)]
pub struct LocalCache<V> {
    entries: Arc<Mutex<HashMap<String, Arc<V>>>>,
    enabled: bool,
}

impl<V> LocalCache<V> {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            enabled,
        }
    }

    /// Cached value for `key`, computed by `init` on a miss
    pub fn get_or_insert_with<F>(&self, key: &str, init: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        if !self.enabled {
            return Arc::new(init());
        }
        if let Some(value) = self.lock().get(key) {
            return value.clone();
        }

        let value = Arc::new(init());
        self.lock().insert(key.to_string(), value.clone());
        value
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V> Default for LocalCache<V> {
    fn default() -> Self {
        Self::new(true)
    }
}
