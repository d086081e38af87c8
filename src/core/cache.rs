use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Time source for the detection cache, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock backed `Clock` used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Memoizes expensive detection results for a bounded TTL window.
///
/// Detection (tool presence, device enumeration) spawns external processes
/// and walks sysfs, which is far too slow to repeat on every 1 Hz tick. An
/// entry is never served past its expiry, and re-detection runs exactly once
/// per expiry rather than once per poll. Expiry is lazy (checked on read);
/// there is no other eviction.
///
/// The whole read-check-write sequence holds one mutex, so concurrent probes
/// racing on the same key still invoke the detection routine only once.
pub struct DetectionCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> DetectionCache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Return the cached value for `key` if it has not expired; otherwise
    /// invoke `detect` exactly once, store its result with a fresh expiry,
    /// and return it.
    pub fn get_or_detect<F>(&self, key: &str, ttl: Duration, detect: F) -> V
    where
        F: FnOnce() -> V,
    {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(key) {
            if now < entry.expires_at {
                return entry.value.clone();
            }
        }

        let value = detect();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at: now + ttl,
            },
        );
        value
    }

    /// Drop a cached entry so the next lookup re-detects immediately.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

impl<V: Clone> Default for DetectionCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
