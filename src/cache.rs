//! Cache layer (C17).
//!
//! A small generic, TTL-aware cache keyed by an arbitrary hashable key.
//! Balance, wallet, agent, and rate-limit lookups all share this shape —
//! each gets its own `Cache<K, V>` instance rather than one shared cache
//! keyed by a tagged enum, so eviction pressure on one domain never affects
//! another's hit rate.

use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;

use crate::timestamp::UnixTimestamp;

struct Slot<V> {
    value: V,
    expires_at: UnixTimestamp,
}

/// Generic cache over `Self::Value`, mirroring the teacher's `ProviderMap`
/// keyed-lookup trait shape but adding TTL expiry.
pub trait KeyedCache<K> {
    type Value: Clone;

    fn get(&self, key: &K, now: UnixTimestamp) -> Option<Self::Value>;
    fn put(&self, key: K, value: Self::Value, ttl: Duration, now: UnixTimestamp);
    fn invalidate(&self, key: &K);
}

pub struct Cache<K, V> {
    entries: DashMap<K, Slot<V>>,
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Cache {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry whose TTL has elapsed as of `now`.
    pub fn sweep_expired(&self, now: UnixTimestamp) {
        self.entries.retain(|_, slot| now < slot.expires_at);
    }
}

impl<K, V> KeyedCache<K> for Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    type Value = V;

    fn get(&self, key: &K, now: UnixTimestamp) -> Option<V> {
        let slot = self.entries.get(key)?;
        if now < slot.expires_at {
            Some(slot.value.clone())
        } else {
            None
        }
    }

    fn put(&self, key: K, value: V, ttl: Duration, now: UnixTimestamp) {
        self.entries.insert(
            key,
            Slot {
                value,
                expires_at: now + ttl.as_secs(),
            },
        );
    }

    fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_entry_is_returned_until_its_ttl_elapses() {
        let cache: Cache<String, u64> = Cache::new();
        let now = UnixTimestamp(1_000);
        cache.put("balance:wallet_1".into(), 500, Duration::from_secs(60), now);
        assert_eq!(cache.get(&"balance:wallet_1".to_string(), now), Some(500));
        assert_eq!(cache.get(&"balance:wallet_1".to_string(), now + 61), None);
    }

    #[test]
    fn invalidate_removes_an_entry_immediately() {
        let cache: Cache<String, u64> = Cache::new();
        let now = UnixTimestamp(1_000);
        cache.put("k".into(), 1, Duration::from_secs(60), now);
        cache.invalidate(&"k".to_string());
        assert_eq!(cache.get(&"k".to_string(), now), None);
    }

    #[test]
    fn sweep_expired_drops_only_stale_entries() {
        let cache: Cache<String, u64> = Cache::new();
        let now = UnixTimestamp(0);
        cache.put("live".into(), 1, Duration::from_secs(1000), now);
        cache.put("dead".into(), 2, Duration::from_secs(1), now);
        cache.sweep_expired(now + 500);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"live".to_string(), now + 500), Some(1));
    }
}
