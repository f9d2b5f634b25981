//! Replay cache (C3).
//!
//! Idempotency gate keyed by `mandate_id` with a TTL. A successful `claim` for
//! a given `mandate_id` must happen at most once across the process for its
//! TTL window; `dashmap`'s per-shard locking gives us that atomicity without a
//! single global mutex becoming the bottleneck spec.md §5 warns against.

use dashmap::DashMap;

use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadySeen,
}

#[derive(Debug)]
pub struct ReplayCache {
    entries: DashMap<String, UnixTimestamp>,
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Attempts to claim `mandate_id` for `ttl_seconds`. Returns `AlreadySeen`
    /// if a live (non-expired) claim already exists; otherwise inserts a fresh
    /// claim and returns `Claimed`. The whole check-then-insert happens under
    /// a single shard lock via `DashMap::entry`, so concurrent callers racing
    /// on the same key can never both observe `Claimed`.
    pub fn claim(&self, mandate_id: &str, ttl_seconds: u64, now: UnixTimestamp) -> ClaimOutcome {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(mandate_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.seconds_since_epoch() >= entry.get().seconds_since_epoch() {
                    // expired claim, may be reclaimed
                    entry.insert(now + ttl_seconds);
                    ClaimOutcome::Claimed
                } else {
                    ClaimOutcome::AlreadySeen
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + ttl_seconds);
                ClaimOutcome::Claimed
            }
        }
    }

    pub fn is_claimed(&self, mandate_id: &str, now: UnixTimestamp) -> bool {
        self.entries
            .get(mandate_id)
            .map(|expiry| now.seconds_since_epoch() < expiry.seconds_since_epoch())
            .unwrap_or(false)
    }

    /// Drops entries whose TTL has elapsed. Safe to call concurrently with
    /// `claim`/`is_claimed`; never removes a live claim.
    pub fn garbage_collect(&self, now: UnixTimestamp) {
        self.entries
            .retain(|_, expiry| now.seconds_since_epoch() < expiry.seconds_since_epoch());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_claim_succeeds_second_is_already_seen() {
        let cache = ReplayCache::new();
        let now = UnixTimestamp(1_000);
        assert_eq!(cache.claim("m1", 60, now), ClaimOutcome::Claimed);
        assert_eq!(cache.claim("m1", 60, now), ClaimOutcome::AlreadySeen);
    }

    #[test]
    fn expired_claim_can_be_reclaimed() {
        let cache = ReplayCache::new();
        assert_eq!(
            cache.claim("m1", 10, UnixTimestamp(1_000)),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            cache.claim("m1", 10, UnixTimestamp(1_011)),
            ClaimOutcome::Claimed
        );
    }

    #[test]
    fn garbage_collection_only_removes_expired_entries() {
        let cache = ReplayCache::new();
        cache.claim("live", 1000, UnixTimestamp(0));
        cache.claim("dead", 1, UnixTimestamp(0));
        cache.garbage_collect(UnixTimestamp(500));
        assert!(cache.is_claimed("live", UnixTimestamp(500)));
        assert!(!cache.is_claimed("dead", UnixTimestamp(500)));
    }

    #[test]
    fn exactly_one_concurrent_claim_wins() {
        let cache = Arc::new(ReplayCache::new());
        let mut handles = vec![];
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                cache.claim("contested", 60, UnixTimestamp(1_000))
            }));
        }
        let claimed_count = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| *outcome == ClaimOutcome::Claimed)
            .count();
        assert_eq!(claimed_count, 1);
    }
}
