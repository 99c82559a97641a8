//! Time-bounded response cache keyed by (plate, panel)

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::{DispatchKey, Outcome};

/// Which TTL an entry lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Successes and backend rejections
    Normal,
    /// Transport failures and timeouts
    ConnectionError,
}

impl TtlClass {
    pub fn of(outcome: &Outcome) -> Self {
        if outcome.is_connection_error {
            TtlClass::ConnectionError
        } else {
            TtlClass::Normal
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub outcome: Outcome,
    pub stored_at: Instant,
    pub ttl_class: TtlClass,
}

/// Remembers recent outcomes so repeated sightings skip the network
#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<DispatchKey, CacheEntry>,
    normal_ttl: Duration,
    connection_error_ttl: Duration,
}

impl ResponseCache {
    pub fn new(normal_ttl: Duration, connection_error_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            normal_ttl,
            connection_error_ttl,
        }
    }

    pub fn ttl(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Normal => self.normal_ttl,
            TtlClass::ConnectionError => self.connection_error_ttl,
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) >= self.ttl(entry.ttl_class)
    }

    /// Live entry for a key. Expired entries are never returned even
    /// before the next sweep removes them.
    pub fn get(&self, key: &DispatchKey, now: Instant) -> Option<&Outcome> {
        self.entries
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| &entry.outcome)
    }

    /// Store an outcome, replacing any previous entry for the key
    pub fn put(
        &mut self,
        key: DispatchKey,
        outcome: Outcome,
        ttl_class: TtlClass,
        now: Instant,
    ) -> Option<CacheEntry> {
        self.entries.insert(
            key,
            CacheEntry {
                outcome,
                stored_at: now,
                ttl_class,
            },
        )
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let normal_ttl = self.normal_ttl;
        let connection_error_ttl = self.connection_error_ttl;
        self.entries.retain(|_, entry| {
            let ttl = match entry.ttl_class {
                TtlClass::Normal => normal_ttl,
                TtlClass::ConnectionError => connection_error_ttl,
            };
            now.saturating_duration_since(entry.stored_at) < ttl
        });
        before - self.entries.len()
    }

    /// Empty the cache. Returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
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
    use crate::DispatchError;
    use plate_tracker::{Panel, PlateText};

    fn key(plate: &str) -> DispatchKey {
        DispatchKey::new(PlateText::parse(plate).unwrap(), Panel::Entry)
    }

    fn cache() -> ResponseCache {
        ResponseCache::new(Duration::from_secs(300), Duration::from_secs(120))
    }

    #[test]
    fn test_entry_lives_until_ttl() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.put(key("51A-12345"), Outcome::success("ok"), TtlClass::Normal, t0);

        assert!(cache.get(&key("51A-12345"), t0 + Duration::from_secs(299)).is_some());
        assert!(cache.get(&key("51A-12345"), t0 + Duration::from_secs(300)).is_none());
        assert!(cache.get(&key("30F-11111"), t0).is_none());
    }

    #[test]
    fn test_connection_errors_use_their_own_ttl() {
        let mut cache = cache();
        let t0 = Instant::now();
        let outcome = Outcome::connection_error(&DispatchError::Transport("refused".into()));
        cache.put(key("51A-12345"), outcome.clone(), TtlClass::of(&outcome), t0);

        assert!(cache.get(&key("51A-12345"), t0 + Duration::from_secs(60)).is_some());
        assert!(cache.get(&key("51A-12345"), t0 + Duration::from_secs(121)).is_none());
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.put(key("51A-12345"), Outcome::success("first"), TtlClass::Normal, t0);
        let previous = cache.put(key("51A-12345"), Outcome::success("second"), TtlClass::Normal, t0);

        assert_eq!(previous.map(|e| e.outcome.message), Some("first".to_string()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("51A-12345"), t0).unwrap().message, "second");
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.put(key("51A-12345"), Outcome::success("old"), TtlClass::Normal, t0);
        cache.put(
            key("30F-11111"),
            Outcome::success("new"),
            TtlClass::Normal,
            t0 + Duration::from_secs(200),
        );

        assert_eq!(cache.sweep(t0 + Duration::from_secs(300)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("30F-11111"), t0 + Duration::from_secs(300)).is_some());
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
    }
}
