use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Competition, country and team lists are refreshed at most every 60 days.
pub const LIST_TTL: Duration = Duration::from_secs(60 * 24 * 60 * 60);

pub const COMPETITIONS_KEY: &str = "competitions";
pub const COUNTRIES_KEY: &str = "countries";

pub fn teams_key(league_id: u32, season: u16) -> String {
    format!("teams:{league_id}:{season}")
}

#[derive(Debug, Clone)]
pub struct CacheSlot<V> {
    pub value: V,
    pub fetched_at: SystemTime,
    pub ttl: Duration,
}

impl<V> CacheSlot<V> {
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        match now.duration_since(self.fetched_at) {
            Ok(age) => age < self.ttl,
            // A clock that moved backwards still counts as fresh.
            Err(_) => true,
        }
    }
}

/// Inserts between sweeps of expired slots.
pub const PURGE_EVERY: usize = 64;

/// Keyed values with a fetch timestamp and a freshness window.
///
/// Expired slots are dropped on read and swept every [`PURGE_EVERY`] inserts.
/// With a size limit, the oldest slot makes room for a new key.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    default_ttl: Duration,
    max_entries: Option<usize>,
    inserts: usize,
    slots: HashMap<String, CacheSlot<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            max_entries: None,
            inserts: 0,
            slots: HashMap::new(),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, SystemTime::now())
    }

    pub fn get_at(&mut self, key: &str, now: SystemTime) -> Option<V> {
        let fresh = self.slots.get(key).map(|slot| slot.is_fresh(now))?;
        if !fresh {
            self.slots.remove(key);
            return None;
        }
        self.slots.get(key).map(|slot| slot.value.clone())
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.set_at(key, value, self.default_ttl, SystemTime::now());
    }

    pub fn set_with_ttl(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, SystemTime::now());
    }

    pub fn set_at(&mut self, key: impl Into<String>, value: V, ttl: Duration, now: SystemTime) {
        let key = key.into();
        self.inserts += 1;
        if self.inserts % PURGE_EVERY == 0 {
            self.purge_expired(now);
        }
        if let Some(max) = self.max_entries
            && self.slots.len() >= max
            && !self.slots.contains_key(&key)
        {
            self.purge_expired(now);
            if self.slots.len() >= max {
                self.evict_oldest();
            }
        }
        self.slots.insert(
            key,
            CacheSlot {
                value,
                fetched_at: now,
                ttl,
            },
        );
    }

    /// Drops every slot that is no longer fresh. Returns how many went.
    pub fn purge_expired(&mut self, now: SystemTime) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.is_fresh(now));
        before - self.slots.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.fetched_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.slots.remove(&key);
        }
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(LIST_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_slot_is_dropped_on_read() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        cache.set_at("k", 7u32, Duration::from_secs(60), t0);

        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(59)), Some(7));
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(60)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn list_ttl_covers_sixty_days() {
        let mut cache = TtlCache::default();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        cache.set_at(COMPETITIONS_KEY, vec![1u32], LIST_TTL, t0);
        let day = Duration::from_secs(24 * 60 * 60);
        assert!(cache.get_at(COMPETITIONS_KEY, t0 + day * 59).is_some());
        assert!(cache.get_at(COMPETITIONS_KEY, t0 + day * 61).is_none());
    }

    #[test]
    fn expired_keys_are_swept_by_later_inserts() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        for i in 0..PURGE_EVERY - 1 {
            cache.set_at(format!("search=x{i}"), i, Duration::from_secs(60), t0);
        }
        assert_eq!(cache.len(), PURGE_EVERY - 1);

        let later = t0 + Duration::from_secs(120);
        cache.set_at("standings", 99, Duration::from_secs(60), later);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at("standings", later), Some(99));
    }

    #[test]
    fn size_limit_evicts_the_oldest_slot() {
        let mut cache = TtlCache::new(Duration::from_secs(3600)).with_max_entries(2);
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let ttl = Duration::from_secs(3600);
        cache.set_at("a", 1u32, ttl, t0);
        cache.set_at("b", 2, ttl, t0 + Duration::from_secs(1));
        cache.set_at("b", 3, ttl, t0 + Duration::from_secs(2));
        assert_eq!(cache.len(), 2);

        cache.set_at("c", 4, ttl, t0 + Duration::from_secs(3));
        assert_eq!(cache.len(), 2);
        let now = t0 + Duration::from_secs(4);
        assert_eq!(cache.get_at("a", now), None);
        assert_eq!(cache.get_at("b", now), Some(3));
        assert_eq!(cache.get_at("c", now), Some(4));
    }

    #[test]
    fn invalidate_reports_presence() {
        let mut cache: TtlCache<String> = TtlCache::default();
        cache.set(teams_key(39, 2025), "x".to_string());
        assert!(cache.invalidate("teams:39:2025"));
        assert!(!cache.invalidate("teams:39:2025"));
    }
}
