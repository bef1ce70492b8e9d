//! Concurrent in-memory map: collection key → collection value (§4.C).
//!
//! Populated only by writes that have already succeeded against the DB
//! Gateway — never by reads, and never speculatively. `get` on the Query
//! Engine is cache-first but does not populate the cache on miss; `list` is
//! the intended warm-up path (§4.F, §9).

use collections_core::Collection;
use dashmap::DashMap;

#[derive(Default)]
pub struct Cache {
    entries: DashMap<String, Collection>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Collection> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn put(&self, key: String, value: Collection) {
        self.entries.insert(key, value);
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains_all(&self, keys: &[String]) -> bool {
        keys.iter().all(|k| self.entries.contains_key(k))
    }

    pub fn get_many(&self, keys: &[String]) -> Vec<Collection> {
        keys.iter().filter_map(|k| self.get(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use collections_core::{CollectionIdentifier, CollectionSource, CollectionSourceType};
    use url::Url;

    fn sample(key: &str) -> Collection {
        let url = Url::parse(key).unwrap();
        Collection {
            identifier: CollectionIdentifier::json(url.clone()),
            source: CollectionSource {
                source_type: CollectionSourceType::Json,
                url,
            },
            name: "test".to_string(),
            description: None,
            keywords: None,
            packages: vec![],
            created_at: Utc::now(),
            last_processed_at: Utc::now(),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = Cache::new();
        let c = sample("https://example.org/a.json");
        cache.put(c.identifier.database_key(), c.clone());
        assert_eq!(cache.get(&c.identifier.database_key()), Some(c));
    }

    #[test]
    fn delete_removes_entry() {
        let cache = Cache::new();
        let c = sample("https://example.org/a.json");
        cache.put(c.identifier.database_key(), c.clone());
        cache.delete(&c.identifier.database_key());
        assert_eq!(cache.get(&c.identifier.database_key()), None);
    }

    #[test]
    fn clear_empties_cache() {
        let cache = Cache::new();
        let c = sample("https://example.org/a.json");
        cache.put(c.identifier.database_key(), c);
        cache.clear();
        assert!(cache.get("https://example.org/a.json").is_none());
    }

    #[test]
    fn contains_all_requires_every_key() {
        let cache = Cache::new();
        let c = sample("https://example.org/a.json");
        cache.put(c.identifier.database_key(), c.clone());

        assert!(cache.contains_all(&[c.identifier.database_key()]));
        assert!(!cache.contains_all(&[c.identifier.database_key(), "missing".to_string()]));
    }
}
