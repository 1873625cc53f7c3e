use std::sync::Arc;

use dashmap::DashMap;

use metacache_api::MetadataRecord;

/// Process-wide cache: username → latest metadata record.
///
/// Last write wins per key. Entries live for the whole process: no TTL,
/// no eviction, nothing persisted. Records are swapped as whole `Arc`s, so
/// a reader sees either the previous record or the new one. The map is
/// sharded; writers of different users only meet when their keys hash to
/// the same shard.
#[derive(Debug, Default)]
pub struct MetadataStore {
    entries: DashMap<String, Arc<MetadataRecord>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `username`.
    pub fn put(&self, username: impl Into<String>, record: MetadataRecord) {
        self.entries.insert(username.into(), Arc::new(record));
    }

    pub fn get(&self, username: &str) -> Option<Arc<MetadataRecord>> {
        self.entries.get(username).map(|entry| Arc::clone(entry.value()))
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
    use serde_json::json;

    fn record(value: serde_json::Value) -> MetadataRecord {
        MetadataRecord::from_value(value).unwrap()
    }

    #[test]
    fn get_on_empty_store_is_none() {
        let store = MetadataStore::new();
        assert!(store.get("alice").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn last_write_wins() {
        let store = MetadataStore::new();
        store.put("alice", record(json!({"username": "alice", "age": 30})));
        store.put("alice", record(json!({"username": "alice", "age": 31})));

        let got = store.get("alice").unwrap();
        assert_eq!(got.get("age"), Some(&json!(31)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn replace_is_whole_record_not_merge() {
        let store = MetadataStore::new();
        store.put("alice", record(json!({"username": "alice", "age": 30, "city": "Oslo"})));
        store.put("alice", record(json!({"username": "alice", "age": 31})));

        let got = store.get("alice").unwrap();
        assert!(got.get("city").is_none());
    }

    #[test]
    fn keys_are_isolated() {
        let store = MetadataStore::new();
        store.put("alice", record(json!({"username": "alice", "age": 30})));
        store.put("bob", record(json!({"username": "bob", "age": 40})));
        store.put("bob", record(json!({"username": "bob", "age": 41})));

        assert_eq!(store.get("alice").unwrap().get("age"), Some(&json!(30)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn readers_never_see_torn_records() {
        let store = MetadataStore::new();
        store.put("u", record(json!({"username": "u", "a": 0, "b": 0})));

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 1..=2_000 {
                    store.put("u", record(json!({"username": "u", "a": i, "b": i})));
                }
            });
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..2_000 {
                        let got = store.get("u").unwrap();
                        assert_eq!(got.get("a"), got.get("b"));
                    }
                });
            }
        });

        assert_eq!(store.get("u").unwrap().get("a"), Some(&json!(2_000)));
    }

    #[test]
    fn concurrent_writers_on_distinct_keys_lose_nothing() {
        let store = MetadataStore::new();
        std::thread::scope(|s| {
            for t in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..250 {
                        let name = format!("user-{t}-{i}");
                        store.put(name.clone(), record(json!({"username": name})));
                    }
                });
            }
        });
        assert_eq!(store.len(), 8 * 250);
    }
}
