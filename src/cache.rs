use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::types::EmotionTag;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CacheEntry {
    pub key: String,
    pub text: String,
    pub emotion: EmotionTag,
    pub timestamp: DateTime<Utc>,
}

/// Expired entries read as absent but stay until `evict`
#[derive(Debug)]
pub(crate) struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
    }

    pub fn put(&mut self, key: &str, text: &str, emotion: EmotionTag) {
        self.put_at(key, text, emotion, Utc::now())
    }

    pub fn put_at(&mut self, key: &str, text: &str, emotion: EmotionTag, now: DateTime<Utc>) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                text: text.to_string(),
                emotion,
                timestamp: now,
            },
        );
    }

    pub fn evict(&mut self) -> usize {
        self.evict_at(Utc::now())
    }

    /// Returns the number of removed entries
    pub fn evict_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.signed_duration_since(entry.timestamp) <= ttl);

        if self.entries.len() > self.capacity {
            let mut by_age: Vec<(DateTime<Utc>, String)> = self
                .entries
                .values()
                .map(|entry| (entry.timestamp, entry.key.clone()))
                .collect();
            by_age.sort();
            let excess = self.entries.len() - self.capacity;
            for (_, key) in by_age.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }

        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.timestamp) > self.ttl
    }
}
