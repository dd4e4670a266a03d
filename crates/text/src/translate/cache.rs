//! Short-TTL translation cache
//!
//! Keyed by (normalized text, source, target). Partials repeat the same
//! prefix many times per second, so even a tens-of-seconds TTL removes
//! most duplicate provider calls.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use relay_core::normalize;

const MAX_ENTRIES: usize = 4096;

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

pub struct TranslationCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl TranslationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn key(text: &str, source: Option<&str>, target: &str) -> String {
        format!("{}\u{1}{}\u{1}{}", normalize(text), source.unwrap_or(""), target)
    }

    pub fn get(&self, text: &str, source: Option<&str>, target: &str) -> Option<String> {
        let key = Self::key(text, source, target);
        let entries = self.entries.read();
        let entry = entries.get(&key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn put(&self, text: &str, source: Option<&str>, target: &str, value: &str) {
        let key = Self::key(text, source, target);
        let mut entries = self.entries.write();
        if entries.len() >= MAX_ENTRIES {
            let ttl = self.ttl;
            entries.retain(|_, e| e.inserted_at.elapsed() <= ttl);
            if entries.len() >= MAX_ENTRIES {
                entries.clear();
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value: value.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
