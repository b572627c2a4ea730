//! Cursor cache contract and the in-memory implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

/// Storage for cursor settings, keyed by cursor token.
///
/// Values are replaced wholesale on every `put`; no operation spans more than
/// one key.
#[async_trait]
pub trait CursorCache<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Returns the settings stored under `token`.
    async fn get(&self, token: &str) -> Option<T>;

    /// Stores `value` under `token`, replacing any previous value.
    async fn put(&self, token: &str, value: T);

    /// Removes the entry for `token`. Missing entries are ignored.
    async fn delete(&self, token: &str);
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// A process-local cursor cache with a fixed time-to-live per entry.
///
/// Expired entries are dropped on access, on every `put` and by
/// [`purge_expired`](Self::purge_expired).
#[derive(Debug)]
pub struct InMemoryCursorCache<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
    ttl: Duration,
}

impl<T> InMemoryCursorCache<T> {
    /// Creates a cache whose entries live for `ttl` after each `put`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops all expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl<T> CursorCache<T> for InMemoryCursorCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, token: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get(token) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(token);
                None
            }
            None => None,
        }
    }

    async fn put(&self, token: &str, value: T) {
        let now = Instant::now();
        let entry = Entry {
            value,
            expires_at: now + self.ttl,
        };
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(token.to_string(), entry);
    }

    async fn delete(&self, token: &str) {
        self.entries.write().remove(token);
    }
}
