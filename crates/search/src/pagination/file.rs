//! A cursor cache persisted to a JSON file.
//!
//! One-shot processes such as the `sgw` CLI open a cursor in one invocation
//! and resume it in the next, so the entries have to outlive the process.
//! Expiry is stored as wall-clock milliseconds since the Unix epoch.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::CursorCache;

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry<T> {
    value: T,
    expires_at_ms: u64,
}

type Entries<T> = HashMap<String, StoredEntry<T>>;

/// A cursor cache shared by every process pointed at the same file.
///
/// Each operation reads the file, applies its change and writes the file
/// back through a temporary sibling and a rename. Expired entries are
/// dropped whenever the file is rewritten. I/O failures are logged and
/// behave like a miss.
#[derive(Debug)]
pub struct FileCursorCache<T> {
    path: PathBuf,
    ttl: Duration,
    lock: Mutex<()>,
    _value: PhantomData<fn() -> T>,
}

impl<T> FileCursorCache<T> {
    /// Creates a cache stored at `path` whose entries live for `ttl`.
    ///
    /// The file is created on the first `put`.
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            lock: Mutex::new(()),
            _value: PhantomData,
        }
    }

    /// Returns the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> FileCursorCache<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Entries<T> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return HashMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to read cursor cache");
                return HashMap::new();
            }
        };
        if raw.trim().is_empty() {
            return HashMap::new();
        }
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), error = %err, "Discarding unreadable cursor cache");
            HashMap::new()
        })
    }

    fn save(&self, entries: &Entries<T>) {
        if let Err(err) = self.write(entries) {
            warn!(path = %self.path.display(), error = %err, "Failed to write cursor cache");
        }
    }

    fn write(&self, entries: &Entries<T>) -> io::Result<()> {
        let json = serde_json::to_vec(entries).map_err(io::Error::other)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[async_trait]
impl<T> CursorCache<T> for FileCursorCache<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn get(&self, token: &str) -> Option<T> {
        let _guard = self.lock.lock();
        let now = now_ms();
        let mut entries = self.load();
        match entries.get(token) {
            Some(entry) if entry.expires_at_ms > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(token);
                entries.retain(|_, entry| entry.expires_at_ms > now);
                self.save(&entries);
                None
            }
            None => None,
        }
    }

    async fn put(&self, token: &str, value: T) {
        let _guard = self.lock.lock();
        let now = now_ms();
        let mut entries = self.load();
        entries.retain(|_, entry| entry.expires_at_ms > now);
        entries.insert(
            token.to_string(),
            StoredEntry {
                value,
                expires_at_ms: now.saturating_add(self.ttl.as_millis() as u64),
            },
        );
        self.save(&entries);
    }

    async fn delete(&self, token: &str) {
        let _guard = self.lock.lock();
        let mut entries = self.load();
        if entries.remove(token).is_some() {
            self.save(&entries);
        }
    }
}
