use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{PackConfig, CONFIG_VERSION};

/// Storage key the configuration record lives under.
pub const CONFIG_KEY: &str = "config";

/// Minimal key-value persistence: one string value per string key.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Base directory for all persisted state: `~/.packfill`
fn store_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".packfill")
}

/// Sanitize a key for use as a filename (letters, digits, hyphens, underscores).
fn sanitize_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches('-');
    if trimmed.is_empty() {
        "key".into()
    } else {
        trimmed.to_string()
    }
}

/// File-backed store, one `<key>.json` document per key.
pub struct FileStore {
    base: PathBuf,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStore {
    pub fn new() -> Self {
        Self { base: store_dir() }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{}.json", sanitize_key(key)))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.base)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("store poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Loads and saves the configuration record through a [`KvStore`].
///
/// Loading is tolerant of absent or corrupt data (falls back to defaults);
/// saving always stamps the current schema version.
pub struct ConfigStore {
    store: Arc<dyn KvStore>,
    key: String,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            key: CONFIG_KEY.to_string(),
        }
    }

    pub fn with_key(store: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn load(&self) -> PackConfig {
        match self.store.get(&self.key) {
            Some(json) => PackConfig::from_json(&json),
            None => {
                debug!(key = %self.key, "no stored config, using defaults");
                PackConfig::default()
            }
        }
    }

    pub fn save(&self, cfg: &PackConfig) -> anyhow::Result<()> {
        let mut stamped = cfg.clone();
        stamped.version = CONFIG_VERSION;
        self.store.set(&self.key, &stamped.to_json())
    }

    /// A debounced save capability bound to this store's key.
    pub fn scheduler(&self, debounce: Duration) -> SaveScheduler {
        SaveScheduler {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            debounce,
            pending: Mutex::new(None),
        }
    }
}

/// Debounced, last-write-wins persistence. Each `schedule` cancels any save
/// still pending from a previous call; callers must not assume the write has
/// happened until the debounce window has elapsed or `flush` was called.
pub struct SaveScheduler {
    store: Arc<dyn KvStore>,
    key: String,
    debounce: Duration,
    pending: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SaveScheduler {
    /// Snapshot `cfg` now, write it after the debounce window. Supersedes any
    /// previously scheduled save.
    pub fn schedule(&self, cfg: &PackConfig) {
        let mut stamped = cfg.clone();
        stamped.version = CONFIG_VERSION;
        let json = stamped.to_json();
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let debounce = self.debounce;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = store.set(&key, &json) {
                warn!(error = %e, key = %key, "debounced config save failed");
            }
        });

        if let Ok(mut pending) = self.pending.lock() {
            if let Some(prev) = pending.replace(handle) {
                prev.abort();
            }
        }
    }

    /// Cancel any pending save and write `cfg` immediately.
    pub fn flush(&self, cfg: &PackConfig) -> anyhow::Result<()> {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(prev) = pending.take() {
                prev.abort();
            }
        }
        let mut stamped = cfg.clone();
        stamped.version = CONFIG_VERSION;
        self.store.set(&self.key, &stamped.to_json())
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(prev) = pending.take() {
                prev.abort();
            }
        }
    }
}
