//! Content-addressed request cache.
//!
//! Expensive requests (tool calls against external data sources, model
//! calls) are described by a [`RequestDescription`]. [`build_cache_key`]
//! turns that description into a deterministic key, so two requests that
//! differ only in argument order or prompt whitespace hit the same entry.
//!
//! The cache is read-through reuse only: writes are last-write-wins and two
//! concurrent misses for the same key will both run the underlying request.
//! Entries never expire on their own; callers that want a TTL use
//! [`RequestCache::read_cache_fresh`].

use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, trace, warn};

// ── Keys ───────────────────────────────────────────────────────────

/// Normalized description of a cacheable request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestDescription {
    /// A tool call: tool name plus its JSON arguments.
    Tool { name: String, args: Value },
    /// A model call: model identifier plus the prompt text.
    Model { model: String, prompt: String },
}

impl RequestDescription {
    pub fn tool(name: impl Into<String>, args: Value) -> Self {
        RequestDescription::Tool {
            name: name.into(),
            args,
        }
    }

    pub fn model(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        RequestDescription::Model {
            model: model.into(),
            prompt: prompt.into(),
        }
    }
}

/// Short human-readable label for a request, for logs.
///
/// ```
/// use dexter_core::tools::cache::{RequestDescription, describe_request};
///
/// let desc = RequestDescription::tool("get_prices", serde_json::json!({"ticker": "AAPL"}));
/// assert_eq!(describe_request(&desc), r#"get_prices(ticker="AAPL")"#);
/// ```
pub fn describe_request(desc: &RequestDescription) -> String {
    match desc {
        RequestDescription::Tool { name, args } => {
            let parts: Vec<String> = match args {
                Value::Object(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    keys.into_iter()
                        .map(|k| format!("{k}={}", preview(&map[k].to_string(), 40)))
                        .collect()
                }
                Value::Null => Vec::new(),
                other => vec![preview(&other.to_string(), 40)],
            };
            format!("{name}({})", parts.join(", "))
        }
        RequestDescription::Model { model, prompt } => {
            format!("{model}[{}]", preview(&normalize_prompt(prompt), 60))
        }
    }
}

/// Derive the cache key for a request.
///
/// Tool keys hash the canonical JSON of the arguments (object keys sorted
/// at every depth). Model keys hash the prompt with whitespace runs
/// collapsed. The kind and name stay readable in the key prefix.
pub fn build_cache_key(desc: &RequestDescription) -> String {
    match desc {
        RequestDescription::Tool { name, args } => {
            let mut canonical = String::new();
            write_canonical(args, &mut canonical);
            format!("tool:{name}:{}", sha256_hex(&canonical))
        }
        RequestDescription::Model { model, prompt } => {
            format!("model:{model}:{}", sha256_hex(&normalize_prompt(prompt)))
        }
    }
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Serialize `value` with object keys sorted, independent of how the map
/// preserves insertion order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

// ── RequestCache ───────────────────────────────────────────────────

/// A stored cache value with its key and write time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub stored_at: DateTime<Utc>,
}

/// Thread-safe key/value cache, optionally backed by a directory of JSON
/// files (one per key).
///
/// Share one instance between concurrent runs with an `Arc`. Reads and
/// writes of different keys never block each other for longer than a map
/// lookup; no cross-entry transaction is offered.
#[derive(Debug)]
pub struct RequestCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    dir: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RequestCache {
    /// A cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dir: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A cache persisted under `dir`. Entries are loaded lazily on first
    /// read, so opening a large cache directory is free.
    pub fn persistent(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: Some(dir),
            ..Self::in_memory()
        })
    }

    /// The backing directory, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Look up `key` and deserialize the stored value.
    ///
    /// Returns `None` on a miss, and also when the stored value does not
    /// deserialize as `T` or its backing file is unreadable.
    pub fn read_cache<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lookup(key, None)
    }

    /// Like [`read_cache`](Self::read_cache), but treats entries older than
    /// `ttl` as misses.
    pub fn read_cache_fresh<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        self.lookup(key, Some(ttl))
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn write_cache<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: key.to_string(),
            value: serde_json::to_value(value)?,
            stored_at: Utc::now(),
        };
        if let Some(dir) = &self.dir {
            write_entry_file(dir, &entry)?;
        }
        trace!("[cache] write {key}");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Drop `key` from memory and disk. Returns whether an entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        let removed_file = match &self.dir {
            Some(dir) => std::fs::remove_file(entry_path(dir, key)).is_ok(),
            None => false,
        };
        removed || removed_file
    }

    /// Number of entries currently held in memory.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no entries are held in memory.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    fn lookup<T: DeserializeOwned>(&self, key: &str, ttl: Option<Duration>) -> Option<T> {
        let entry = self.entry(key);
        let fresh = entry.filter(|e| match ttl {
            Some(ttl) => is_fresh(e.stored_at, ttl),
            None => true,
        });

        let value = fresh.and_then(|e| match serde_json::from_value::<T>(e.value) {
            Ok(v) => Some(v),
            Err(err) => {
                warn!("[cache] entry {key} does not match the requested type: {err}");
                None
            }
        });

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("[cache] hit {key}");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("[cache] miss {key}");
        }
        value
    }

    fn entry(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Some(entry.clone());
        }

        let dir = self.dir.as_ref()?;
        let entry = read_entry_file(dir, key)?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| entry.clone());
        Some(entry)
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn is_fresh(stored_at: DateTime<Utc>, ttl: Duration) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => Utc::now().signed_duration_since(stored_at) < ttl,
        // A TTL too large to represent never expires.
        Err(_) => true,
    }
}

// ── File backing ───────────────────────────────────────────────────

fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", sha256_hex(key)))
}

/// Atomic write: serialize to a uniquely named temp file in `dir`, then
/// rename into place. Concurrent writers of one key never share a temp file.
fn write_entry_file(dir: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
    let json = serde_json::to_string_pretty(entry)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(entry_path(dir, &entry.key))
        .map_err(|e| e.error)?;
    Ok(())
}

fn read_entry_file(dir: &Path, key: &str) -> Option<CacheEntry> {
    let path = entry_path(dir, key);
    let json = match std::fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("[cache] unreadable entry at {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str::<CacheEntry>(&json) {
        Ok(entry) if entry.key == key => Some(entry),
        Ok(_) => {
            warn!("[cache] key mismatch in {}", path.display());
            None
        }
        Err(e) => {
            warn!("[cache] skipping malformed entry at {}: {e}", path.display());
            None
        }
    }
}
