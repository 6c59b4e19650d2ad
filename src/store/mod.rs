//! Key-value persistence layer
//!
//! Sessions and the global memory list live behind one TTL-aware key-value
//! trait. Two interchangeable backends exist: in-process for development and
//! tests, Postgres for production. Session lifecycle logic sits above this
//! trait and is never duplicated per backend.

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::InMemoryBackend;
pub use postgres::PostgresBackend;

use crate::config::AppConfig;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A stored key and its expiry, as seen by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub key: String,
    /// `None` when the key was written without a TTL
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyEntry {
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Trait for TTL-bound key-value persistence.
///
/// Expired keys must read as absent. Scans may still report keys whose TTL
/// has lapsed but which have not been reclaimed yet.
#[async_trait::async_trait]
pub trait KvBackend: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one, expiring after `ttl`
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove a key. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Every key under `prefix`, including lapsed-but-unreclaimed ones
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyEntry>>;

    /// Prepend a value to a list
    async fn list_push_front(&self, key: &str, value: String) -> Result<()>;

    /// Keep only the first `keep` list items
    async fn list_trim(&self, key: &str, keep: usize) -> Result<()>;

    /// First `count` list items, front first
    async fn list_range(&self, key: &str, count: usize) -> Result<Vec<String>>;

    /// Set the TTL of a whole key (value or list)
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
}

/// Longest expiry ever stored; larger TTLs are clamped to it
const MAX_TTL_DAYS: i64 = 36_500;

pub fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let cap = chrono::Duration::days(MAX_TTL_DAYS);
    let ttl = chrono::Duration::from_std(ttl)
        .ok()
        .filter(|ttl| *ttl <= cap)
        .unwrap_or(cap);
    now.checked_add_signed(ttl).unwrap_or(now)
}

/// Pick the backend from configuration: Postgres when a database URL is set,
/// in-memory otherwise or when the pool cannot be created.
pub fn build_backend(config: &AppConfig) -> Arc<dyn KvBackend> {
    if let Some(url) = config.database_url.as_deref() {
        match PostgresBackend::connect_lazy(url) {
            Ok(backend) => {
                info!("Memory backend: postgres");
                return Arc::new(backend);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres memory backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Memory backend: in-memory");
    Arc::new(InMemoryBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_entry_lapse() {
        let now = Utc::now();
        let lapsed = KeyEntry {
            key: "session:a".to_string(),
            expires_at: Some(now - chrono::Duration::seconds(1)),
        };
        let live = KeyEntry {
            key: "session:b".to_string(),
            expires_at: Some(now + chrono::Duration::seconds(60)),
        };
        let persistent = KeyEntry {
            key: "session:c".to_string(),
            expires_at: None,
        };

        assert!(lapsed.is_lapsed(now));
        assert!(!live.is_lapsed(now));
        assert!(!persistent.is_lapsed(now));
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let now = Utc::now();
        let expiry = expiry_from(now, Duration::from_secs(9_000_000_000_000));
        assert_eq!(expiry, now + chrono::Duration::days(MAX_TTL_DAYS));

        let hour = expiry_from(now, Duration::from_secs(3600));
        assert_eq!(hour, now + chrono::Duration::hours(1));
    }

    #[test]
    fn test_build_backend_defaults_to_memory() {
        let config = AppConfig::default();
        let backend = build_backend(&config);
        assert_eq!(backend.name(), "in-memory");
    }
}
