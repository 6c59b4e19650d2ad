//! In-process key-value backend
//!
//! Expired entries read as absent but stay in the map until they are
//! overwritten or explicitly deleted, so the expiry sweep has work to do just
//! as it would against an external store.

use crate::store::{expiry_from, KeyEntry, KvBackend};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct ValueEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct ListEntry {
    items: VecDeque<String>,
    expires_at: Option<DateTime<Utc>>,
}

fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map_or(true, |at| at > now)
}

/// In-memory backend for development and tests
pub struct InMemoryBackend {
    values: Arc<RwLock<HashMap<String, ValueEntry>>>,
    lists: Arc<RwLock<HashMap<String, ListEntry>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
            lists: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KvBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().await;
        let now = Utc::now();

        Ok(values
            .get(key)
            .filter(|entry| is_live(entry.expires_at, now))
            .map(|entry| entry.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut values = self.values.write().await;
        values.insert(
            key.to_string(),
            ValueEntry {
                value,
                expires_at: Some(expiry_from(Utc::now(), ttl)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Utc::now();

        let removed_value = {
            let mut values = self.values.write().await;
            values
                .remove(key)
                .map_or(false, |entry| is_live(entry.expires_at, now))
        };

        let removed_list = {
            let mut lists = self.lists.write().await;
            lists
                .remove(key)
                .map_or(false, |entry| is_live(entry.expires_at, now))
        };

        Ok(removed_value || removed_list)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyEntry>> {
        let values = self.values.read().await;

        let mut entries: Vec<KeyEntry> = values
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyEntry {
                key: key.clone(),
                expires_at: entry.expires_at,
            })
            .collect();

        // Stable order keeps sampling deterministic
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn list_push_front(&self, key: &str, value: String) -> Result<()> {
        let mut lists = self.lists.write().await;
        let now = Utc::now();

        let entry = lists.entry(key.to_string()).or_default();
        if !is_live(entry.expires_at, now) {
            *entry = ListEntry::default();
        }
        entry.items.push_front(value);
        Ok(())
    }

    async fn list_trim(&self, key: &str, keep: usize) -> Result<()> {
        let mut lists = self.lists.write().await;
        if let Some(entry) = lists.get_mut(key) {
            entry.items.truncate(keep);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let lists = self.lists.read().await;
        let now = Utc::now();

        Ok(lists
            .get(key)
            .filter(|entry| is_live(entry.expires_at, now))
            .map(|entry| entry.items.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let expires_at = Some(expiry_from(Utc::now(), ttl));

        {
            let mut lists = self.lists.write().await;
            if let Some(entry) = lists.get_mut(key) {
                entry.expires_at = expires_at;
            }
        }

        let mut values = self.values.write().await;
        if let Some(entry) = values.get_mut(key) {
            entry.expires_at = expires_at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = InMemoryBackend::new();
        assert_ok!(
            backend
                .set_with_ttl("session:1", "{}".to_string(), Duration::from_secs(60))
                .await
        );

        assert_eq!(backend.get("session:1").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(backend.get("session:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_value_reads_absent_but_scans() {
        let backend = InMemoryBackend::new();
        backend
            .set_with_ttl("session:1", "{}".to_string(), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(backend.get("session:1").await.unwrap(), None);

        let keys = backend.scan_prefix("session:").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].is_lapsed(Utc::now()));

        // Reclaiming a lapsed key is not a live delete
        assert!(!backend.delete("session:1").await.unwrap());
        assert!(backend.scan_prefix("session:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_live_removal() {
        let backend = InMemoryBackend::new();
        backend
            .set_with_ttl("session:1", "{}".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(backend.delete("session:1").await.unwrap());
        assert!(!backend.delete("session:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_push_trim_range() {
        let backend = InMemoryBackend::new();
        for i in 0..5 {
            backend.list_push_front("log", format!("e{}", i)).await.unwrap();
        }
        backend.list_trim("log", 3).await.unwrap();

        let items = backend.list_range("log", 10).await.unwrap();
        assert_eq!(items, vec!["e4", "e3", "e2"]);
        assert_eq!(backend.list_range("log", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_list_restarts_on_push() {
        let backend = InMemoryBackend::new();
        backend.list_push_front("log", "old".to_string()).await.unwrap();
        backend.expire("log", Duration::ZERO).await.unwrap();

        assert!(backend.list_range("log", 10).await.unwrap().is_empty());

        backend.list_push_front("log", "new".to_string()).await.unwrap();
        assert_eq!(backend.list_range("log", 10).await.unwrap(), vec!["new"]);
    }
}
