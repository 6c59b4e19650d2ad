//! Cross-session memory
//!
//! A short, newest-first list of conversation summaries shared by every
//! session, so the assistant can mention other recent visitors. The list has
//! its own TTL and never grows past `global_cap` entries.

use crate::config::MemoryConfig;
use crate::error::TwinError;
use crate::memory::facts::FactRecord;
use crate::memory::recall::Recall;
use crate::memory::session_store::fingerprint;
use crate::store::KvBackend;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const GLOBAL_KEY: &str = "global-conversations";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSummaryEntry {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub user_info: FactRecord,
    /// `YYYY-MM-DD`
    pub conversation_date: String,
}

impl GlobalSummaryEntry {
    pub fn new(session_id: Uuid, summary: String, user_info: FactRecord) -> Self {
        let timestamp = Utc::now();
        Self {
            session_id,
            timestamp,
            summary,
            user_info,
            conversation_date: timestamp.format("%Y-%m-%d").to_string(),
        }
    }

    /// `Recently talked with Jane Doe (recruiter): ...`
    pub fn render(&self) -> String {
        let who = match (&self.user_info.name, &self.user_info.role) {
            (Some(name), Some(role)) => format!("{} ({})", name, role),
            (Some(name), None) => name.clone(),
            (None, _) => "someone".to_string(),
        };
        format!("Recently talked with {}: {}", who, self.summary)
    }
}

pub struct GlobalMemoryLog {
    backend: Arc<dyn KvBackend>,
    config: MemoryConfig,
}

impl GlobalMemoryLog {
    pub fn new(backend: Arc<dyn KvBackend>, config: MemoryConfig) -> Self {
        Self { backend, config }
    }

    /// Push a summary, refresh the list TTL and trim to the cap.
    pub async fn record(&self, session_id: Uuid, summary: String, facts: FactRecord) -> Recall<()> {
        let entry = GlobalSummaryEntry::new(session_id, summary, facts);
        let result = self.try_record(&entry).await;
        if result.is_ok() {
            info!("Stored global conversation summary for session {}", fingerprint(session_id));
        }
        Recall::from_result("record global summary", result, ())
    }

    /// Rendered lines for the newest entries, excluding one session.
    ///
    /// Fallback: empty.
    pub async fn recent_entries(&self, exclude: Option<Uuid>) -> Recall<Vec<String>> {
        let result = self.fetch(self.config.global_fetch).await.map(|entries| {
            entries
                .into_iter()
                .filter(|entry| Some(entry.session_id) != exclude)
                .map(|entry| entry.render())
                .collect()
        });
        Recall::from_result("load global conversations", result, Vec::new())
    }

    /// Typed entries, newest first. Fallback: empty.
    pub async fn entries(&self, limit: usize) -> Recall<Vec<GlobalSummaryEntry>> {
        let result = self.fetch(limit.min(self.config.global_cap)).await;
        Recall::from_result("list global conversations", result, Vec::new())
    }

    async fn timed<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = self.config.store_timeout;
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(TwinError::Timeout(format!(
                "{} exceeded {}ms on {} backend",
                operation,
                deadline.as_millis(),
                self.backend.name()
            ))),
        }
    }

    async fn try_record(&self, entry: &GlobalSummaryEntry) -> Result<()> {
        let value = serde_json::to_string(entry)?;
        self.timed("record global summary", self.push_bounded(value))
            .await
    }

    async fn push_bounded(&self, value: String) -> Result<()> {
        self.backend.list_push_front(GLOBAL_KEY, value).await?;
        self.backend.expire(GLOBAL_KEY, self.config.global_ttl).await?;
        self.backend.list_trim(GLOBAL_KEY, self.config.global_cap).await
    }

    async fn fetch(&self, count: usize) -> Result<Vec<GlobalSummaryEntry>> {
        let raw = self
            .timed("load global conversations", self.backend.list_range(GLOBAL_KEY, count))
            .await?;

        let total = raw.len();
        let entries: Vec<GlobalSummaryEntry> = raw
            .iter()
            .filter_map(|item| serde_json::from_str(item).ok())
            .collect();

        if entries.len() < total {
            debug!("Skipped {} malformed global entries", total - entries.len());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::recall::FaultKind;
    use crate::store::testing::FailingBackend;
    use crate::store::InMemoryBackend;

    fn log_with(config: MemoryConfig) -> (GlobalMemoryLog, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        (GlobalMemoryLog::new(backend.clone(), config), backend)
    }

    fn named(name: &str, role: Option<&str>) -> FactRecord {
        FactRecord {
            name: Some(name.to_string()),
            role: role.map(str::to_string),
            ..FactRecord::default()
        }
    }

    #[tokio::test]
    async fn test_list_is_bounded_and_newest_first() {
        let (log, _) = log_with(MemoryConfig {
            global_cap: 5,
            global_fetch: 5,
            ..MemoryConfig::default()
        });

        for i in 0..10 {
            log.record(Uuid::new_v4(), format!("summary {}", i), FactRecord::default())
                .await;
        }

        let entries = log.entries(100).await.into_value();
        let summaries: Vec<&str> = entries.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["summary 9", "summary 8", "summary 7", "summary 6", "summary 5"]
        );
    }

    #[tokio::test]
    async fn test_own_session_excluded() {
        let (log, _) = log_with(MemoryConfig::default());
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();

        log.record(mine, "my chat".to_string(), named("Jane Doe", None)).await;
        log.record(theirs, "their chat".to_string(), named("Sam", Some("recruiter")))
            .await;

        let lines = log.recent_entries(Some(mine)).await.into_value();
        assert_eq!(lines, vec!["Recently talked with Sam (recruiter): their chat".to_string()]);

        let all = log.recent_entries(None).await.into_value();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_entries_skipped() {
        let (log, backend) = log_with(MemoryConfig::default());
        log.record(Uuid::new_v4(), "valid".to_string(), FactRecord::default())
            .await;
        backend
            .list_push_front(GLOBAL_KEY, "{broken".to_string())
            .await
            .unwrap();

        let lines = log.recent_entries(None).await;
        assert!(!lines.is_degraded());
        assert_eq!(
            lines.into_value(),
            vec!["Recently talked with someone: valid".to_string()]
        );
    }

    #[tokio::test]
    async fn test_outage_degrades_to_empty() {
        let log = GlobalMemoryLog::new(Arc::new(FailingBackend), MemoryConfig::default());

        let recorded = log
            .record(Uuid::new_v4(), "x".to_string(), FactRecord::default())
            .await;
        assert_eq!(recorded.fault(), Some(FaultKind::Unavailable));

        let lines = log.recent_entries(None).await;
        assert!(lines.is_degraded());
        assert!(lines.into_value().is_empty());
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = GlobalSummaryEntry::new(Uuid::new_v4(), "s".to_string(), FactRecord::default());
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("sessionId").is_some());
        assert_eq!(json["conversationDate"].as_str().unwrap().len(), 10);
    }
}
