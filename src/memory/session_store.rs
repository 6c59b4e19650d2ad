//! Session persistence
//!
//! One JSON record per session under `session:<uuid>`, rewritten with a fresh
//! TTL on every mutation. Appends are read-modify-write on a single key, so
//! concurrent appends to the same session are last-write-wins.
//!
//! Public operations return [`Recall`]: backend failures and timeouts are
//! logged and replaced by each operation's documented default.

use crate::config::MemoryConfig;
use crate::error::TwinError;
use crate::memory::facts::FactExtractor;
use crate::memory::recall::Recall;
use crate::memory::session::{Message, MessageMetadata, MessageRole, Session};
use crate::store::KvBackend;
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SESSION_KEY_PREFIX: &str = "session:";

pub fn session_key(id: Uuid) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, id)
}

/// Short, non-reversible tag for a session id in logs
pub fn fingerprint(id: Uuid) -> String {
    let hash = Sha256::digest(id.as_bytes());
    hex::encode(&hash[..4])
}

/// Approximate aggregate counters
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Stored session keys, including lapsed ones not yet reclaimed
    pub total_sessions: usize,
    /// Extrapolated from the sample
    pub total_messages: usize,
    /// Extrapolated from the sample
    pub active_last_24h: usize,
    /// Live session keys
    pub current_active: usize,
    /// Sessions actually loaded to compute the estimates
    pub sampled: usize,
}

pub struct SessionStore {
    backend: Arc<dyn KvBackend>,
    config: MemoryConfig,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KvBackend>, config: MemoryConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    // =============================
    // Public operations
    // =============================

    /// Get-or-create. A live session under `id` is returned untouched.
    ///
    /// Fallback: the requested (or a freshly allocated) id, unpersisted.
    pub async fn create_session(&self, id: Option<Uuid>) -> Recall<Uuid> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        Recall::from_result("create session", self.try_create_session(id).await, id)
    }

    /// Fallback: absent.
    pub async fn get_session(&self, id: Uuid) -> Recall<Option<Session>> {
        Recall::from_result("get session", self.load(id).await, None)
    }

    /// Append a message, creating the session first if needed.
    ///
    /// Fallback: absent (nothing persisted).
    pub async fn append_message(
        &self,
        id: Uuid,
        role: MessageRole,
        content: String,
        metadata: Option<MessageMetadata>,
    ) -> Recall<Option<Session>> {
        let result = self.try_append(id, role, content, metadata).await.map(Some);
        Recall::from_result("append message", result, None)
    }

    /// Persist the latest conversation summary on a live session.
    ///
    /// Returns whether the session existed. Fallback: `false`.
    pub async fn save_summary(&self, id: Uuid, summary: String, at_total: u64) -> Recall<bool> {
        let result = self.try_save_summary(id, summary, at_total).await;
        Recall::from_result("save summary", result, false)
    }

    /// Fallback: `false`.
    pub async fn delete_session(&self, id: Uuid) -> Recall<bool> {
        let key = session_key(id);
        let result = self
            .timed("delete session", self.config.store_timeout, self.backend.delete(&key))
            .await;

        if let Ok(true) = result {
            info!("Deleted session {}", fingerprint(id));
        }
        Recall::from_result("delete session", result, false)
    }

    /// Trailing `limit` messages, oldest first. Fallback: empty.
    pub async fn history(&self, id: Uuid, limit: usize) -> Recall<Vec<Message>> {
        let result = self.load(id).await.map(|session| {
            session
                .map(|s| s.recent_messages(limit).cloned().collect())
                .unwrap_or_default()
        });
        Recall::from_result("load history", result, Vec::new())
    }

    /// Delete every session key whose TTL has lapsed. Fallback: `0`.
    pub async fn sweep_expired(&self) -> Recall<usize> {
        let result = self
            .timed("sweep expired sessions", self.config.scan_timeout, self.try_sweep())
            .await;
        Recall::from_result("sweep expired sessions", result, 0)
    }

    /// Sampled statistics. Fallback: all zero.
    pub async fn statistics(&self) -> Recall<SessionStats> {
        let result = self
            .timed("session statistics", self.config.scan_timeout, self.try_statistics())
            .await;
        Recall::from_result("session statistics", result, SessionStats::default())
    }

    // =============================
    // Internals
    // =============================

    async fn timed<T, F>(&self, operation: &str, deadline: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
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

    /// Load a live session. Unrecoverable records read as absent.
    async fn load(&self, id: Uuid) -> Result<Option<Session>> {
        let key = session_key(id);
        let raw = self
            .timed("get session", self.config.store_timeout, self.backend.get(&key))
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match decode_session(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                warn!("Discarding unreadable session {}: {}", fingerprint(id), error);
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let key = session_key(session.id);
        let value = serde_json::to_string(session)?;
        self.timed(
            "save session",
            self.config.store_timeout,
            self.backend.set_with_ttl(&key, value, self.config.session_ttl),
        )
        .await
    }

    async fn try_create_session(&self, id: Uuid) -> Result<Uuid> {
        if self.load(id).await?.is_some() {
            debug!("Session {} already live", fingerprint(id));
            return Ok(id);
        }

        let session = Session::new(id);
        self.save(&session).await?;
        info!("Created new session {}", fingerprint(id));
        Ok(id)
    }

    async fn try_save_summary(&self, id: Uuid, summary: String, at_total: u64) -> Result<bool> {
        let Some(mut session) = self.load(id).await? else {
            return Ok(false);
        };
        session.conversation_summary = Some(summary);
        session.metadata.last_global_at = at_total;
        self.save(&session).await?;
        Ok(true)
    }

    async fn try_append(
        &self,
        id: Uuid,
        role: MessageRole,
        content: String,
        metadata: Option<MessageMetadata>,
    ) -> Result<Session> {
        let mut session = match self.load(id).await? {
            Some(session) => session,
            None => {
                info!("Session {} missing on append, creating it", fingerprint(id));
                Session::new(id)
            }
        };

        let metadata = match role {
            MessageRole::User => {
                let facts = FactExtractor::extract_text(&content);
                let mut metadata = metadata.unwrap_or_default();
                if !facts.is_empty() {
                    metadata.extracted_facts = Some(facts);
                }
                Some(metadata)
            }
            MessageRole::Assistant => metadata,
        };

        let evicted = session.push_message(
            Message::new(role, content, metadata),
            self.config.max_messages,
        );
        self.save(&session).await?;

        debug!(
            session = %fingerprint(id),
            messages = session.message_count(),
            evicted,
            "Appended {:?} message",
            role
        );
        Ok(session)
    }

    async fn try_sweep(&self) -> Result<usize> {
        let entries = self.backend.scan_prefix(SESSION_KEY_PREFIX).await?;
        let now = Utc::now();
        let mut removed = 0;

        for entry in entries.iter().filter(|e| e.is_lapsed(now)) {
            match self.backend.delete(&entry.key).await {
                Ok(_) => removed += 1,
                Err(error) => {
                    warn!("Could not remove expired key during sweep: {}", error);
                    continue;
                }
            }
        }

        info!("Cleaned up {} expired sessions", removed);
        Ok(removed)
    }

    async fn try_statistics(&self) -> Result<SessionStats> {
        let entries = self.backend.scan_prefix(SESSION_KEY_PREFIX).await?;
        let now = Utc::now();
        let cutoff = now - chrono::Duration::hours(24);

        let live: Vec<_> = entries.iter().filter(|e| !e.is_lapsed(now)).collect();
        let sample_size = live.len().min(self.config.stats_sample_size);

        let mut total_messages = 0usize;
        let mut active_last_24h = 0usize;
        let mut sampled = 0usize;

        for entry in live.iter().take(sample_size) {
            let Some(raw) = self.backend.get(&entry.key).await? else {
                continue;
            };
            // Corrupt records are skipped
            let Ok(session) = decode_session(&raw) else {
                continue;
            };

            sampled += 1;
            total_messages += session.message_count();
            if session.last_active >= cutoff {
                active_last_24h += 1;
            }
        }

        if live.len() > sample_size && sample_size > 0 {
            let ratio = live.len() as f64 / sample_size as f64;
            total_messages = (total_messages as f64 * ratio).round() as usize;
            active_last_24h = (active_last_24h as f64 * ratio).round() as usize;
        }

        Ok(SessionStats {
            total_sessions: entries.len(),
            total_messages,
            active_last_24h,
            current_active: live.len(),
            sampled,
        })
    }
}

// =============================
// Defensive decoding
// =============================

/// Decode a stored session, repairing bad message timestamps when possible.
pub fn decode_session(raw: &str) -> Result<Session> {
    match serde_json::from_str::<Session>(raw) {
        Ok(session) => Ok(session),
        Err(strict_error) => {
            let mut value: Value = serde_json::from_str(raw)
                .map_err(|e| TwinError::CorruptRecord(format!("not JSON: {}", e)))?;

            repair_session(&mut value)?;

            serde_json::from_value::<Session>(value).map_err(|e| {
                TwinError::CorruptRecord(format!(
                    "unrepairable session ({}; after repair: {})",
                    strict_error, e
                ))
            })
        }
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn repair_session(value: &mut Value) -> Result<()> {
    let object = value
        .as_object_mut()
        .ok_or_else(|| TwinError::CorruptRecord("session is not an object".to_string()))?;

    let created_at = object
        .get("createdAt")
        .and_then(parse_timestamp)
        .ok_or_else(|| TwinError::CorruptRecord("createdAt unreadable".to_string()))?;
    object.insert("createdAt".to_string(), Value::String(created_at.to_rfc3339()));

    let last_active = object
        .get("lastActive")
        .and_then(parse_timestamp)
        .unwrap_or(created_at);
    object.insert("lastActive".to_string(), Value::String(last_active.to_rfc3339()));

    let Some(Value::Array(messages)) = object.get_mut("messages") else {
        return Err(TwinError::CorruptRecord("messages missing".to_string()));
    };

    // Drop entries that cannot be messages at all
    messages.retain(|m| {
        m.get("content").map_or(false, Value::is_string) && m.get("role").map_or(false, Value::is_string)
    });

    let mut previous = created_at;
    for message in messages.iter_mut() {
        let timestamp = message
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or(previous);
        previous = timestamp;

        if let Some(fields) = message.as_object_mut() {
            fields.insert("timestamp".to_string(), Value::String(timestamp.to_rfc3339()));
            if !fields.get("id").map_or(false, Value::is_string) {
                fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
            }
        }
    }

    Ok(())
}
