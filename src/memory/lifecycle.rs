//! Session lifecycle orchestration
//!
//! Ties the store, the global log, the context builder and the summarizer
//! together. Sessions move NEW → ACTIVE (TTL renewed on every turn) → EXPIRED
//! or DELETED; an expired or unknown id is never resurrected, the caller gets
//! a new one.

use crate::config::MemoryConfig;
use crate::memory::context_builder::{ContextBuilder, ContextConfig};
use crate::memory::facts::FactRecord;
use crate::memory::global_log::{GlobalMemoryLog, GlobalSummaryEntry};
use crate::memory::recall::Recall;
use crate::memory::session::{Message, MessageMetadata, MessageRole, RetrievedContext, Session};
use crate::memory::session_store::{fingerprint, SessionStats, SessionStore};
use crate::memory::summarizer::ConversationSummarizer;
use crate::store::KvBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Parse a caller-supplied session id. Anything but a UUID is unknown.
pub fn parse_session_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
}

/// Portable copy of one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub exported_at: DateTime<Utc>,
    pub user_info: FactRecord,
    pub summary: String,
    pub conversation: Vec<Message>,
    pub stats: ExportStats,
}

impl SessionExport {
    /// `conversation_<id>_<YYYY-MM-DD>.json`
    pub fn filename(&self) -> String {
        format!(
            "conversation_{}_{}.json",
            self.session_id,
            self.exported_at.format("%Y-%m-%d")
        )
    }
}

pub struct SessionLifecycleManager {
    store: SessionStore,
    global: GlobalMemoryLog,
    context: ContextBuilder,
    summarizer: ConversationSummarizer,
    config: MemoryConfig,
}

impl SessionLifecycleManager {
    pub fn new(backend: Arc<dyn KvBackend>, config: MemoryConfig) -> Self {
        Self {
            store: SessionStore::new(backend.clone(), config.clone()),
            global: GlobalMemoryLog::new(backend, config.clone()),
            context: ContextBuilder::with_config(ContextConfig::from(&config)),
            summarizer: ConversationSummarizer::new(
                config.summary_min_messages,
                config.summary_scan_messages,
            ),
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // =============================
    // Session resolution
    // =============================

    /// Keep a live id, otherwise start a new session.
    ///
    /// Fallback: a fresh unpersisted id.
    pub async fn get_or_create(&self, requested: Option<&str>) -> Recall<Uuid> {
        if let Some(id) = requested.and_then(parse_session_id) {
            match self.store.get_session(id).await {
                Recall::Fresh(Some(_)) => return Recall::Fresh(id),
                Recall::Fresh(None) => {
                    debug!("Session {} unknown or expired, starting a new one", fingerprint(id));
                }
                Recall::Degraded { fault, .. } => {
                    return Recall::Degraded {
                        value: Uuid::new_v4(),
                        fault,
                    };
                }
            }
        }

        self.store.create_session(None).await
    }

    // =============================
    // Turn handling
    // =============================

    pub async fn record_question(&self, id: Uuid, question: &str) -> Recall<Option<Session>> {
        self.store
            .append_message(id, MessageRole::User, question.to_string(), None)
            .await
    }

    /// Session context plus a few lines from other recent conversations.
    ///
    /// Fallback: whatever part could be read, possibly empty.
    pub async fn prompt_context(&self, id: Uuid) -> Recall<String> {
        let session = self.store.get_session(id).await;
        let global = self.global.recent_entries(Some(id)).await;
        let fault = session.fault().or(global.fault());

        let session = session.into_value().unwrap_or_else(|| Session::new(id));
        let context = self
            .context
            .build_enhanced_context(&session, global.value());

        debug!(
            session = %fingerprint(id),
            chars = context.len(),
            "Prompt context ready"
        );
        Recall::Fresh(context).degrade(fault)
    }

    /// Append the assistant answer and push a global summary when due.
    pub async fn record_answer(
        &self,
        id: Uuid,
        answer: &str,
        retrieved_context: Vec<RetrievedContext>,
    ) -> Recall<Option<Session>> {
        let metadata = MessageMetadata::with_context(retrieved_context);
        let session = self
            .store
            .append_message(id, MessageRole::Assistant, answer.to_string(), Some(metadata))
            .await;

        if let Some(updated) = session.value() {
            self.maybe_record_global(updated).await;
        }
        session
    }

    /// Record a question/answer pair and return the rebuilt context.
    pub async fn add_turn(&self, id: Uuid, question: &str, answer: &str) -> Recall<String> {
        let asked = self.record_question(id, question).await;
        let answered = self.record_answer(id, answer, Vec::new()).await;
        let fault = asked.fault();

        answered
            .map(|session| {
                session
                    .map(|s| self.context.build_context(&s))
                    .unwrap_or_default()
            })
            .degrade(fault)
    }

    // =============================
    // Summaries and global memory
    // =============================

    /// Fallback: empty.
    pub async fn summarize(&self, id: Uuid) -> Recall<String> {
        self.store.get_session(id).await.map(|session| {
            session
                .map(|s| self.summarizer.summarize(&s))
                .unwrap_or_default()
        })
    }

    /// Record the session's summary globally once the lifetime message count
    /// has crossed another multiple of `global_record_interval` since the last
    /// recording. Returns whether an entry was written.
    pub async fn maybe_record_global(&self, session: &Session) -> bool {
        let total = session.metadata.total_messages;
        let last = session.metadata.last_global_at;
        let interval = self.config.global_record_interval;
        if interval == 0 || total / interval <= last / interval {
            return false;
        }

        let summary = self.summarizer.summarize(session);
        if summary.is_empty() {
            return false;
        }

        self.store
            .save_summary(session.id, summary.clone(), total)
            .await;
        let recorded = self
            .global
            .record(session.id, summary, session.user_info.clone())
            .await;
        !recorded.is_degraded()
    }

    /// Fallback: empty.
    pub async fn recent_global(&self, exclude: Option<Uuid>) -> Recall<Vec<String>> {
        self.global.recent_entries(exclude).await
    }

    pub async fn global_entries(&self, limit: usize) -> Recall<Vec<GlobalSummaryEntry>> {
        self.global.entries(limit).await
    }

    // =============================
    // Maintenance and inspection
    // =============================

    pub async fn cleanup(&self) -> Recall<usize> {
        let removed = self.store.sweep_expired().await;
        info!("Session cleanup removed {} sessions", removed.value());
        removed
    }

    pub async fn delete(&self, id: Uuid) -> Recall<bool> {
        self.store.delete_session(id).await
    }

    /// Whether a live session exists. Fallback: `false`.
    pub async fn validate(&self, id: Uuid) -> Recall<bool> {
        self.store.get_session(id).await.map(|s| s.is_some())
    }

    /// Trailing messages, `history_limit` when no limit is given.
    pub async fn history(&self, id: Uuid, limit: Option<usize>) -> Recall<Vec<Message>> {
        let limit = limit.unwrap_or(self.config.history_limit);
        self.store.history(id, limit).await
    }

    pub async fn session_details(&self, id: Uuid) -> Recall<Option<Session>> {
        self.store.get_session(id).await
    }

    /// Fallback: absent.
    pub async fn export(&self, id: Uuid) -> Recall<Option<SessionExport>> {
        self.store.get_session(id).await.map(|session| {
            session.map(|s| {
                let summary = self.summarizer.summarize(&s);
                SessionExport {
                    session_id: s.id,
                    created_at: s.created_at,
                    last_active: s.last_active,
                    exported_at: Utc::now(),
                    summary,
                    stats: ExportStats {
                        total_messages: s.message_count(),
                        user_messages: s.user_message_count(),
                        assistant_messages: s.assistant_message_count(),
                    },
                    conversation: s.messages().cloned().collect(),
                    user_info: s.user_info,
                }
            })
        })
    }

    pub async fn statistics(&self) -> Recall<SessionStats> {
        self.store.statistics().await
    }
}
