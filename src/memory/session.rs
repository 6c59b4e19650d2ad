//! Conversation session model
//!
//! A session owns its message log (sliding window, oldest evicted first) and
//! the facts derived from it.

use crate::memory::facts::{FactExtractor, FactRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Profile snippet that grounded an assistant answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedContext {
    pub title: String,
    pub content: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, alias = "context", skip_serializing_if = "Vec::is_empty")]
    pub retrieved_context: Vec<RetrievedContext>,
    #[serde(default, alias = "extractedInfo", skip_serializing_if = "Option::is_none")]
    pub extracted_facts: Option<FactRecord>,
}

impl MessageMetadata {
    pub fn with_context(retrieved_context: Vec<RetrievedContext>) -> Self {
        Self {
            retrieved_context,
            extracted_facts: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.retrieved_context.is_empty() && self.extracted_facts.is_none()
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn new(role: MessageRole, content: String, metadata: Option<MessageMetadata>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            metadata: metadata.filter(|m| !m.is_empty()),
        }
    }
}

/// Free-form session bookkeeping
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Messages ever appended, unaffected by window eviction
    #[serde(default)]
    pub total_messages: u64,
    /// `total_messages` when a summary was last pushed to the global log
    #[serde(default)]
    pub last_global_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One visitor's conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    messages: VecDeque<Message>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub user_info: FactRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: VecDeque::new(),
            created_at: now,
            last_active: now,
            user_info: FactRecord::default(),
            conversation_summary: None,
            metadata: SessionMetadata::default(),
        }
    }

    /// Append a message, evict beyond `cap` and re-derive facts.
    ///
    /// Returns how many messages were evicted.
    pub fn push_message(&mut self, message: Message, cap: usize) -> usize {
        self.messages.push_back(message);
        self.metadata.total_messages += 1;

        let mut evicted = 0;
        while self.messages.len() > cap {
            self.messages.pop_front();
            evicted += 1;
        }

        self.refresh_facts();
        self.last_active = Utc::now();
        evicted
    }

    /// Facts are a pure function of the retained log
    pub fn refresh_facts(&mut self) {
        self.user_info = FactExtractor::extract(self.messages.iter());
    }

    // =============================
    // Iterators
    // =============================

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// The last `count` messages, oldest first
    pub fn recent_messages(&self, count: usize) -> impl Iterator<Item = &Message> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip)
    }

    pub fn user_messages(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == MessageRole::User)
    }

    // =============================
    // Counters
    // =============================

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn user_message_count(&self) -> usize {
        self.user_messages().count()
    }

    pub fn assistant_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
