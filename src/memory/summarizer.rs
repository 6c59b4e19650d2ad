//! Conversation summarization
//!
//! Deterministic one-line digest of a session: who the visitor is and which
//! broad topics their recent messages touched. Used for the global memory log
//! and the summary endpoint.

use crate::memory::session::Session;

/// Substring triggers and the topic they imply, in output order of discovery
const TOPIC_TRIGGERS: &[(&[&str], &str)] = &[
    (&["project"], "projects"),
    (&["skill", "experience"], "skills"),
    (&["education", "university"], "education"),
    (&["work", "job"], "work experience"),
    (&["interview"], "interview discussion"),
];

/// Summarizes sessions without calling a model
pub struct ConversationSummarizer {
    min_messages: usize,
    scan_messages: usize,
}

impl ConversationSummarizer {
    pub fn new(min_messages: usize, scan_messages: usize) -> Self {
        Self {
            min_messages,
            scan_messages,
        }
    }

    /// Empty when the session has fewer than `min_messages` messages.
    pub fn summarize(&self, session: &Session) -> String {
        if session.message_count() < self.min_messages {
            return String::new();
        }

        let facts = &session.user_info;
        let mut summary = format!(
            "Conversation with {}",
            facts.name.as_deref().unwrap_or("user")
        );
        if let Some(role) = &facts.role {
            summary.push_str(&format!(" ({})", role));
        }
        if let Some(company) = &facts.company {
            summary.push_str(&format!(" from {}", company));
        }

        let topics = self.topics(session);
        if !topics.is_empty() {
            summary.push_str(&format!(". Topics discussed: {}", topics.join(", ")));
        }

        summary.push_str(&format!(". {} messages exchanged.", session.message_count()));
        summary
    }

    /// Topics from the last `scan_messages` user messages, first mention first
    pub fn topics(&self, session: &Session) -> Vec<&'static str> {
        let skip = session.user_message_count().saturating_sub(self.scan_messages);
        let mut topics: Vec<&'static str> = Vec::new();

        for message in session.user_messages().skip(skip) {
            let content = message.content.to_lowercase();
            for (triggers, topic) in TOPIC_TRIGGERS {
                if !topics.contains(topic) && triggers.iter().any(|t| content.contains(t)) {
                    topics.push(topic);
                }
            }
        }

        topics
    }
}

impl Default for ConversationSummarizer {
    fn default() -> Self {
        Self::new(5, 10)
    }
}
