//! Prompt context rendering
//!
//! Turns a session's facts and most recent turns into a compact string for
//! the generation prompt. This is a summary, not a transcript: only the last
//! few messages are included and each is truncated.

use crate::config::MemoryConfig;
use crate::memory::facts::FactRecord;
use crate::memory::session::{MessageRole, Session};
use tracing::debug;

const FIELD_SEPARATOR: &str = " | ";
const ELLIPSIS: &str = "...";

/// Configuration for context rendering
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Number of trailing messages rendered
    pub recent_turns: usize,
    /// Character budget per rendered message
    pub max_message_chars: usize,
    pub assistant_label: String,
    /// Cross-session lines appended by the enhanced context
    pub global_lines_in_context: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for ContextConfig {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            recent_turns: config.recent_turns,
            max_message_chars: config.max_message_chars,
            assistant_label: config.assistant_label.clone(),
            global_lines_in_context: config.global_lines_in_context,
        }
    }
}

/// Renders session state into prompt context
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Facts line plus recent turns. Empty for a session without messages.
    pub fn build_context(&self, session: &Session) -> String {
        if session.is_empty() {
            return String::new();
        }

        let mut parts: Vec<String> = Vec::with_capacity(self.config.recent_turns + 2);

        if let Some(line) = user_context_line(&session.user_info) {
            parts.push(line);
        }

        parts.push("Conversation Flow:".to_string());
        for message in session.recent_messages(self.config.recent_turns) {
            let role = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => self.config.assistant_label.as_str(),
            };
            parts.push(format!(
                "{}: {}",
                role,
                truncate_chars(&message.content, self.config.max_message_chars)
            ));
        }

        let context = parts.join("\n");
        debug!("Built context of {} chars", context.len());
        context
    }

    /// Session context followed by a few cross-session lines
    pub fn build_enhanced_context(&self, session: &Session, global_lines: &[String]) -> String {
        let mut parts = Vec::with_capacity(2 + self.config.global_lines_in_context);

        let current = self.build_context(session);
        if !current.is_empty() {
            parts.push(current);
        }

        if !global_lines.is_empty() && self.config.global_lines_in_context > 0 {
            parts.push("Other recent topics discussed:".to_string());
            parts.extend(
                global_lines
                    .iter()
                    .take(self.config.global_lines_in_context)
                    .cloned(),
            );
        }

        parts.join("\n\n")
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `User Context: ...` with only the populated fields, or `None`
pub fn user_context_line(facts: &FactRecord) -> Option<String> {
    let mut fields = Vec::new();

    if let Some(name) = &facts.name {
        fields.push(format!("Name: {}", name));
    }
    if let Some(role) = &facts.role {
        fields.push(format!("Role: {}", role));
    }
    if let Some(company) = &facts.company {
        fields.push(format!("Company: {}", company));
    }
    if let Some(email) = &facts.email {
        fields.push(format!("Email: {}", email));
    }
    if let Some(kind) = facts.interview_type {
        fields.push(format!("Interview Type: {}", kind));
    }
    if let Some(experience) = &facts.experience {
        fields.push(format!("Experience: {}", experience));
    }
    if !facts.interests.is_empty() {
        let interests: Vec<&str> = facts.interests.iter().map(String::as_str).collect();
        fields.push(format!("Technical Interests: {}", interests.join(", ")));
    }

    if fields.is_empty() {
        None
    } else {
        Some(format!("User Context: {}", fields.join(FIELD_SEPARATOR)))
    }
}

fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &content[..cut], ELLIPSIS),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::session::Message;
    use uuid::Uuid;

    fn session_with(messages: &[(MessageRole, &str)]) -> Session {
        let mut session = Session::new(Uuid::new_v4());
        for (role, content) in messages {
            session.push_message(Message::new(*role, content.to_string(), None), 50);
        }
        session
    }

    #[test]
    fn test_empty_session_renders_nothing() {
        let builder = ContextBuilder::new();
        let session = Session::new(Uuid::new_v4());
        assert_eq!(builder.build_context(&session), "");
    }

    #[test]
    fn test_facts_line_and_flow() {
        let builder = ContextBuilder::new();
        let session = session_with(&[
            (MessageRole::User, "Hi, I'm Jane Doe and I work at Acme Corp"),
            (MessageRole::Assistant, "Nice to meet you, Jane!"),
        ]);

        let context = builder.build_context(&session);
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines[0], "User Context: Name: Jane Doe | Company: Acme Corp");
        assert_eq!(lines[1], "Conversation Flow:");
        assert_eq!(lines[2], "User: Hi, I'm Jane Doe and I work at Acme Corp");
        assert_eq!(lines[3], "Assistant: Nice to meet you, Jane!");
    }

    #[test]
    fn test_facts_line_omitted_without_facts() {
        let builder = ContextBuilder::new();
        let session = session_with(&[(MessageRole::User, "What are your hobbies?")]);

        let context = builder.build_context(&session);
        assert!(context.starts_with("Conversation Flow:"));
        assert!(!context.contains("User Context"));
    }

    #[test]
    fn test_only_last_turns_rendered() {
        let builder = ContextBuilder::new();
        let messages: Vec<(MessageRole, String)> = (0..10)
            .map(|i| (MessageRole::User, format!("question {}", i)))
            .collect();
        let borrowed: Vec<(MessageRole, &str)> =
            messages.iter().map(|(r, c)| (*r, c.as_str())).collect();
        let session = session_with(&borrowed);

        let context = builder.build_context(&session);
        let flow: Vec<&str> = context.lines().skip(1).collect();
        assert_eq!(flow.len(), 6);
        assert_eq!(flow[0], "User: question 4");
        assert_eq!(flow[5], "User: question 9");
    }

    #[test]
    fn test_long_messages_truncated_on_char_boundary() {
        let builder = ContextBuilder::new();
        let long = "é".repeat(200);
        let session = session_with(&[(MessageRole::User, long.as_str())]);

        let context = builder.build_context(&session);
        let line = context.lines().nth(1).unwrap();
        let body = line.trim_start_matches("User: ");
        assert!(body.ends_with("..."));
        assert_eq!(body.trim_end_matches("...").chars().count(), 150);
    }

    #[test]
    fn test_enhanced_context_limits_global_lines() {
        let builder = ContextBuilder::new();
        let session = session_with(&[(MessageRole::User, "Hello")]);
        let global = vec![
            "Recently talked with someone: a".to_string(),
            "Recently talked with someone: b".to_string(),
            "Recently talked with someone: c".to_string(),
        ];

        let context = builder.build_enhanced_context(&session, &global);
        assert!(context.contains("Other recent topics discussed:"));
        assert!(context.contains(": a"));
        assert!(context.contains(": b"));
        assert!(!context.contains(": c"));
    }

    #[test]
    fn test_custom_assistant_label() {
        let builder = ContextBuilder::with_config(ContextConfig {
            assistant_label: "Earl".to_string(),
            ..ContextConfig::default()
        });
        let session = session_with(&[(MessageRole::Assistant, "I build AR apps")]);
        assert!(builder.build_context(&session).contains("Earl: I build AR apps"));
    }
}
