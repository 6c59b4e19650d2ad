//! Ask flow
//!
//! One visitor question end to end: resolve the session, record the question,
//! render context, generate with a deadline, record the answer. Memory faults
//! never reach the visitor; only a blank question is rejected.

use crate::error::TwinError;
use crate::generation::Generator;
use crate::memory::lifecycle::SessionLifecycleManager;
use crate::memory::session_store::fingerprint;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub const FALLBACK_RESPONSE: &str = "Sorry, I encountered an error. Please try again.";

/// Response for one answered question
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub response: String,
    pub session_id: Uuid,
    /// Retained messages after this turn
    pub conversation_length: usize,
    /// Profile snippets the answer was grounded on
    pub matches: usize,
    /// Set when generation failed and `response` is the fallback text
    #[serde(skip)]
    pub generation_error: Option<String>,
}

pub struct ConversationService {
    memory: Arc<SessionLifecycleManager>,
    generator: Arc<dyn Generator>,
    generation_timeout: Duration,
}

impl ConversationService {
    pub fn new(
        memory: Arc<SessionLifecycleManager>,
        generator: Arc<dyn Generator>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            memory,
            generator,
            generation_timeout,
        }
    }

    pub fn memory(&self) -> &Arc<SessionLifecycleManager> {
        &self.memory
    }

    /// Answer a question within a session, starting one if needed.
    pub async fn ask(&self, question: &str, session_id: Option<&str>) -> Result<AskResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(TwinError::InvalidInput("Question is required".to_string()));
        }

        let id = self.memory.get_or_create(session_id).await.into_value();
        let asked = self.memory.record_question(id, question).await;
        let context = self.memory.prompt_context(id).await.into_value();

        let generated = match tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(question, &context),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TwinError::GenerationError(format!(
                "generation exceeded {}s",
                self.generation_timeout.as_secs()
            ))),
        };

        match generated {
            Ok(generation) => {
                let matches = generation.context.len();
                let answered = self
                    .memory
                    .record_answer(id, &generation.response, generation.context)
                    .await;
                let conversation_length = answered
                    .value()
                    .as_ref()
                    .map_or(0, |session| session.message_count());

                info!(
                    session = %fingerprint(id),
                    conversation_length,
                    matches,
                    "Answered question"
                );

                Ok(AskResponse {
                    response: generation.response,
                    session_id: id,
                    conversation_length,
                    matches,
                    generation_error: None,
                })
            }
            Err(error) => {
                warn!("Generation failed for session {}: {}", fingerprint(id), error);
                let conversation_length = asked
                    .value()
                    .as_ref()
                    .map_or(0, |session| session.message_count());

                Ok(AskResponse {
                    response: FALLBACK_RESPONSE.to_string(),
                    session_id: id,
                    conversation_length,
                    matches: 0,
                    generation_error: Some(error.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::generation::{Generation, Generator};
    use crate::memory::session::RetrievedContext;
    use crate::Result;
    use std::sync::Mutex;

    /// Echoes the question and records every context it was given
    #[derive(Default)]
    pub struct EchoGenerator {
        pub contexts: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, question: &str, context: &str) -> Result<Generation> {
            if let Ok(mut contexts) = self.contexts.lock() {
                contexts.push(context.to_string());
            }
            Ok(Generation {
                response: format!("You asked: {}", question),
                context: vec![RetrievedContext {
                    title: "Experience".to_string(),
                    content: "Ten years of backend work".to_string(),
                    relevance: 0.9,
                }],
            })
        }
    }

    /// Never finishes within a test deadline
    pub struct StallingGenerator;

    #[async_trait::async_trait]
    impl Generator for StallingGenerator {
        async fn generate(&self, _question: &str, _context: &str) -> Result<Generation> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(Generation::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{EchoGenerator, StallingGenerator};
    use super::*;
    use crate::config::MemoryConfig;
    use crate::store::testing::FailingBackend;
    use crate::store::InMemoryBackend;

    fn service_with(generator: Arc<dyn Generator>) -> ConversationService {
        let memory = SessionLifecycleManager::new(
            Arc::new(InMemoryBackend::new()),
            MemoryConfig::default(),
        );
        ConversationService::new(Arc::new(memory), generator, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let service = service_with(Arc::new(EchoGenerator::default()));
        let result = service.ask("   ", None).await;
        assert!(matches!(result, Err(TwinError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_ask_records_turn_and_carries_context() {
        let generator = Arc::new(EchoGenerator::default());
        let service = service_with(generator.clone());

        let first = service
            .ask("Hi, I'm Jane Doe and I work at Acme Corp", None)
            .await
            .unwrap();
        assert_eq!(first.conversation_length, 2);
        assert_eq!(first.matches, 1);
        assert!(first.generation_error.is_none());

        let session_id = first.session_id.to_string();
        let second = service.ask("What do you build?", Some(&session_id)).await.unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.conversation_length, 4);

        let contexts = generator.contexts.lock().unwrap();
        assert!(contexts[1].contains("Name: Jane Doe"));
        assert!(contexts[1].contains("User: What do you build?"));

        let session = service
            .memory()
            .session_details(first.session_id)
            .await
            .into_value()
            .unwrap();
        let answer = session.messages().nth(1).unwrap();
        let metadata = answer.metadata.as_ref().unwrap();
        assert_eq!(metadata.retrieved_context.len(), 1);
    }

    #[tokio::test]
    async fn test_generation_timeout_returns_fallback() {
        let service = service_with(Arc::new(StallingGenerator));
        let response = service.ask("Are you there?", None).await.unwrap();

        assert_eq!(response.response, FALLBACK_RESPONSE);
        assert!(response.generation_error.is_some());
        assert_eq!(response.conversation_length, 1);
    }

    #[tokio::test]
    async fn test_store_outage_still_answers() {
        let memory = SessionLifecycleManager::new(Arc::new(FailingBackend), MemoryConfig::default());
        let service = ConversationService::new(
            Arc::new(memory),
            Arc::new(EchoGenerator::default()),
            Duration::from_millis(200),
        );

        let response = service.ask("What is your stack?", None).await.unwrap();
        assert_eq!(response.response, "You asked: What is your stack?");
        assert_eq!(response.conversation_length, 0);
    }
}
