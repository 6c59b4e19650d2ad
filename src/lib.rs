//! Digital Twin Memory Service
//!
//! Server-side conversation memory for a portfolio "digital twin" chatbot:
//! - TTL-bound sessions with a sliding message window
//! - Pattern-based extraction of visitor facts (name, role, company, ...)
//! - Bounded prompt context built from facts and recent turns
//! - A small cross-session log of recent conversations
//! - Graceful degradation: memory faults never block an answer
//!
//! ASK FLOW:
//! RESOLVE SESSION → RECORD QUESTION → BUILD CONTEXT → GENERATE → RECORD ANSWER

pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod generation;
pub mod memory;
pub mod store;

pub use error::Result;

// Re-export common types
pub use config::{AppConfig, MemoryConfig};
pub use conversation::{AskResponse, ConversationService};
pub use error::TwinError;
pub use generation::{GeminiGenerator, Generation, Generator};
pub use memory::{Recall, SessionLifecycleManager};
pub use store::{build_backend, KvBackend};
