//! Conversation Memory System
//!
//! Server-side session memory for the digital twin: per-visitor message logs
//! with derived facts, bounded prompt context, and a small cross-session log
//! of recent conversations.

pub mod context_builder;
pub mod facts;
pub mod global_log;
pub mod lifecycle;
pub mod recall;
pub mod session;
pub mod session_store;
pub mod summarizer;

pub use context_builder::{ContextBuilder, ContextConfig};
pub use facts::{FactExtractor, FactRecord, InterviewType};
pub use global_log::{GlobalMemoryLog, GlobalSummaryEntry};
pub use lifecycle::{parse_session_id, ExportStats, SessionExport, SessionLifecycleManager};
pub use recall::{FaultKind, Recall};
pub use session::{Message, MessageMetadata, MessageRole, RetrievedContext, Session};
pub use session_store::{SessionStats, SessionStore};
pub use summarizer::ConversationSummarizer;
