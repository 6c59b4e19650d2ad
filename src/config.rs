//! Service configuration
//!
//! Values come from the environment (after `.env` is loaded by the binaries).
//! Every memory constant has a default; see `DESIGN.md` for why these values
//! were chosen where the deployments disagreed.

use crate::error::TwinError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;

/// Tunables for the session and global memory subsystem
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Sliding-window cap on retained messages per session
    pub max_messages: usize,
    /// Messages rendered into the prompt context
    pub recent_turns: usize,
    /// Per-message character budget in the prompt context
    pub max_message_chars: usize,
    /// Label used for assistant turns in the prompt context
    pub assistant_label: String,
    pub session_ttl: Duration,
    /// Default page size for history lookups
    pub history_limit: usize,
    /// Fewer messages than this and a session is not summarized
    pub summary_min_messages: usize,
    /// User messages scanned for summary topics
    pub summary_scan_messages: usize,
    pub global_cap: usize,
    pub global_ttl: Duration,
    /// Entries fetched when rendering global memory
    pub global_fetch: usize,
    /// Global lines included in an enhanced prompt context
    pub global_lines_in_context: usize,
    /// Lifetime message interval at which a session's summary is recorded globally
    pub global_record_interval: u64,
    pub stats_sample_size: usize,
    /// Deadline for single-key store operations
    pub store_timeout: Duration,
    /// Deadline for sweeps and statistics
    pub scan_timeout: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            recent_turns: 6,
            max_message_chars: 150,
            assistant_label: "Assistant".to_string(),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            history_limit: 10,
            summary_min_messages: 5,
            summary_scan_messages: 10,
            global_cap: 20,
            global_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            global_fetch: 10,
            global_lines_in_context: 2,
            global_record_interval: 10,
            stats_sample_size: 100,
            store_timeout: Duration::from_secs(5),
            scan_timeout: Duration::from_secs(30),
        }
    }
}

impl MemoryConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            max_messages: env_or("MEMORY_MAX_MESSAGES", defaults.max_messages)?.max(1),
            recent_turns: env_or("MEMORY_RECENT_TURNS", defaults.recent_turns)?,
            max_message_chars: env_or("MEMORY_MAX_MESSAGE_CHARS", defaults.max_message_chars)?,
            assistant_label: env::var("TWIN_ASSISTANT_LABEL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| defaults.assistant_label.clone()),
            session_ttl: Duration::from_secs(env_or(
                "MEMORY_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?),
            global_cap: env_or("MEMORY_GLOBAL_CAP", defaults.global_cap)?,
            global_ttl: Duration::from_secs(env_or(
                "MEMORY_GLOBAL_TTL_SECS",
                defaults.global_ttl.as_secs(),
            )?),
            stats_sample_size: env_or("MEMORY_STATS_SAMPLE", defaults.stats_sample_size)?.max(1),
            store_timeout: Duration::from_millis(env_or(
                "MEMORY_STORE_TIMEOUT_MS",
                defaults.store_timeout.as_millis() as u64,
            )?),
            ..defaults
        })
    }
}

/// Process-level configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Absent → in-memory backend
    pub database_url: Option<String>,
    pub gemini_api_key: String,
    pub generation_timeout: Duration,
    pub memory: MemoryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            gemini_api_key: String::new(),
            generation_timeout: Duration::from_secs(30),
            memory: MemoryConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .or_else(|_| env::var("API_PORT"))
            .ok()
            .map(|raw| parse_value("PORT", &raw))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let database_url = env::var("DATABASE_URL")
            .or_else(|_| env::var("POSTGRES_URL"))
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            port,
            database_url,
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            memory: MemoryConfig::from_env()?,
            ..Self::default()
        })
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(name, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TwinError::ConfigError(format!("{} has invalid value '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_messages, 50);
        assert_eq!(config.recent_turns, 6);
        assert_eq!(config.global_cap, 20);
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let parsed: Result<usize> = parse_value("MEMORY_MAX_MESSAGES", "fifty");
        assert!(matches!(parsed, Err(TwinError::ConfigError(_))));

        let parsed: usize = parse_value("MEMORY_MAX_MESSAGES", " 20 ").unwrap();
        assert_eq!(parsed, 20);
    }
}
