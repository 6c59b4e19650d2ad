//! Answer generation
//!
//! The conversation flow only depends on the [`Generator`] trait. The default
//! implementation calls Gemini with a first-person "digital twin" system
//! prompt, using a long-lived reqwest::Client for connection pooling.

use crate::error::TwinError;
use crate::memory::session::RetrievedContext;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// A generated answer and the profile snippets it was grounded on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub response: String,
    pub context: Vec<RetrievedContext>,
}

/// Produces an answer for a question given the rendered conversation context
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str, context: &str) -> Result<Generation>;
}

/// Reusable Gemini client (connection-pooled)
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    /// Name the twin answers as
    persona: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, persona: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_URL.to_string(),
            persona,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait::async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<Generation> {
        if self.api_key.is_empty() {
            return Err(TwinError::GenerationError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(question, context),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 500,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: build_system_prompt(&self.persona),
                }],
            },
        };

        info!("Calling Gemini API ({} chars of context)", context.len());

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            error!("Gemini API request failed: {}", e);
            TwinError::GenerationError(format!("Gemini API error: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response ({}): {}", status, error_text);
            return Err(TwinError::GenerationError(format!(
                "Gemini API returned {}",
                status
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            TwinError::GenerationError(format!("Gemini parse error: {}", e))
        })?;

        let answer = first_answer(&gemini_response)
            .ok_or_else(|| TwinError::GenerationError("Empty response from Gemini".to_string()))?;

        Ok(Generation {
            response: answer,
            context: Vec::new(),
        })
    }
}

fn build_system_prompt(persona: &str) -> String {
    format!(
        "You are {}'s digital twin. Answer questions as if you are the person, \
         speaking in first person about your background, skills, and experience. \
         Stay professional and concise. Use the conversation context to keep \
         continuity with the visitor, but never invent facts about them.",
        persona
    )
}

fn build_prompt(question: &str, context: &str) -> String {
    if context.trim().is_empty() {
        format!("Question: {}\n\nProvide a helpful, professional response:", question)
    } else {
        format!(
            "Conversation so far:\n{}\n\nQuestion: {}\n\nProvide a helpful, professional response:",
            context, question
        )
    }
}

fn first_answer(response: &GeminiResponse) -> Option<String> {
    response
        .candidates
        .first()?
        .content
        .parts
        .first()
        .map(|part| part.text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
