//! LLM adapter: semantic endpointing and rating extraction
//!
//! Two narrow operations, both with structured output: deciding whether a
//! caller has finished answering a prompt, and pulling an integer rating in
//! `{-2..2}` out of a spoken answer.

pub mod live;
pub mod mock;

pub use live::HttpLanguageModel;
pub use mock::RuleBasedLanguageModel;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

/// Verdict on whether the response so far is a complete answer.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionCheck {
    pub is_complete: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

/// A rating pulled from free-form speech; `None` when no usable integer was
/// spoken ("it was okay").
#[derive(Debug, Clone, Deserialize)]
pub struct RatingExtraction {
    pub rating: Option<i8>,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

/// Capability interface for the completion/extraction service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Judge whether `response_so_far` fully answers `prompt`, given how
    /// long the caller has been silent.
    async fn check_completion(
        &self,
        prompt: &str,
        response_so_far: &str,
        pause_seconds: f64,
    ) -> Result<CompletionCheck>;

    /// Extract a `{-2..2}` rating from the response text.
    async fn extract_rating(&self, response_text: &str) -> Result<RatingExtraction>;
}
