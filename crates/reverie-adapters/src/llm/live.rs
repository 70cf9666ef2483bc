//! Live LLM client (chat completion with JSON output)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{with_retries, AdapterError, Result};

use super::{CompletionCheck, LanguageModel, RatingExtraction};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

const COMPLETION_SYSTEM_PROMPT: &str = "You judge whether a spoken answer to a journaling \
prompt is complete. Respond with JSON: {\"is_complete\": bool, \"confidence\": number in \
[0,1], \"reason\": string}. Short answers can be complete; trailing conjunctions or cut-off \
phrases are not.";

const RATING_SYSTEM_PROMPT: &str = "You extract an integer day-rating between -2 and 2 from a \
spoken answer. Respond with JSON: {\"rating\": integer or null, \"confidence\": number in \
[0,1], \"reason\": string}. Use null when no clear integer in that range was expressed.";

/// Chat-completions client configured for deterministic structured output.
pub struct HttpLanguageModel {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: serde_json::Value,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpLanguageModel {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn structured_call<T: for<'de> Deserialize<'de>>(
        &self,
        system: &str,
        user: String,
    ) -> Result<T> {
        let content = with_retries(RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
            let user = user.clone();
            async move {
                let request = ChatRequest {
                    model: &self.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: system.to_string(),
                        },
                        ChatMessage {
                            role: "user",
                            content: user,
                        },
                    ],
                    temperature: 0.0,
                    response_format: json!({"type": "json_object"}),
                };

                let resp = self
                    .http
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&request)
                    .send()
                    .await?;

                let status = resp.status();
                if !status.is_success() {
                    return Err(AdapterError::from_status(status.as_u16(), "llm"));
                }

                let body: ChatResponse = resp.json().await?;
                body.choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| AdapterError::permanent("llm returned no choices"))
            }
        })
        .await?;

        debug!("LLM structured response: {content}");
        serde_json::from_str(&content).map_err(Into::into)
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn check_completion(
        &self,
        prompt: &str,
        response_so_far: &str,
        pause_seconds: f64,
    ) -> Result<CompletionCheck> {
        let user = format!(
            "Prompt: {prompt}\nAnswer so far: {response_so_far}\nSeconds of silence: {pause_seconds:.1}"
        );
        self.structured_call(COMPLETION_SYSTEM_PROMPT, user).await
    }

    async fn extract_rating(&self, response_text: &str) -> Result<RatingExtraction> {
        let extraction: RatingExtraction = self
            .structured_call(RATING_SYSTEM_PROMPT, response_text.to_string())
            .await?;

        // Never trust an out-of-range integer from the model.
        if let Some(rating) = extraction.rating {
            if !(-2..=2).contains(&rating) {
                return Ok(RatingExtraction {
                    rating: None,
                    confidence: 0.0,
                    reason: format!("model produced out-of-range rating {rating}"),
                });
            }
        }
        Ok(extraction)
    }
}
