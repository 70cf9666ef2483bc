//! Deterministic rule-based language model
//!
//! Used by tests and local development. Completion judgment is a function of
//! pause length and surface shape; rating extraction is a small number-word
//! parser. Both behave the way the live service is prompted to.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::error::{AdapterError, Result};

use super::{CompletionCheck, LanguageModel, RatingExtraction};

#[derive(Default)]
pub struct RuleBasedLanguageModel {
    fail_next_checks: AtomicU32,
}

impl RuleBasedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` completion checks fail transiently, to exercise the
    /// PAUSE_HARD failsafe.
    pub fn fail_next_completion_checks(&self, n: u32) {
        self.fail_next_checks.store(n, Ordering::SeqCst);
    }
}

fn word_value(token: &str) -> Option<i64> {
    match token {
        "zero" => Some(0),
        "one" => Some(1),
        "two" => Some(2),
        _ => token.parse().ok(),
    }
}

/// Parse a spoken rating: sign words (`negative`, `minus`, `positive`,
/// `plus`) apply to the next number token. Out-of-range values count as no
/// rating at all.
pub fn parse_spoken_rating(text: &str) -> Option<i64> {
    let normalized = text.to_lowercase();
    let mut sign = 1i64;

    for raw in normalized.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        match token {
            "negative" | "minus" => sign = -1,
            "positive" | "plus" => sign = 1,
            _ => {
                if let Some(n) = word_value(token) {
                    let value = if n < 0 { n } else { sign * n };
                    return if (-2..=2).contains(&value) {
                        Some(value)
                    } else {
                        None
                    };
                }
                // A sign word only applies to the number right after it.
                if !token.is_empty() {
                    sign = 1;
                }
            }
        }
    }
    None
}

#[async_trait]
impl LanguageModel for RuleBasedLanguageModel {
    async fn check_completion(
        &self,
        _prompt: &str,
        response_so_far: &str,
        pause_seconds: f64,
    ) -> Result<CompletionCheck> {
        let remaining = self.fail_next_checks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_checks.store(remaining - 1, Ordering::SeqCst);
            return Err(AdapterError::transient("mock llm: injected failure"));
        }

        let trimmed = response_so_far.trim();
        if trimmed.is_empty() {
            return Ok(CompletionCheck {
                is_complete: false,
                confidence: 0.95,
                reason: "nothing said yet".to_string(),
            });
        }

        if pause_seconds >= 8.0 {
            return Ok(CompletionCheck {
                is_complete: true,
                confidence: 0.95,
                reason: "long silence after speech".to_string(),
            });
        }
        if pause_seconds >= 4.0 {
            return Ok(CompletionCheck {
                is_complete: true,
                confidence: 0.85,
                reason: "comfortable pause after speech".to_string(),
            });
        }
        if trimmed.ends_with(['.', '!', '?']) {
            return Ok(CompletionCheck {
                is_complete: true,
                confidence: 0.7,
                reason: "sentence-final punctuation".to_string(),
            });
        }

        Ok(CompletionCheck {
            is_complete: false,
            confidence: 0.8,
            reason: "answer appears to be trailing off".to_string(),
        })
    }

    async fn extract_rating(&self, response_text: &str) -> Result<RatingExtraction> {
        match parse_spoken_rating(response_text) {
            Some(value) => Ok(RatingExtraction {
                rating: Some(value as i8),
                confidence: 0.9,
                reason: format!("heard {value}"),
            }),
            None => Ok(RatingExtraction {
                rating: None,
                confidence: 0.2,
                reason: "no integer rating expressed".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_negative_two() {
        let llm = RuleBasedLanguageModel::new();
        let extraction = llm.extract_rating("negative two").await.unwrap();
        assert_eq!(extraction.rating, Some(-2));
        assert!(extraction.confidence >= 0.5);
    }

    #[tokio::test]
    async fn extracts_zero() {
        let llm = RuleBasedLanguageModel::new();
        let extraction = llm.extract_rating("zero").await.unwrap();
        assert_eq!(extraction.rating, Some(0));
    }

    #[tokio::test]
    async fn okay_is_not_a_rating() {
        let llm = RuleBasedLanguageModel::new();
        let extraction = llm.extract_rating("it was okay").await.unwrap();
        assert_eq!(extraction.rating, None);
        assert!(extraction.confidence < 0.5);
    }

    #[test]
    fn spoken_rating_parsing() {
        assert_eq!(parse_spoken_rating("I'd say negative one"), Some(-1));
        assert_eq!(parse_spoken_rating("minus 2"), Some(-2));
        assert_eq!(parse_spoken_rating("a solid two"), Some(2));
        assert_eq!(parse_spoken_rating("positive one I think"), Some(1));
        assert_eq!(parse_spoken_rating("-1"), Some(-1));
        // Out of range is no rating, not a clamped one.
        assert_eq!(parse_spoken_rating("a ten out of ten"), None);
        assert_eq!(parse_spoken_rating("pretty good day"), None);
    }

    #[tokio::test]
    async fn completion_follows_pause() {
        let llm = RuleBasedLanguageModel::new();

        let check = llm.check_completion("p", "My family", 4.0).await.unwrap();
        assert!(check.is_complete);
        assert!(check.confidence >= 0.6);

        let check = llm.check_completion("p", "My family and", 3.0).await.unwrap();
        assert!(!check.is_complete);

        let check = llm.check_completion("p", "", 10.0).await.unwrap();
        assert!(!check.is_complete);
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let llm = RuleBasedLanguageModel::new();
        llm.fail_next_completion_checks(1);
        assert!(llm.check_completion("p", "words", 4.0).await.is_err());
        assert!(llm.check_completion("p", "words", 4.0).await.is_ok());
    }
}
