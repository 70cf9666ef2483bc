//! Turn-endpointing decisions
//!
//! Pause-based thresholds decide most turns; the LLM is only consulted in
//! the band between PAUSE_MIN and PAUSE_HARD for non-rating prompts. The
//! hard threshold is a failsafe that completes a non-empty turn even when
//! the LLM is down.

use std::time::Duration;

use reverie_adapters::CompletionCheck;

use crate::config::DialogConfig;

/// What the pause alone tells us about the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseAssessment {
    /// Keep listening; the caller is (or may still be) talking.
    TooSoon,
    /// Hard threshold reached with content in the buffer: complete.
    Failsafe,
    /// Rating prompts complete on the soft threshold alone.
    RatingReady,
    /// In the judgment band: ask the LLM.
    NeedsJudgment,
}

/// Endpointing policy for one call.
#[derive(Debug, Clone)]
pub struct Endpointer {
    pause_min: Duration,
    pause_hard: Duration,
    completion_confidence: f64,
}

impl Endpointer {
    pub fn new(config: &DialogConfig) -> Self {
        Self {
            pause_min: config.pause_min,
            pause_hard: config.pause_hard,
            completion_confidence: config.completion_confidence,
        }
    }

    /// Assess the turn from the silence length and buffer state alone.
    pub fn assess(&self, pause: Duration, buffer: &str, is_rating: bool) -> PauseAssessment {
        if buffer.trim().is_empty() {
            return PauseAssessment::TooSoon;
        }
        if pause < self.pause_min {
            return PauseAssessment::TooSoon;
        }
        if pause >= self.pause_hard {
            return PauseAssessment::Failsafe;
        }
        if is_rating {
            return PauseAssessment::RatingReady;
        }
        PauseAssessment::NeedsJudgment
    }

    /// Whether an LLM verdict completes the turn.
    pub fn accepts(&self, check: &CompletionCheck) -> bool {
        check.is_complete && check.confidence >= self.completion_confidence
    }
}
