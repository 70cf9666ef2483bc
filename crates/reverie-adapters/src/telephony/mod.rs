//! Telephony provider adapter
//!
//! The engine drives calls through a managed telephony provider: it places
//! outbound calls over the provider's REST API, answers webhooks with XML
//! instruction documents, and receives inbound audio as JSON-framed μ-law
//! over a WebSocket media stream.

pub mod instructions;
pub mod live;
pub mod media;
pub mod mock;
pub mod signature;

pub use instructions::{Action, InstructionSet};
pub use live::HttpTelephony;
pub use media::{MediaFrame, MediaStreamMessage, StartFrame, StopFrame};
pub use mock::MockTelephony;

use async_trait::async_trait;
use reverie_core::{PhoneNumber, ProviderCallSid};

use crate::error::Result;

/// Provider-reported call progress, parsed from status callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventKind {
    Initiated,
    Ringing,
    Answered,
    Completed,
    Busy,
    NoAnswer,
    Failed,
}

impl CallEventKind {
    /// Parse the provider's `CallStatus` values. `queued` maps to initiated
    /// and `in-progress` to answered; `canceled` is a failed dial.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "initiated" | "queued" => Some(CallEventKind::Initiated),
            "ringing" => Some(CallEventKind::Ringing),
            "answered" | "in-progress" => Some(CallEventKind::Answered),
            "completed" => Some(CallEventKind::Completed),
            "busy" => Some(CallEventKind::Busy),
            "no-answer" => Some(CallEventKind::NoAnswer),
            "failed" | "canceled" => Some(CallEventKind::Failed),
            _ => None,
        }
    }

    /// Dial outcomes that count as a failed attempt.
    pub fn is_dial_failure(&self) -> bool {
        matches!(
            self,
            CallEventKind::Busy | CallEventKind::NoAnswer | CallEventKind::Failed
        )
    }
}

/// A parsed provider callback.
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub sid: ProviderCallSid,
    pub kind: CallEventKind,
    pub from: Option<String>,
    pub to: Option<String>,
    pub raw_status: String,
}

/// Capability interface for the telephony provider.
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Place an outbound call. The provider acknowledges synchronously with
    /// the call SID; webhooks fire only after this returns, so callers can
    /// persist the SID before the first answer event.
    async fn place_call(
        &self,
        to: &PhoneNumber,
        from: &PhoneNumber,
        answer_url: &str,
        status_url: &str,
    ) -> Result<ProviderCallSid>;

    /// Hang up an active call. Ending an already-ended call is a no-op.
    async fn end_call(&self, sid: &ProviderCallSid) -> Result<()>;

    /// Push a fresh instruction document into a live call (play audio,
    /// redirect, hang up). Rejected once the provider considers the call
    /// completed.
    async fn send_instructions(
        &self,
        sid: &ProviderCallSid,
        instructions: InstructionSet,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_parsing() {
        assert_eq!(CallEventKind::parse("answered"), Some(CallEventKind::Answered));
        assert_eq!(
            CallEventKind::parse("in-progress"),
            Some(CallEventKind::Answered)
        );
        assert_eq!(CallEventKind::parse("no-answer"), Some(CallEventKind::NoAnswer));
        assert_eq!(CallEventKind::parse("queued"), Some(CallEventKind::Initiated));
        assert_eq!(CallEventKind::parse("canceled"), Some(CallEventKind::Failed));
        assert_eq!(CallEventKind::parse("warbling"), None);
    }

    #[test]
    fn dial_failures() {
        assert!(CallEventKind::Busy.is_dial_failure());
        assert!(CallEventKind::NoAnswer.is_dial_failure());
        assert!(CallEventKind::Failed.is_dial_failure());
        assert!(!CallEventKind::Completed.is_dial_failure());
        assert!(!CallEventKind::Answered.is_dial_failure());
    }
}
