//! Entity types for the call orchestration engine
//!
//! Identifiers are opaque UUID strings wrapped in newtypes so a session id
//! can never be passed where a call id is expected. Status enums carry
//! `as_str`/`parse` pairs for storage, and terminality helpers used by the
//! state machine and the schedulers.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::phone::PhoneNumber;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

id_type!(
    /// Owner of everything else; minted outside the core.
    UserId
);
id_type!(
    /// A reflection session (one journaling conversation).
    SessionId
);
id_type!(
    /// A scheduled outbound call.
    ScheduledCallId
);
id_type!(
    /// A phone call's local identity (distinct from the provider SID).
    CallId
);
id_type!(
    /// An immutable journal entry.
    EntryId
);
id_type!(
    /// A prompt template / prompt snapshot element.
    PromptId
);
id_type!(
    /// The telephony provider's call identifier, assigned exactly once.
    ProviderCallSid
);

/// Per-user profile fields the engine needs; owned externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub phone_number: PhoneNumber,
    pub display_name: String,
    pub name_pronunciation: Option<String>,
    pub timezone: Tz,
    pub include_rating_prompt: bool,
    pub max_retries: u32,
}

impl Profile {
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_retries < 1 {
            return Err(CoreError::precondition("max_retries must be at least 1"));
        }
        Ok(())
    }
}

/// A prompt template as authored by the user; owned externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub prompt_id: PromptId,
    pub user_id: UserId,
    pub prompt_text: String,
    pub position: u32,
    pub active: bool,
    pub is_rating_prompt: bool,
}

/// One element of a session's prompt snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub prompt_id: PromptId,
    pub prompt_text: String,
    pub is_rating: bool,
}

impl Prompt {
    /// The synthetic closing rating prompt appended when the profile asks for
    /// one and no template carries it.
    pub fn synthetic_rating() -> Self {
        Prompt {
            prompt_id: PromptId::new(),
            prompt_text: "On a scale from negative two to positive two, how would you rate \
                          your day overall?"
                .to_string(),
            is_rating: true,
        }
    }
}

/// Day rating in `{-2..2}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(i8);

impl Rating {
    pub fn new(value: i64) -> crate::Result<Self> {
        if (-2..=2).contains(&value) {
            Ok(Rating(value as i8))
        } else {
            Err(CoreError::InvalidRating(value))
        }
    }

    pub fn value(&self) -> i8 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Scheduled calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledCallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ScheduledCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledCallStatus::Pending => "PENDING",
            ScheduledCallStatus::InProgress => "IN_PROGRESS",
            ScheduledCallStatus::Completed => "COMPLETED",
            ScheduledCallStatus::Failed => "FAILED",
            ScheduledCallStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ScheduledCallStatus::Pending),
            "IN_PROGRESS" => Some(ScheduledCallStatus::InProgress),
            "COMPLETED" => Some(ScheduledCallStatus::Completed),
            "FAILED" => Some(ScheduledCallStatus::Failed),
            "CANCELLED" => Some(ScheduledCallStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduledCallStatus::Completed
                | ScheduledCallStatus::Failed
                | ScheduledCallStatus::Cancelled
        )
    }
}

/// A concrete call materialized from an availability window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCall {
    pub id: ScheduledCallId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub phone_number: PhoneNumber,
    pub scheduled_for: DateTime<Utc>,
    pub status: ScheduledCallStatus,
    pub attempt_count: u32,
    pub max_retries: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ScheduledCall {
    /// Whether another dial attempt is allowed once the current failure is
    /// counted: a call with `max_retries = 2` dials at most twice.
    pub fn attempts_remain_after_failure(&self) -> bool {
        self.attempt_count + 1 < self.max_retries
    }
}

// ---------------------------------------------------------------------------
// Reflection sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(SessionStatus::InProgress),
            "COMPLETED" => Some(SessionStatus::Completed),
            "ABANDONED" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMethod {
    Phone,
    Text,
}

impl SessionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMethod::Phone => "PHONE",
            SessionMethod::Text => "TEXT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PHONE" => Some(SessionMethod::Phone),
            "TEXT" => Some(SessionMethod::Text),
            _ => None,
        }
    }
}

/// One journaling conversation. The prompt snapshot is the source of truth
/// for the dialog; the runtime never re-reads templates mid-call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub method: SessionMethod,
    pub status: SessionStatus,
    pub prompts: Vec<Prompt>,
    pub rating: Option<Rating>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Encrypted at rest; see the recording cipher.
    pub recording_url: Option<String>,
}

impl ReflectionSession {
    /// Number of prompts whose answers become `PromptResponse` rows.
    pub fn non_rating_prompt_count(&self) -> usize {
        self.prompts.iter().filter(|p| !p.is_rating).count()
    }
}

/// One answered prompt, 1-based and contiguous within its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    pub session_id: SessionId,
    pub prompt_id: PromptId,
    pub prompt_text: String,
    pub position: u32,
    pub response_text: String,
    pub response_started: DateTime<Utc>,
    pub response_finished: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Phone calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhoneCallStatus {
    Initiated,
    Connected,
    Completed,
    Failed,
    Abandoned,
}

impl PhoneCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhoneCallStatus::Initiated => "INITIATED",
            PhoneCallStatus::Connected => "CONNECTED",
            PhoneCallStatus::Completed => "COMPLETED",
            PhoneCallStatus::Failed => "FAILED",
            PhoneCallStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INITIATED" => Some(PhoneCallStatus::Initiated),
            "CONNECTED" => Some(PhoneCallStatus::Connected),
            "COMPLETED" => Some(PhoneCallStatus::Completed),
            "FAILED" => Some(PhoneCallStatus::Failed),
            "ABANDONED" => Some(PhoneCallStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhoneCallStatus::Completed | PhoneCallStatus::Failed | PhoneCallStatus::Abandoned
        )
    }

    /// Legal transitions; terminal statuses are sticky.
    pub fn can_transition_to(&self, next: PhoneCallStatus) -> bool {
        use PhoneCallStatus::*;
        matches!(
            (self, next),
            (Initiated, Connected) | (Initiated, Failed) | (Connected, Completed)
                | (Connected, Abandoned)
                | (Connected, Failed)
        )
    }
}

/// Per-call runtime state; the sole source of truth during an active call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneCall {
    pub id: CallId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub provider_call_sid: Option<ProviderCallSid>,
    pub status: PhoneCallStatus,
    pub prompts: Vec<Prompt>,
    pub current_prompt_index: usize,
    pub current_response_buffer: String,
    pub last_speech_time: DateTime<Utc>,
    pub initiated_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PhoneCall {
    pub fn current_prompt(&self) -> Option<&Prompt> {
        self.prompts.get(self.current_prompt_index)
    }

    /// All prompts have been spoken and answered.
    pub fn prompts_exhausted(&self) -> bool {
        self.current_prompt_index >= self.prompts.len()
    }
}

// ---------------------------------------------------------------------------
// Journal entries
// ---------------------------------------------------------------------------

/// Immutable journal entry keyed by (user, local date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub local_date: NaiveDate,
    pub rating: Option<Rating>,
    pub responses: Vec<PromptResponse>,
    pub created_at: DateTime<Utc>,
}
