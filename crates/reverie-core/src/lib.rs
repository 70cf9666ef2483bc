//! Core types for the reverie voice journaling engine
//!
//! This crate provides the foundational pieces shared by every other crate:
//!
//! - Entity types and their status machines (scheduled calls, reflection
//!   sessions, phone calls, prompt responses, journal entries)
//! - Availability windows and day-mode resolution
//! - The injectable [`Clock`] and timezone-aware local-date helpers
//! - Phone number validation (E.164)
//! - The shared error taxonomy

pub mod clock;
pub mod error;
pub mod phone;
pub mod types;
pub mod windows;

pub use clock::{local_date, local_time, Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use phone::PhoneNumber;
pub use types::{
    CallId, EntryId, JournalEntry, PhoneCall, PhoneCallStatus, Profile, Prompt, PromptId,
    PromptResponse, PromptTemplate, ProviderCallSid, Rating, ReflectionSession, ScheduledCall,
    ScheduledCallId, ScheduledCallStatus, SessionId, SessionMethod, SessionStatus, UserId,
};
pub use windows::{applicable_windows, window_open_at, CallWindow, DayMode, WindowId, WindowKind};
