//! Convenient re-exports for engine applications

pub use crate::config::{
    DatabaseConfig, DialogConfig, EngineConfig, GeneralConfig, SchedulerConfig, ServicesConfig,
    TelephonyConfig,
};
pub use crate::database::{DatabaseManager, EngineStats};
pub use crate::dialog::{DialogEvent, Endpointer, MediaStreamRouter, PauseAssessment};
pub use crate::error::{EngineError, Result};
pub use crate::orchestrator::{CallEngine, EngineAdapters};
pub use crate::scheduler::{DispatchWorker, Scheduler, WindowMaterializer};
pub use crate::server::{CallEngineServer, CallEngineServerBuilder};

pub use reverie_adapters::{
    AdapterError, CallEvent, CallEventKind, InstructionSet, LanguageModel, SpeechToText,
    Telephony, TextToSpeech,
};
pub use reverie_core::{
    CallId, CallWindow, Clock, DayMode, EntryId, JournalEntry, ManualClock, PhoneCall,
    PhoneCallStatus, PhoneNumber, Profile, Prompt, PromptId, PromptResponse, PromptTemplate,
    ProviderCallSid, Rating, ReflectionSession, ScheduledCall, ScheduledCallId,
    ScheduledCallStatus, SessionId, SessionMethod, SessionStatus, SystemClock, UserId,
};
