//! Call orchestration
//!
//! The [`CallEngine`] is the central coordinator: it owns the database
//! manager, the external-service adapters, and the live-call registry, and
//! it carries the call state machine through provider webhooks, the dialog
//! runtime, and the schedulers.
//!
//! - [`core`]: the engine struct, adapter wiring, and dialog task spawning
//! - [`lifecycle`]: webhook event handling, finalization, and retry logic

pub mod core;
pub mod lifecycle;

pub use core::{CallEngine, EngineAdapters};
