//! # Reverie Call Engine
//!
//! The call orchestration core of the reverie voice journaling platform:
//! it drives scheduled outbound telephone calls through a multi-turn,
//! streaming speech dialog and persists the results as immutable journal
//! entries.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              CallEngineServer                │
//! ├──────────────────────────────────────────────┤
//! │  Webhook/HTTP front (axum)                   │
//! ├──────────────────────────────────────────────┤
//! │              CallEngine                      │
//! │ ┌────────────┐ ┌───────────┐ ┌────────────┐  │
//! │ │ Scheduler  │ │  Dialog   │ │ Lifecycle  │  │
//! │ │ (2 loops)  │ │  Runtime  │ │ (webhooks) │  │
//! │ └────────────┘ └───────────┘ └────────────┘  │
//! ├──────────────────────────────────────────────┤
//! │   DatabaseManager (sqlx)  │  Adapters        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A normal call flows left to right: the window materializer creates a
//! ReflectionSession + ScheduledCall pair, the dispatcher claims it and
//! places the provider call, the answer webhook connects the state
//! machine, the dialog runtime loops over the prompt snapshot, and the
//! closing sequence materializes the journal entry.
//!
//! ## Quick start
//!
//! ```no_run
//! use reverie_call_engine::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = EngineConfig::from_env()?;
//! let mut server = CallEngineServerBuilder::new()
//!     .with_config(config)
//!     .build()
//!     .await?;
//!
//! server.start().await?;
//! server.run().await?;
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod dialog;
pub mod error;
pub mod orchestrator;
pub mod prelude;
pub mod scheduler;
pub mod server;

pub use config::EngineConfig;
pub use database::DatabaseManager;
pub use error::{EngineError, Result};
pub use orchestrator::{CallEngine, EngineAdapters};
pub use server::{CallEngineServer, CallEngineServerBuilder};
