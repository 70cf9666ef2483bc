//! # Engine Server Manager
//!
//! High-level lifecycle wrapper around the engine: it owns the database,
//! the scheduler loops, a periodic stats monitor, and the webhook HTTP
//! front. Handles the boring parts of production operation: ordered
//! startup, graceful shutdown on ctrl-c, and periodic visibility into what
//! the engine is doing.
//!
//! ```no_run
//! use reverie_call_engine::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = EngineConfig::default();
//! let adapters = EngineAdapters::from_config(&config);
//!
//! let mut server = CallEngineServerBuilder::new()
//!     .with_config(config)
//!     .with_adapters(adapters)
//!     .build()
//!     .await?;
//!
//! server.start().await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api;
use crate::config::EngineConfig;
use crate::database::DatabaseManager;
use crate::error::{EngineError, Result};
use crate::orchestrator::{CallEngine, EngineAdapters};
use crate::scheduler::Scheduler;

const MONITOR_PERIOD: Duration = Duration::from_secs(60);

/// A complete engine server: workers, monitor, and HTTP front.
pub struct CallEngineServer {
    engine: Arc<CallEngine>,
    config: EngineConfig,
    scheduler: Option<Scheduler>,
    monitor_handle: Option<JoinHandle<()>>,
}

impl CallEngineServer {
    pub async fn new(config: EngineConfig, adapters: EngineAdapters) -> Result<Self> {
        let db =
            DatabaseManager::new(&config.database.url, config.database.max_connections).await?;
        let engine = CallEngine::new(config.clone(), db, adapters);
        info!("✅ Call engine initialized");

        Ok(Self {
            engine,
            config,
            scheduler: None,
            monitor_handle: None,
        })
    }

    pub fn engine(&self) -> &Arc<CallEngine> {
        &self.engine
    }

    /// Start the background workers.
    pub async fn start(&mut self) -> Result<()> {
        self.scheduler = Some(Scheduler::start(self.engine.clone()));

        let engine = self.engine.clone();
        self.monitor_handle = Some(tokio::spawn(async move {
            Self::monitor_loop(engine).await;
        }));

        info!("✅ Engine server started");
        Ok(())
    }

    /// Serve the webhook front until ctrl-c.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.general.bind_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| EngineError::configuration(format!("cannot bind {addr}: {e}")))?;

        info!("📞 Webhook front listening on {addr}");
        info!("   Answer webhook: {}", self.config.answer_url());
        info!("   Media stream:   {}", self.config.stream_url());

        let app = api::router(self.engine.clone());
        tokio::select! {
            result = axum::serve(listener, app) => {
                result.map_err(|e| EngineError::orchestration(format!("http front: {e}")))
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                Ok(())
            }
        }
    }

    /// Stop workers; in-flight call tasks drain on their own.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        if let Some(handle) = self.monitor_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        info!("✅ Engine server stopped");
        Ok(())
    }

    async fn monitor_loop(engine: Arc<CallEngine>) {
        let mut interval = tokio::time::interval(MONITOR_PERIOD);
        loop {
            interval.tick().await;
            match engine.stats().await {
                Ok(stats) => info!(
                    "📊 Stats - live tasks: {}, active calls: {}, pending: {}, sessions in \
                     progress: {}, entries: {}",
                    engine.live_call_count(),
                    stats.active_calls,
                    stats.pending_scheduled,
                    stats.in_progress_sessions,
                    stats.journal_entries,
                ),
                Err(err) => error!("Stats collection failed: {err}"),
            }
        }
    }
}

/// Builder with the usual fluent API.
pub struct CallEngineServerBuilder {
    config: Option<EngineConfig>,
    adapters: Option<EngineAdapters>,
}

impl CallEngineServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            adapters: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_adapters(mut self, adapters: EngineAdapters) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub async fn build(self) -> Result<CallEngineServer> {
        let config = self
            .config
            .ok_or_else(|| EngineError::configuration("configuration not provided"))?;
        let adapters = self
            .adapters
            .unwrap_or_else(|| EngineAdapters::from_config(&config));

        CallEngineServer::new(config, adapters).await
    }
}

impl Default for CallEngineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
