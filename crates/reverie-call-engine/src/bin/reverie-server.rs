//! Process entry point
//!
//! Reads configuration from the environment, wires adapters (mock or live),
//! and runs the engine server until ctrl-c. Exits non-zero on any
//! unrecoverable startup failure so supervisors can tell a crash loop from
//! a clean shutdown.

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use reverie_call_engine::prelude::*;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reverie=debug")),
        )
        .init();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Startup failed: {err}");
            return ExitCode::from(2);
        }
    };

    info!("🚀 Starting reverie call engine");
    info!("   Base URL:  {}", config.general.base_url);
    info!("   Database:  {}", config.database.url);
    info!("   Adapters:  {}", if config.general.use_mocks { "in-memory" } else { "live" });

    let adapters = EngineAdapters::from_config(&config);

    let mut server = match CallEngineServerBuilder::new()
        .with_config(config)
        .with_adapters(adapters)
        .build()
        .await
    {
        Ok(server) => server,
        Err(err) => {
            error!("Startup failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = server.start().await {
        error!("Startup failed: {err}");
        return ExitCode::FAILURE;
    }

    let result = server.run().await;
    if let Err(err) = server.stop().await {
        error!("Shutdown error: {err}");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Server error: {err}");
            ExitCode::FAILURE
        }
    }
}
