//! # Async Database Management (sqlx + SQLite)
//!
//! One table per collection, one module per collection's operations. The
//! store gives the engine three things it leans on hard:
//!
//! - **CAS updates**: conditional `UPDATE … WHERE status = ?` checked via
//!   `rows_affected`, used as the only lock between racing workers.
//! - **Uniqueness invariants in the schema**: partial unique indexes keep
//!   a user to one in-progress session, one non-terminal phone call, and
//!   one journal entry per local date; violations surface as
//!   [`EngineError::Uniqueness`](crate::error::EngineError).
//! - **A bounded pool**: a single process owns the pool; spawning multiple
//!   processes each with their own pool is a documented deployment hazard.
//!
//! All operations are naturally async and `Send`-safe, so they can be used
//! from any spawned task.

pub mod calls;
pub mod entries;
pub mod profiles;
pub mod responses;
pub mod schedules;
pub mod sessions;
pub mod windows;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::Result;

const SCHEMA: &str = include_str!("schema.sql");

/// Main database manager; cheap to clone, shares the pool.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Connect and apply the schema.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("🗄️ Initializing database: {database_url}");

        // In-memory SQLite needs a single connection or every pooled
        // connection sees its own empty database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        info!("✅ Database ready ({max_connections} connections)");
        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Point-in-time engine statistics for the monitor loop.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub active_calls: i64,
    pub pending_scheduled: i64,
    pub in_progress_sessions: i64,
    pub journal_entries: i64,
}

impl DatabaseManager {
    pub async fn stats(&self) -> Result<EngineStats> {
        use sqlx::Row;

        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM phone_calls
                 WHERE status IN ('INITIATED', 'CONNECTED')) AS active_calls,
                (SELECT COUNT(*) FROM scheduled_calls
                 WHERE status = 'PENDING') AS pending_scheduled,
                (SELECT COUNT(*) FROM reflection_sessions
                 WHERE status = 'IN_PROGRESS') AS in_progress_sessions,
                (SELECT COUNT(*) FROM journal_entries) AS journal_entries",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(EngineStats {
            active_calls: row.try_get("active_calls")?,
            pending_scheduled: row.try_get("pending_scheduled")?,
            in_progress_sessions: row.try_get("in_progress_sessions")?,
            journal_entries: row.try_get("journal_entries")?,
        })
    }
}
