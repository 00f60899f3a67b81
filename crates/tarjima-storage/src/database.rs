// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The `Database` struct IS the single writer: query modules accept
//! `&Database` and go through `connection().call()`. Do NOT create
//! additional Connection instances for writes.

use std::path::Path;

use tokio_rusqlite::Connection;
use tracing::debug;

use tarjima_core::TarjimaError;

/// Handle to the workspace SQLite database.
///
/// Opening runs PRAGMA setup and all pending migrations. Cloning the inner
/// connection is cheap; every clone still funnels into the same writer
/// thread, which is what makes per-statement writes atomic under concurrent
/// callers.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &str) -> Result<Self, TarjimaError> {
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| TarjimaError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = Connection::open(path).await.map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            crate::migrations::run_migrations(conn)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// The underlying single-writer connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), TarjimaError> {
        self.conn
            .call(|conn| -> Result<(), tokio_rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Map a tokio-rusqlite error into the workspace storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> TarjimaError {
    TarjimaError::Storage {
        source: Box::new(e),
    }
}
