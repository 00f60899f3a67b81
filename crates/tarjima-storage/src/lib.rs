// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Tarjima bot platform.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed query modules for
//! tenants, orders, and shared conversation state.
//!
//! The database file is the one resource every worker process of a
//! deployment shares; the conversation store and the payment ledger both
//! ride on it.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
