// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Tarjima workspace.
//!
//! Provides a deterministic [`MockMessenger`] implementing the platform
//! trait and a [`TestDb`] helper that seeds a temp database with a tenant,
//! a branch, and orders.

pub mod mock_messenger;
pub mod testdb;

pub use mock_messenger::MockMessenger;
pub use testdb::TestDb;
