// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the seams between the supervisor, the messaging
//! platform, and the per-update handlers.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod handler;
pub mod messenger;

pub use handler::UpdateHandler;
pub use messenger::MessengerApi;
