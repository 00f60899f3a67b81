// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tarjima bot platform.

use thiserror::Error;

/// The primary error type used across all Tarjima crates.
///
/// Payment mutations have their own typed error in `tarjima-ledger`; this
/// enum covers everything else that crosses a crate boundary.
#[derive(Debug, Error)]
pub enum TarjimaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging platform errors (send failure, webhook management, polling).
    ///
    /// `retryable` distinguishes transient failures (network blips, rate
    /// limits) from terminal ones (destination not found, bot blocked).
    #[error("platform error: {message}")]
    Platform {
        message: String,
        retryable: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Another supervisor instance already holds the scope lock.
    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    /// No active tenant with the given id.
    #[error("tenant {tenant_id} not found or inactive")]
    TenantNotFound { tenant_id: i64 },

    /// No runtime registered for the tenant (webhook routing).
    #[error("no runtime registered for tenant {tenant_id}")]
    RuntimeUnavailable { tenant_id: i64 },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TarjimaError {
    /// Shorthand for a platform error without an underlying source.
    pub fn platform(message: impl Into<String>, retryable: bool) -> Self {
        Self::Platform {
            message: message.into(),
            retryable,
            source: None,
        }
    }

    /// Whether a retry has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Platform { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_shorthand_sets_retryable() {
        let err = TarjimaError::platform("rate limited", true);
        assert!(err.is_retryable());

        let err = TarjimaError::platform("chat not found", false);
        assert!(!err.is_retryable());
    }

    #[test]
    fn non_platform_errors_are_not_retryable() {
        assert!(!TarjimaError::Config("bad".into()).is_retryable());
        assert!(!TarjimaError::AlreadyRunning { pid: 1 }.is_retryable());
    }

    #[test]
    fn already_running_names_the_pid() {
        let err = TarjimaError::AlreadyRunning { pid: 4711 };
        assert!(err.to_string().contains("4711"));
    }
}
