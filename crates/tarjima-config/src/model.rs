// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tarjima bot platform.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Tarjima configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TarjimaConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Messaging platform settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Webhook gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Bot supervisor settings.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Dev-mode auto-reload watcher settings.
    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the service.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "tarjima".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
///
/// The database doubles as the shared conversation cache, so every worker
/// process of one deployment must point at the same file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tarjima").join("tarjima.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tarjima.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Messaging platform configuration.
///
/// Per-tenant credentials live in the tenant registry, not here; this section
/// only carries platform-wide tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Long-poll timeout in seconds (platform maximum is 50).
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u32,

    /// Optional Bot API server override for self-hosted setups.
    #[serde(default)]
    pub api_url: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: default_poll_timeout_secs(),
            api_url: None,
        }
    }
}

fn default_poll_timeout_secs() -> u32 {
    25
}

/// Webhook gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Enable the webhook gateway.
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8090
}

/// Process isolation mode for multi-tenant runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolateMode {
    /// Subprocess isolation when more than one tenant is active.
    #[default]
    Auto,
    /// Always spawn one subprocess per tenant.
    Always,
    /// Always run tenants as tasks inside this process.
    Never,
}

/// Bot supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Directory holding per-scope PID lock files.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: String,

    /// Delay before a runtime resumes polling after an error, in seconds.
    #[serde(default = "default_poll_retry_delay_secs")]
    pub poll_retry_delay_secs: u64,

    /// Grace period for cooperative shutdown before force-termination.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Interval between child-liveness checks, in seconds.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    /// Subprocess isolation policy.
    #[serde(default)]
    pub isolate: IsolateMode,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            poll_retry_delay_secs: default_poll_retry_delay_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            isolate: IsolateMode::default(),
        }
    }
}

fn default_lock_dir() -> String {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tarjima_bots")
        .to_string_lossy()
        .into_owned()
}

fn default_poll_retry_delay_secs() -> u64 {
    5
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn default_monitor_interval_secs() -> u64 {
    1
}

/// Dev-mode auto-reload watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    /// Debounce window in seconds; event bursts within it coalesce into one
    /// restart.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Directories watched for source changes.
    #[serde(default = "default_watch_paths")]
    pub watch_paths: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            watch_paths: default_watch_paths(),
        }
    }
}

fn default_debounce_secs() -> u64 {
    2
}

fn default_watch_paths() -> Vec<String> {
    vec!["crates".to_string()]
}
