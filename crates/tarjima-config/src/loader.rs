// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tarjima.toml` > `~/.config/tarjima/tarjima.toml`
//! > `/etc/tarjima/tarjima.toml` with environment variable overrides via the
//! `TARJIMA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TarjimaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tarjima/tarjima.toml` (system-wide)
/// 3. `~/.config/tarjima/tarjima.toml` (user XDG config)
/// 4. `./tarjima.toml` (local directory)
/// 5. `TARJIMA_*` environment variables
pub fn load_config() -> Result<TarjimaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TarjimaConfig::default()))
        .merge(Toml::file("/etc/tarjima/tarjima.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("tarjima/tarjima.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("tarjima.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<TarjimaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TarjimaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TarjimaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TarjimaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` instead of `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `TARJIMA_STORAGE_DATABASE_PATH` must map
/// to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("TARJIMA_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("telegram_", "telegram.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("supervisor_", "supervisor.", 1)
            .replacen("watcher_", "watcher.", 1);
        mapped.into()
    })
}
