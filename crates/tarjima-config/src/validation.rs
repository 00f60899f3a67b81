// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses, non-empty paths, and sane
//! timing values.

use crate::diagnostic::ConfigError;
use crate::model::TarjimaConfig;

/// Platform maximum for the long-poll timeout, in seconds.
const MAX_POLL_TIMEOUT_SECS: u32 = 50;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TarjimaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.supervisor.lock_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "supervisor.lock_dir must not be empty".to_string(),
        });
    }

    if config.supervisor.poll_retry_delay_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "supervisor.poll_retry_delay_secs must be at least 1".to_string(),
        });
    }

    if config.telegram.poll_timeout_secs == 0
        || config.telegram.poll_timeout_secs > MAX_POLL_TIMEOUT_SECS
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "telegram.poll_timeout_secs must be between 1 and {MAX_POLL_TIMEOUT_SECS}, got {}",
                config.telegram.poll_timeout_secs
            ),
        });
    }

    // Gateway bind address must be a valid IP or hostname when enabled.
    if config.gateway.enabled {
        let addr = config.gateway.host.trim();
        if addr.is_empty() {
            errors.push(ConfigError::Validation {
                message: "gateway.host must not be empty".to_string(),
            });
        } else {
            let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
            let is_valid_hostname = addr
                .chars()
                .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
            if !is_valid_ip && !is_valid_hostname {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "gateway.host `{addr}` is not a valid IP address or hostname"
                    ),
                });
            }
        }

        if config.gateway.port == 0 {
            errors.push(ConfigError::Validation {
                message: "gateway.port must not be 0".to_string(),
            });
        }
    }

    if config.watcher.debounce_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "watcher.debounce_secs must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = TarjimaConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = TarjimaConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn oversized_poll_timeout_fails_validation() {
        let mut config = TarjimaConfig::default();
        config.telegram.poll_timeout_secs = 90;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("poll_timeout_secs"))));
    }

    #[test]
    fn zero_gateway_port_fails_when_enabled() {
        let mut config = TarjimaConfig::default();
        config.gateway.port = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("gateway.port"))));
    }

    #[test]
    fn zero_gateway_port_ignored_when_disabled() {
        let mut config = TarjimaConfig::default();
        config.gateway.enabled = false;
        config.gateway.port = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn garbage_gateway_host_fails_validation() {
        let mut config = TarjimaConfig::default();
        config.gateway.host = "not a host!".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("gateway.host"))));
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = TarjimaConfig::default();
        config.gateway.host = "0.0.0.0".to_string();
        config.storage.database_path = "/tmp/test.db".to_string();
        config.supervisor.lock_dir = "/tmp/test_locks".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
