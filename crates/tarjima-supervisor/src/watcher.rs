// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dev-mode auto-reload wrapper.
//!
//! Watches source directories and restarts the supervisor subprocess on a
//! qualifying change. Event bursts inside the debounce window coalesce into
//! a single restart; a child that exits on its own is restarted after a
//! short delay, so a crash during development does not end the session.

use std::path::PathBuf;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tarjima_config::model::WatcherConfig;
use tarjima_core::TarjimaError;

use crate::pidlock;

/// Delay before restarting a child that exited on its own.
const CRASH_RESTART_DELAY: Duration = Duration::from_secs(3);

/// File extensions whose changes trigger a reload.
const SOURCE_EXTENSIONS: &[&str] = &["rs", "toml", "sql"];

/// Restarts the supervisor subprocess on source changes.
pub struct DevReloader {
    watch_paths: Vec<PathBuf>,
    debounce: Duration,
    grace: Duration,
    tenant_id: Option<i64>,
}

impl DevReloader {
    pub fn new(config: &WatcherConfig, grace: Duration, tenant_id: Option<i64>) -> Self {
        Self {
            watch_paths: config.watch_paths.iter().map(PathBuf::from).collect(),
            debounce: Duration::from_secs(config.debounce_secs),
            grace,
            tenant_id,
        }
    }

    fn spawn_child(&self) -> Result<Child, TarjimaError> {
        let exe = std::env::current_exe()
            .map_err(|e| TarjimaError::Internal(format!("cannot resolve own executable: {e}")))?;

        let mut command = Command::new(exe);
        command.arg("serve").arg("--no-reload");
        if let Some(tenant_id) = self.tenant_id {
            command.arg("--tenant").arg(tenant_id.to_string());
        }

        let child = command
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TarjimaError::Internal(format!("cannot spawn supervisor child: {e}")))?;

        info!(pid = child.id(), "supervisor child started");
        Ok(child)
    }

    /// Gracefully stop the child, force-killing after the grace period.
    async fn stop_child(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            pidlock::terminate_pid(pid);
        }
        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("child ignored termination, force-killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }

    /// Watch and reload until cancelled.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), TarjimaError> {
        let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut debouncer = new_debouncer(self.debounce, move |result| {
            let _ = events_tx.send(result);
        })
        .map_err(|e| TarjimaError::Internal(format!("cannot start file watcher: {e}")))?;

        for path in &self.watch_paths {
            if path.exists() {
                if let Err(e) = debouncer.watcher().watch(path, RecursiveMode::Recursive) {
                    warn!(path = %path.display(), error = %e, "cannot watch path");
                } else {
                    info!(path = %path.display(), "watching for changes");
                }
            }
        }

        let mut child = self.spawn_child()?;
        let mut liveness = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.stop_child(&mut child).await;
                    break;
                }

                Some(result) = events_rx.recv() => {
                    match result {
                        Ok(events) if is_qualifying(&events) => {
                            info!("source change detected, reloading");
                            self.stop_child(&mut child).await;
                            child = self.spawn_child()?;
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "file watcher error"),
                    }
                }

                _ = liveness.tick() => {
                    if let Ok(Some(status)) = child.try_wait() {
                        warn!(%status, "supervisor child exited, restarting");
                        tokio::time::sleep(CRASH_RESTART_DELAY).await;
                        child = self.spawn_child()?;
                    }
                }
            }
        }

        info!("auto-reload watcher stopped");
        Ok(())
    }
}

/// Whether a debounced event batch contains a source change worth a reload.
pub fn is_qualifying(events: &[DebouncedEvent]) -> bool {
    events.iter().any(|event| {
        event
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_debouncer_mini::DebouncedEventKind;

    fn event(path: &str) -> DebouncedEvent {
        DebouncedEvent {
            path: PathBuf::from(path),
            kind: DebouncedEventKind::Any,
        }
    }

    #[test]
    fn source_changes_qualify() {
        assert!(is_qualifying(&[event("crates/tarjima/src/main.rs")]));
        assert!(is_qualifying(&[event("Cargo.toml")]));
        assert!(is_qualifying(&[event("migrations/V1__initial.sql")]));
    }

    #[test]
    fn noise_does_not_qualify() {
        assert!(!is_qualifying(&[
            event("target/debug/tarjima.d"),
            event("README.md"),
            event(".git/index.lock"),
        ]));
        assert!(!is_qualifying(&[]));
    }

    #[test]
    fn mixed_batches_qualify_once() {
        assert!(is_qualifying(&[
            event("README.md"),
            event("crates/tarjima-ledger/src/lib.rs"),
        ]));
    }

    #[test]
    fn reloader_takes_paths_from_config() {
        let config = WatcherConfig {
            debounce_secs: 2,
            watch_paths: vec!["crates".into(), "migrations".into()],
        };
        let reloader = DevReloader::new(&config, Duration::from_secs(5), Some(3));
        assert_eq!(reloader.watch_paths.len(), 2);
        assert_eq!(reloader.debounce, Duration::from_secs(2));
        assert_eq!(reloader.tenant_id, Some(3));
    }
}
