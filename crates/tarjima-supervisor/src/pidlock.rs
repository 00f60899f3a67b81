// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplicate-instance guard backed by PID lock files.
//!
//! One supervisor instance per scope: a second start for a scope whose lock
//! file points at a live, matching process is refused with the owning PID.
//! A lock whose recorded PID is dead, or alive but no longer matching the
//! supervisor signature, is stale and reclaimed. Advisory, single-host
//! semantics only; a multi-host deployment needs a consensus-backed lock
//! instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tracing::{info, warn};

use tarjima_core::TarjimaError;

/// What one lock file covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// The whole supervisor (all tenants in one invocation).
    All,
    /// One tenant's isolated runtime.
    Tenant(i64),
}

impl LockScope {
    fn file_name(&self) -> String {
        match self {
            Self::All => "bots_all.pid".to_string(),
            Self::Tenant(id) => format!("bot_tenant_{id}.pid"),
        }
    }

    /// Command-line fragment identifying a supervisor process for this scope.
    pub fn signature(&self) -> String {
        match self {
            Self::All => "tarjima serve".to_string(),
            Self::Tenant(id) => format!("tarjima serve --tenant {id}"),
        }
    }
}

/// A held scope lock. Released on drop; double release is a no-op.
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Acquire the lock for a scope.
    ///
    /// Refuses with [`TarjimaError::AlreadyRunning`] when another live
    /// process matching `signature` holds the file. Before writing its own
    /// PID, best-effort terminates any other matching processes left over
    /// from an unclean shutdown.
    pub fn acquire(dir: &Path, scope: LockScope, signature: &str) -> Result<Self, TarjimaError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            TarjimaError::Internal(format!("cannot create lock dir {}: {e}", dir.display()))
        })?;
        let path = dir.join(scope.file_name());

        if let Some(pid) = read_pid(&path) {
            if pid != std::process::id() && process_matches(pid, signature) {
                return Err(TarjimaError::AlreadyRunning { pid });
            }
            // Dead owner or a recycled PID running something else.
            info!(path = %path.display(), stale_pid = pid, "removing stale lock file");
            let _ = std::fs::remove_file(&path);
        }

        let killed = kill_matching(signature, std::process::id());
        if killed > 0 {
            warn!(killed, signature, "terminated leftover supervisor processes");
            // Give the kills a moment to land before claiming the scope.
            std::thread::sleep(Duration::from_millis(500));
        }

        std::fs::write(&path, std::process::id().to_string()).map_err(|e| {
            TarjimaError::Internal(format!("cannot write lock file {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), pid = std::process::id(), "lock acquired");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file. Already-removed files are fine.
    pub fn release(&self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
}

/// The auto-reload wrapper matches the serve signature but never registers
/// polling, so it is not a duplicate-polling risk and must not be matched
/// (its child holds the real lock).
const WRAPPER_FLAG: &str = "--auto-reload";

fn cmdline(process: &sysinfo::Process) -> String {
    process
        .cmd()
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn cmdline_matches(cmd: &str, signature: &str) -> bool {
    cmd.contains(signature) && !cmd.contains(WRAPPER_FLAG)
}

/// Whether `pid` is alive and its command line matches the signature.
pub fn process_matches(pid: u32, signature: &str) -> bool {
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    sys.process(target)
        .map(|p| cmdline_matches(&cmdline(p), signature))
        .unwrap_or(false)
}

/// Best-effort SIGTERM/kill of every other process matching the signature.
/// Returns the number of processes signalled.
pub fn kill_matching(signature: &str, current_pid: u32) -> usize {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let mut killed = 0;
    for (pid, process) in sys.processes() {
        if pid.as_u32() == current_pid {
            continue;
        }
        if cmdline_matches(&cmdline(process), signature) {
            warn!(pid = pid.as_u32(), "killing duplicate process");
            if process.kill() {
                killed += 1;
            }
        }
    }
    killed
}

/// Ask a process to terminate (SIGTERM where supported, else a plain kill).
pub fn terminate_pid(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    match sys.process(target) {
        Some(process) => process
            .kill_with(Signal::Term)
            .unwrap_or_else(|| process.kill()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    /// A live process with a command line nothing else on the host has.
    fn spawn_marked_sleep(marker: &str) -> std::process::Child {
        std::process::Command::new("sleep")
            .arg(marker)
            .spawn()
            .expect("spawn sleep")
    }

    #[test]
    fn scope_file_names_are_distinct() {
        assert_eq!(LockScope::All.file_name(), "bots_all.pid");
        assert_eq!(LockScope::Tenant(7).file_name(), "bot_tenant_7.pid");
        assert!(LockScope::Tenant(7).signature().contains("--tenant 7"));
    }

    #[test]
    fn reload_wrapper_is_never_a_match() {
        assert!(cmdline_matches("/usr/bin/tarjima serve --no-reload", "tarjima serve"));
        assert!(!cmdline_matches(
            "/usr/bin/tarjima serve --auto-reload",
            "tarjima serve"
        ));
    }

    #[test]
    #[serial]
    fn acquire_writes_own_pid_and_release_removes_it() {
        let dir = tempdir().unwrap();
        let lock = PidLock::acquire(dir.path(), LockScope::Tenant(1), "no-such-proc-sig").unwrap();

        let recorded = read_pid(lock.path()).unwrap();
        assert_eq!(recorded, std::process::id());

        let path = lock.path().to_path_buf();
        lock.release();
        assert!(!path.exists());

        // Second release (via drop) of an already-removed file is a no-op.
        drop(lock);
    }

    #[test]
    #[serial]
    fn stale_lock_with_dead_pid_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LockScope::Tenant(2).file_name());

        // A process that has already exited.
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();
        std::fs::write(&path, dead_pid.to_string()).unwrap();

        let lock =
            PidLock::acquire(dir.path(), LockScope::Tenant(2), "no-such-proc-sig").unwrap();
        assert_eq!(read_pid(lock.path()), Some(std::process::id()));
    }

    #[test]
    #[serial]
    fn live_matching_owner_refuses_with_its_pid() {
        let dir = tempdir().unwrap();
        let marker = "30.719283";
        let mut child = spawn_marked_sleep(marker);
        let child_pid = child.id();

        let path = dir.path().join(LockScope::Tenant(3).file_name());
        std::fs::write(&path, child_pid.to_string()).unwrap();

        let signature = format!("sleep {marker}");
        let err = PidLock::acquire(dir.path(), LockScope::Tenant(3), &signature).unwrap_err();
        assert!(matches!(err, TarjimaError::AlreadyRunning { pid } if pid == child_pid));
        assert!(path.exists(), "conflicting lock file must survive the refusal");

        // Once the owner dies, the lock is stale and a new start succeeds.
        child.kill().unwrap();
        child.wait().unwrap();
        let lock = PidLock::acquire(dir.path(), LockScope::Tenant(3), &signature).unwrap();
        assert_eq!(read_pid(lock.path()), Some(std::process::id()));
    }

    #[test]
    #[serial]
    fn lock_with_live_but_mismatched_pid_is_stale() {
        let dir = tempdir().unwrap();
        let marker = "30.827364";
        let mut child = spawn_marked_sleep(marker);

        // The child is alive, but its command line does not match the
        // supervisor signature, so the PID was recycled by something else.
        let path = dir.path().join(LockScope::Tenant(4).file_name());
        std::fs::write(&path, child.id().to_string()).unwrap();

        let lock =
            PidLock::acquire(dir.path(), LockScope::Tenant(4), "no-such-proc-sig").unwrap();
        assert_eq!(read_pid(lock.path()), Some(std::process::id()));

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    #[serial]
    fn kill_matching_terminates_leftovers() {
        let marker = "30.192837";
        let mut child = spawn_marked_sleep(marker);
        let signature = format!("sleep {marker}");

        let killed = kill_matching(&signature, std::process::id());
        assert_eq!(killed, 1);

        child.wait().unwrap();
        assert!(!process_matches(child.id(), &signature));
    }

    #[test]
    #[serial]
    fn terminate_pid_stops_a_live_process() {
        let marker = "30.564738";
        let mut child = spawn_marked_sleep(marker);

        assert!(terminate_pid(child.id()));
        child.wait().unwrap();

        // A dead PID cannot be signalled.
        assert!(!terminate_pid(child.id()));
    }
}
