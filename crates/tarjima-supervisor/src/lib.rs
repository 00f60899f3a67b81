// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process/thread supervisor for per-tenant bot runtimes.
//!
//! Guarantees exactly one live runtime per active tenant with a valid
//! credential. With one tenant the runtimes are tasks inside this process;
//! with several (and isolation requested) each tenant gets its own OS
//! process, so a crash or blocking bug in one tenant cannot affect another.
//! Shutdown is cooperative with a bounded grace period, then force.

pub mod pidlock;
pub mod runtime;
pub mod shutdown;
pub mod watcher;
pub mod wizard;

use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tarjima_config::model::{IsolateMode, SupervisorConfig};
use tarjima_core::types::Tenant;
use tarjima_core::{RuntimeRegistry, TarjimaError};
use tarjima_dispatch::{MessengerFactory, NotificationRouter};
use tarjima_ledger::PaymentLedger;
use tarjima_registry::TenantRegistry;
use tarjima_state::ConversationStore;
use tarjima_storage::Database;

pub use pidlock::{LockScope, PidLock};
pub use runtime::BotRuntime;
pub use shutdown::install_signal_handler;
pub use watcher::DevReloader;
pub use wizard::WizardHandler;

/// Capacity of each runtime's webhook inbox.
const INBOX_CAPACITY: usize = 64;

/// Delay before respawning an exited subprocess child.
const RESPAWN_DELAY: Duration = Duration::from_secs(3);

/// How tenant runtimes are hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Tokio tasks inside this process.
    Tasks,
    /// One OS process per tenant.
    Subprocess,
}

/// Resolve the hosting mode from config and tenant count.
pub fn select_mode(isolate: IsolateMode, active_tenants: usize) -> RunMode {
    match isolate {
        IsolateMode::Always => RunMode::Subprocess,
        IsolateMode::Never => RunMode::Tasks,
        IsolateMode::Auto => {
            if active_tenants > 1 {
                RunMode::Subprocess
            } else {
                RunMode::Tasks
            }
        }
    }
}

/// Shared services handed to every task-mode runtime's wizard.
#[derive(Clone)]
pub struct RuntimeServices {
    pub store: Arc<ConversationStore>,
    pub ledger: Arc<PaymentLedger>,
    pub router: Arc<NotificationRouter>,
    pub tenants: Arc<TenantRegistry>,
    pub db: Arc<Database>,
}

struct TaskRuntime {
    tenant_id: i64,
    handle: JoinHandle<()>,
}

struct ChildRuntime {
    tenant_id: i64,
    child: Child,
    restarts: u32,
}

/// Launches and supervises one bot runtime per tenant.
pub struct Supervisor {
    registry: Arc<RuntimeRegistry>,
    config: SupervisorConfig,
    poll_timeout_secs: u32,
    cancel: CancellationToken,
    tasks: Vec<TaskRuntime>,
    children: Vec<ChildRuntime>,
}

impl Supervisor {
    pub fn new(
        registry: Arc<RuntimeRegistry>,
        config: SupervisorConfig,
        poll_timeout_secs: u32,
    ) -> Self {
        Self {
            registry,
            config,
            poll_timeout_secs,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Runtimes currently owned by this supervisor.
    pub fn running_count(&self) -> usize {
        self.tasks.len() + self.children.len()
    }

    /// Start a runtime for every given tenant.
    ///
    /// Tenants without a credential are skipped with a warning; a tenant
    /// that already has a runtime is never started twice. Returns the
    /// number of runtimes started.
    pub fn start(
        &mut self,
        tenants: &[Tenant],
        mode: RunMode,
        services: &RuntimeServices,
        factory: &MessengerFactory,
    ) -> Result<usize, TarjimaError> {
        let mut started = 0;

        for tenant in tenants {
            if !tenant.has_credential() {
                warn!(
                    tenant_id = tenant.id,
                    tenant_name = tenant.name.as_str(),
                    "no credential configured, skipping runtime"
                );
                continue;
            }
            if self.owns_tenant(tenant.id) {
                warn!(tenant_id = tenant.id, "runtime already running, skipping");
                continue;
            }

            match mode {
                RunMode::Tasks => self.start_task(tenant.clone(), services, factory)?,
                RunMode::Subprocess => self.start_child(tenant.id)?,
            }
            started += 1;
        }

        info!(started, mode = ?mode, "supervisor start complete");
        Ok(started)
    }

    fn owns_tenant(&self, tenant_id: i64) -> bool {
        self.registry.is_registered(tenant_id)
            || self.children.iter().any(|c| c.tenant_id == tenant_id)
    }

    fn start_task(
        &mut self,
        tenant: Tenant,
        services: &RuntimeServices,
        factory: &MessengerFactory,
    ) -> Result<(), TarjimaError> {
        let token = tenant.bot_token.as_deref().unwrap_or_default();
        let messenger = (factory)(tenant.id, token)?;

        let handler = Arc::new(WizardHandler::new(
            tenant.clone(),
            messenger.clone(),
            services.store.clone(),
            services.ledger.clone(),
            services.router.clone(),
            services.tenants.clone(),
            services.db.clone(),
        ));

        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        self.registry.register(tenant.id, inbox_tx);

        let tenant_id = tenant.id;
        let runtime = BotRuntime::new(
            tenant,
            messenger,
            handler,
            inbox_rx,
            self.poll_timeout_secs,
            Duration::from_secs(self.config.poll_retry_delay_secs),
        );

        let handle = tokio::spawn(runtime.run(self.cancel.child_token()));
        self.tasks.push(TaskRuntime { tenant_id, handle });
        info!(tenant_id, "task runtime started");
        Ok(())
    }

    fn start_child(&mut self, tenant_id: i64) -> Result<(), TarjimaError> {
        let child = spawn_tenant_child(tenant_id)?;
        info!(tenant_id, pid = child.id(), "subprocess runtime started");
        self.children.push(ChildRuntime {
            tenant_id,
            child,
            restarts: 0,
        });
        Ok(())
    }

    /// Liveness-check loop; returns when `shutdown` fires.
    pub async fn run_until(&mut self, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.monitor_interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => self.check_liveness().await,
            }
        }
    }

    /// Reap finished tasks and respawn exited children.
    async fn check_liveness(&mut self) {
        let registry = self.registry.clone();
        self.tasks.retain(|task| {
            if task.handle.is_finished() {
                warn!(tenant_id = task.tenant_id, "task runtime finished unexpectedly");
                registry.unregister(task.tenant_id);
                false
            } else {
                true
            }
        });

        let mut respawn = Vec::new();
        let mut alive = Vec::new();
        for mut child in self.children.drain(..) {
            match child.child.try_wait() {
                Ok(Some(status)) => {
                    warn!(
                        tenant_id = child.tenant_id,
                        %status,
                        restarts = child.restarts,
                        "subprocess runtime exited"
                    );
                    respawn.push((child.tenant_id, child.restarts + 1));
                }
                Ok(None) => alive.push(child),
                Err(e) => {
                    warn!(tenant_id = child.tenant_id, error = %e, "cannot poll child");
                    alive.push(child);
                }
            }
        }
        self.children = alive;

        if !respawn.is_empty() {
            tokio::time::sleep(RESPAWN_DELAY).await;
            for (tenant_id, restarts) in respawn {
                match spawn_tenant_child(tenant_id) {
                    Ok(child) => {
                        info!(tenant_id, restarts, pid = child.id(), "subprocess respawned");
                        self.children.push(ChildRuntime {
                            tenant_id,
                            child,
                            restarts,
                        });
                    }
                    Err(e) => warn!(tenant_id, error = %e, "respawn failed"),
                }
            }
        }
    }

    /// Cooperative shutdown: cancel, wait out the grace period, then force.
    pub async fn stop(&mut self) {
        info!("stopping all runtimes");
        self.cancel.cancel();
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);

        for mut task in self.tasks.drain(..) {
            self.registry.unregister(task.tenant_id);
            match tokio::time::timeout(grace, &mut task.handle).await {
                Ok(_) => info!(tenant_id = task.tenant_id, "task runtime drained"),
                Err(_) => {
                    warn!(tenant_id = task.tenant_id, "grace period elapsed, aborting task");
                    task.handle.abort();
                }
            }
        }

        for mut child in self.children.drain(..) {
            if let Some(pid) = child.child.id() {
                pidlock::terminate_pid(pid);
            }
            match tokio::time::timeout(grace, child.child.wait()).await {
                Ok(_) => info!(tenant_id = child.tenant_id, "subprocess stopped"),
                Err(_) => {
                    warn!(
                        tenant_id = child.tenant_id,
                        "grace period elapsed, force-killing subprocess"
                    );
                    let _ = child.child.start_kill();
                    let _ = child.child.wait().await;
                }
            }
        }

        info!("all runtimes stopped");
    }
}

/// Spawn `tarjima serve --tenant <id> --no-reload` as an isolated process.
fn spawn_tenant_child(tenant_id: i64) -> Result<Child, TarjimaError> {
    let exe = std::env::current_exe()
        .map_err(|e| TarjimaError::Internal(format!("cannot resolve own executable: {e}")))?;

    Command::new(exe)
        .arg("serve")
        .arg("--tenant")
        .arg(tenant_id.to_string())
        .arg("--no-reload")
        // The parent owns webhook ingestion for its process; children poll
        // only, so they never fight over the gateway port.
        .env("TARJIMA_GATEWAY_ENABLED", "false")
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            TarjimaError::Internal(format!("cannot spawn runtime for tenant {tenant_id}: {e}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarjima_core::MessengerApi;
    use tarjima_test_utils::{MockMessenger, TestDb};

    #[test]
    fn mode_selection_follows_policy_and_count() {
        assert_eq!(select_mode(IsolateMode::Auto, 1), RunMode::Tasks);
        assert_eq!(select_mode(IsolateMode::Auto, 2), RunMode::Subprocess);
        assert_eq!(select_mode(IsolateMode::Always, 1), RunMode::Subprocess);
        assert_eq!(select_mode(IsolateMode::Never, 5), RunMode::Tasks);
    }

    async fn services(harness: &TestDb) -> (RuntimeServices, Arc<MockMessenger>) {
        let db = harness.db.clone();
        let messenger = MockMessenger::new(1);
        let factory: MessengerFactory = {
            let messenger = messenger.clone();
            Arc::new(move |_, _| Ok(messenger.clone() as Arc<dyn MessengerApi>))
        };
        (
            RuntimeServices {
                store: Arc::new(ConversationStore::new(db.clone())),
                ledger: Arc::new(PaymentLedger::new(db.clone())),
                router: Arc::new(NotificationRouter::with_retry_delay(
                    factory,
                    Duration::ZERO,
                )),
                tenants: Arc::new(TenantRegistry::new(db.clone())),
                db,
            },
            messenger,
        )
    }

    fn mock_factory(messenger: Arc<MockMessenger>) -> MessengerFactory {
        Arc::new(move |_, _| Ok(messenger.clone() as Arc<dyn MessengerApi>))
    }

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            lock_dir: "/tmp/unused".into(),
            poll_retry_delay_secs: 1,
            shutdown_grace_secs: 1,
            monitor_interval_secs: 1,
            isolate: IsolateMode::Never,
        }
    }

    #[tokio::test]
    async fn task_mode_registers_and_stops_cleanly() {
        let harness = TestDb::seeded().await;
        let (services, messenger) = services(&harness).await;
        let registry = Arc::new(RuntimeRegistry::new());
        let mut supervisor = Supervisor::new(registry.clone(), test_config(), 1);

        let started = supervisor
            .start(
                &[TestDb::tenant()],
                RunMode::Tasks,
                &services,
                &mock_factory(messenger.clone()),
            )
            .unwrap();
        assert_eq!(started, 1);
        assert_eq!(supervisor.running_count(), 1);
        assert!(registry.is_registered(1));

        // Give the runtime a moment to clear the webhook registration.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(messenger.webhook_delete_count(), 1);

        supervisor.stop().await;
        assert_eq!(supervisor.running_count(), 0);
        assert!(!registry.is_registered(1));
    }

    #[tokio::test]
    async fn tenants_without_credentials_are_skipped() {
        let harness = TestDb::seeded().await;
        let (services, messenger) = services(&harness).await;
        let registry = Arc::new(RuntimeRegistry::new());
        let mut supervisor = Supervisor::new(registry.clone(), test_config(), 1);

        let mut bare = TestDb::tenant();
        bare.id = 2;
        bare.bot_token = None;

        let started = supervisor
            .start(
                &[TestDb::tenant(), bare],
                RunMode::Tasks,
                &services,
                &mock_factory(messenger),
            )
            .unwrap();
        assert_eq!(started, 1);
        assert!(!registry.is_registered(2));

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn a_tenant_never_gets_two_runtimes() {
        let harness = TestDb::seeded().await;
        let (services, messenger) = services(&harness).await;
        let registry = Arc::new(RuntimeRegistry::new());
        let mut supervisor = Supervisor::new(registry.clone(), test_config(), 1);
        let factory = mock_factory(messenger);

        supervisor
            .start(&[TestDb::tenant()], RunMode::Tasks, &services, &factory)
            .unwrap();
        let started_again = supervisor
            .start(&[TestDb::tenant()], RunMode::Tasks, &services, &factory)
            .unwrap();

        assert_eq!(started_again, 0);
        assert_eq!(supervisor.running_count(), 1);

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn run_until_returns_on_shutdown_signal() {
        let registry = Arc::new(RuntimeRegistry::new());
        let mut supervisor = Supervisor::new(registry, test_config(), 1);

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), supervisor.run_until(shutdown))
            .await
            .expect("monitor loop must exit on shutdown");
    }
}
