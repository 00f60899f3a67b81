// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tarjima serve` command implementation.
//!
//! Wires the full bot core: duplicate-instance guard, tenant registry,
//! conversation store, payment ledger, notification router, the supervisor
//! with its per-tenant runtimes, and the webhook gateway. Supports graceful
//! shutdown via signal handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tarjima_config::TarjimaConfig;
use tarjima_core::types::Tenant;
use tarjima_core::{MessengerApi, RuntimeRegistry, TarjimaError};
use tarjima_dispatch::{MessengerFactory, NotificationRouter};
use tarjima_gateway::GatewayState;
use tarjima_ledger::PaymentLedger;
use tarjima_registry::TenantRegistry;
use tarjima_state::ConversationStore;
use tarjima_storage::Database;
use tarjima_supervisor::{
    install_signal_handler, select_mode, DevReloader, LockScope, PidLock, RunMode,
    RuntimeServices, Supervisor,
};
use tarjima_telegram::TelegramMessenger;

use crate::ServeArgs;

/// Interval between sweeps of expired conversation entries.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Messenger factory backed by the real platform client.
fn telegram_factory(api_url: Option<String>) -> MessengerFactory {
    Arc::new(move |tenant_id, token| {
        TelegramMessenger::new(tenant_id, token, api_url.as_deref())
            .map(|messenger| Arc::new(messenger) as Arc<dyn MessengerApi>)
    })
}

/// Runs the `tarjima serve` command.
pub async fn run_serve(config: TarjimaConfig, args: ServeArgs) -> Result<(), TarjimaError> {
    info!("starting tarjima serve");

    // Dev mode: hand everything to the reload wrapper. The wrapper holds no
    // scope lock; its child (running with --no-reload) acquires it.
    if args.auto_reload && !args.no_reload {
        let grace = Duration::from_secs(config.supervisor.shutdown_grace_secs);
        let reloader = DevReloader::new(&config.watcher, grace, args.tenant);
        let shutdown = install_signal_handler();
        return reloader.run(shutdown).await;
    }

    let db = Arc::new(Database::open(&config.storage.database_path).await?);
    let tenant_registry = Arc::new(TenantRegistry::new(db.clone()));

    if args.list {
        crate::webhooks::print_tenant_list(&tenant_registry).await?;
        return Ok(());
    }

    // Resolve the tenants this invocation covers.
    let tenants: Vec<Tenant> = match args.tenant {
        Some(tenant_id) => {
            let tenant = tenant_registry.get_active(tenant_id).await?;
            if !tenant.has_credential() {
                return Err(TarjimaError::Config(format!(
                    "tenant {tenant_id} has no bot credential configured"
                )));
            }
            vec![tenant]
        }
        None => tenant_registry.active_with_bots().await?,
    };

    if tenants.is_empty() {
        warn!("no active tenants with bot credentials; nothing to run");
        return Ok(());
    }

    // Refuse to double-start this scope; the lock names the owning PID.
    let scope = match args.tenant {
        Some(tenant_id) => LockScope::Tenant(tenant_id),
        None => LockScope::All,
    };
    let _lock = PidLock::acquire(
        Path::new(&config.supervisor.lock_dir),
        scope,
        &scope.signature(),
    )?;

    // Shared services every runtime consumes.
    let store = Arc::new(ConversationStore::new(db.clone()));
    let ledger = Arc::new(PaymentLedger::new(db.clone()));
    let factory = telegram_factory(config.telegram.api_url.clone());
    let router = Arc::new(NotificationRouter::new(factory.clone()));
    let services = RuntimeServices {
        store: store.clone(),
        ledger,
        router,
        tenants: tenant_registry.clone(),
        db: db.clone(),
    };

    let runtime_registry = Arc::new(RuntimeRegistry::new());
    let mut supervisor = Supervisor::new(
        runtime_registry.clone(),
        config.supervisor.clone(),
        config.telegram.poll_timeout_secs,
    );

    // A single explicit tenant always runs in-process; otherwise isolation
    // policy and tenant count decide.
    let mode = match args.tenant {
        Some(_) => RunMode::Tasks,
        None => select_mode(config.supervisor.isolate, tenants.len()),
    };

    let started = supervisor.start(&tenants, mode, &services, &factory)?;
    if started == 0 {
        warn!("no runtimes started");
        return Ok(());
    }
    info!(started, mode = ?mode, "bot runtimes running");

    let shutdown = install_signal_handler();

    // The gateway serves the runtimes hosted in this process; subprocess
    // children poll only (their gateway is disabled at spawn).
    let gateway_handle = if config.gateway.enabled && mode == RunMode::Tasks {
        let state = GatewayState::new(runtime_registry.clone());
        let host = config.gateway.host.clone();
        let port = config.gateway.port;
        Some(tokio::spawn(async move {
            if let Err(e) = tarjima_gateway::start_server(&host, port, state).await {
                warn!(error = %e, "gateway server stopped");
            }
        }))
    } else {
        if config.gateway.enabled {
            info!("gateway skipped: runtimes are isolated in subprocesses");
        }
        None
    };

    // Sweep abandoned wizards so the shared store does not accumulate.
    {
        let store = store.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PURGE_INTERVAL);
            interval.tick().await; // skip the immediate tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        match store.purge_expired().await {
                            Ok(0) => {}
                            Ok(purged) => info!(purged, "expired conversations purged"),
                            Err(e) => warn!(error = %e, "conversation purge failed"),
                        }
                    }
                }
            }
        });
    }

    // Monitor child liveness until a shutdown signal arrives, then drain.
    supervisor.run_until(shutdown.clone()).await;
    supervisor.stop().await;

    if let Some(handle) = gateway_handle {
        handle.abort();
    }

    db.close().await?;
    info!("tarjima serve shutdown complete");
    Ok(())
}
