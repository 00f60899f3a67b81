// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP webhook gateway built on axum.
//!
//! Routes inbound platform updates to the runtime registered for the target
//! tenant. Handlers only decode and enqueue, so a request returns as soon
//! as the update sits in the runtime's inbox. The legacy single-tenant
//! endpoint is kept for deployments that registered their webhook before
//! tenant ids appeared in the URL.

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use tarjima_core::{RuntimeRegistry, TarjimaError};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Tenant-to-runtime routing table.
    pub registry: Arc<RuntimeRegistry>,
    /// Process start time for uptime reporting.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(registry: Arc<RuntimeRegistry>) -> Self {
        Self {
            registry,
            start_time: Instant::now(),
        }
    }
}

/// Build the gateway router.
///
/// Routes:
/// - `POST /bot/webhook/{tenant_id}/` webhook per tenant
/// - `POST /bot/webhook/` legacy single-tenant webhook
/// - `GET /health` unauthenticated liveness endpoint
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/bot/webhook/{tenant_id}/", post(handlers::post_webhook))
        .route("/bot/webhook/", post(handlers::post_webhook_legacy))
        .route("/health", get(handlers::get_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the gateway until the process exits.
pub async fn start_server(
    host: &str,
    port: u16,
    state: GatewayState,
) -> Result<(), TarjimaError> {
    let app = router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TarjimaError::Platform {
            message: format!("failed to bind gateway to {addr}: {e}"),
            retryable: false,
            source: Some(Box::new(e)),
        })?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| TarjimaError::Platform {
            message: format!("gateway server error: {e}"),
            retryable: false,
            source: Some(Box::new(e)),
        })?;

    Ok(())
}
