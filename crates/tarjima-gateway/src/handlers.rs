// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the webhook gateway.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, warn};

use tarjima_core::TarjimaError;

use crate::GatewayState;

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub runtimes: usize,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Acknowledgement body for accepted webhook calls.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

fn ack() -> Response {
    (StatusCode::OK, Json(AckResponse { ok: true })).into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// `POST /bot/webhook/{tenant_id}/`
///
/// Decodes the platform update and enqueues it on the tenant's runtime.
/// Updates the wizard ignores are acknowledged without routing, so the
/// platform does not keep re-delivering them.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    Path(tenant_id): Path<i64>,
    body: String,
) -> Response {
    let update = match tarjima_telegram::decode_webhook_update(tenant_id, &body) {
        Ok(Some(update)) => update,
        Ok(None) => {
            debug!(tenant_id, "ignoring unsupported webhook update");
            return ack();
        }
        Err(e) => {
            warn!(tenant_id, error = %e, "malformed webhook payload");
            return error_response(StatusCode::BAD_REQUEST, "malformed update payload");
        }
    };

    match state.registry.route(update).await {
        Ok(()) => ack(),
        Err(TarjimaError::RuntimeUnavailable { .. }) => {
            warn!(tenant_id, "webhook update for unregistered tenant");
            error_response(
                StatusCode::NOT_FOUND,
                format!("no runtime registered for tenant {tenant_id}"),
            )
        }
        Err(e) => {
            warn!(tenant_id, error = %e, "failed to route webhook update");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "routing failed")
        }
    }
}

/// `POST /bot/webhook/`
///
/// Legacy single-tenant endpoint; routes through the default runtime slot.
pub async fn post_webhook_legacy(State(state): State<GatewayState>, body: String) -> Response {
    // Tenant id 0 is a placeholder; the registry stamps the default tenant.
    let update = match tarjima_telegram::decode_webhook_update(0, &body) {
        Ok(Some(update)) => update,
        Ok(None) => return ack(),
        Err(e) => {
            warn!(error = %e, "malformed legacy webhook payload");
            return error_response(StatusCode::BAD_REQUEST, "malformed update payload");
        }
    };

    match state.registry.route_default(update).await {
        Ok(()) => ack(),
        Err(TarjimaError::RuntimeUnavailable { .. }) => {
            error_response(StatusCode::NOT_FOUND, "no default runtime registered")
        }
        Err(e) => {
            warn!(error = %e, "failed to route legacy webhook update");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "routing failed")
        }
    }
}

/// `GET /health`
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        runtimes: state.registry.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tarjima_core::types::UpdateKind;
    use tarjima_core::RuntimeRegistry;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn update_body() -> String {
        serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 5,
                "date": 1700000000i64,
                "chat": {"id": 42i64, "type": "private", "first_name": "T"},
                "from": {"id": 42u64, "is_bot": false, "first_name": "T"},
                "text": "/start",
            }
        })
        .to_string()
    }

    fn post(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn webhook_routes_to_registered_runtime() {
        let registry = Arc::new(RuntimeRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(3, tx);
        let app = router(GatewayState::new(registry));

        let response = app
            .oneshot(post("/bot/webhook/3/", update_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.tenant_id, 3);
        assert!(matches!(update.kind, UpdateKind::Text(ref t) if t == "/start"));
    }

    #[tokio::test]
    async fn unregistered_tenant_is_not_found() {
        let registry = Arc::new(RuntimeRegistry::new());
        let app = router(GatewayState::new(registry));

        let response = app
            .oneshot(post("/bot/webhook/9/", update_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let registry = Arc::new(RuntimeRegistry::new());
        let (tx, _rx) = mpsc::channel(4);
        registry.register(3, tx);
        let app = router(GatewayState::new(registry));

        let response = app
            .oneshot(post("/bot/webhook/3/", "not json".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ignored_update_kinds_are_acknowledged() {
        let registry = Arc::new(RuntimeRegistry::new());
        let app = router(GatewayState::new(registry));

        // Edited messages are not part of the wizard flow.
        let body = serde_json::json!({
            "update_id": 2,
            "edited_message": {
                "message_id": 5,
                "date": 1700000000i64,
                "edit_date": 1700000100i64,
                "chat": {"id": 42i64, "type": "private", "first_name": "T"},
                "from": {"id": 42u64, "is_bot": false, "first_name": "T"},
                "text": "edited",
            }
        })
        .to_string();

        let response = app.oneshot(post("/bot/webhook/3/", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn legacy_endpoint_routes_to_default_runtime() {
        let registry = Arc::new(RuntimeRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(7, tx);
        let app = router(GatewayState::new(registry));

        let response = app
            .oneshot(post("/bot/webhook/", update_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.tenant_id, 7, "default slot stamps the tenant id");
    }

    #[tokio::test]
    async fn health_reports_runtime_count() {
        let registry = Arc::new(RuntimeRegistry::new());
        let (tx, _rx) = mpsc::channel(4);
        registry.register(1, tx);
        let app = router(GatewayState::new(registry));

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let health: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["runtimes"], 1);
    }
}
