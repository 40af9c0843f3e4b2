use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use kujo_discord::gateway::GatewayStatus;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    gateway: GatewayStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub gateway_connected: bool,
    pub checked_at: String,
}

pub fn router(gateway: GatewayStatus) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .with_state(HealthState { gateway })
}

pub async fn spawn(bind_address: &str, port: u16, gateway: GatewayStatus) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(gateway)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Keep-alive target for hosts that ping the root path.
pub async fn liveness() -> &'static str {
    "running"
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = state.gateway.is_connected();

    let payload = HealthResponse {
        status: if connected { "ready" } else { "degraded" },
        gateway_connected: connected,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if connected { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use kujo_discord::gateway::GatewayStatus;
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_gateway_is_connected() {
        let gateway = GatewayStatus::default();
        gateway.set_connected(true);

        let (status, Json(payload)) = health(State(HealthState { gateway })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert!(payload.gateway_connected);
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_before_gateway_connects() {
        let (status, Json(payload)) =
            health(State(HealthState { gateway: GatewayStatus::default() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert!(!payload.gateway_connected);
    }

    #[tokio::test]
    async fn root_path_answers_regardless_of_gateway_state() {
        let response = router(GatewayStatus::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.expect("body");
        assert_eq!(&body[..], b"running");
    }
}
