use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::engine::EngineError;
use crate::engine::EntityCommand;
use crate::integrations::dali_center::trigger;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match self {
            EngineError::UnknownEntity(_) | EngineError::UnknownDomain(_) => StatusCode::NOT_FOUND,
            EngineError::IntegrationGone(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn accepted() -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(PingResponse {
            status: "accepted".to_string(),
        }),
    )
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/states
#[tracing::instrument(skip(state))]
async fn states(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(crate::engine::State::clone(&state.engine.state_snapshot()))
}

/// Handler for GET /v1/notifications
#[tracing::instrument(skip(state))]
async fn notifications(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.hub().notifications.all())
}

/// Handler for POST /v1/services/:domain/:service
#[tracing::instrument(skip(state, data))]
async fn call_service(
    State(state): State<Arc<AppState>>,
    Path((domain, service)): Path<(String, String)>,
    Json(data): Json<serde_json::Value>,
) -> Result<impl IntoResponse, EngineError> {
    state.engine.call_service(&domain, &service, data)?;
    Ok(accepted())
}

/// Handler for POST /v1/entities/:entity_id/command
#[tracing::instrument(skip(state))]
async fn entity_command(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(command): Json<EntityCommand>,
) -> Result<impl IntoResponse, EngineError> {
    state.engine.send_entity_command(entity_id, command)?;
    Ok(accepted())
}

/// Handler for GET /v1/devices/:device_id/triggers
#[tracing::instrument(skip(state))]
async fn device_triggers(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    Json(trigger::get_triggers(state.engine.hub(), &device_id))
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/states", get(states))
        .route("/v1/notifications", get(notifications))
        .route("/v1/services/:domain/:service", post(call_service))
        .route("/v1/entities/:entity_id/command", post(entity_command))
        .route("/v1/devices/:device_id/triggers", get(device_triggers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::engine::device::DeviceSpec;
    use crate::engine::entity::EntityRegistration;
    use crate::engine::notification::NotificationSink;

    fn router() -> (Arc<Engine>, Router) {
        let engine = Arc::new(Engine::new());
        let state = Arc::new(AppState {
            version: "test",
            engine: engine.clone(),
        });
        (engine, create_router(state))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let (_, app) = router();
        let response = app
            .oneshot(Request::get("/v1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        insta::assert_snapshot!(body_json(response).await.to_string(), @r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_notifications_are_listed() {
        let (engine, app) = router();
        engine.hub().notifications.create(
            "dali_center_scan_GW1",
            "DALI Center (GW1): Bus Scan",
            "Scanning DALI bus. Light control may be temporarily unresponsive.",
        );

        let response = app
            .oneshot(Request::get("/v1/notifications").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body[0]["notification_id"], "dali_center_scan_GW1");
        assert_eq!(body[0]["title"], "DALI Center (GW1): Bus Scan");
    }

    #[tokio::test]
    async fn test_service_for_unknown_domain_is_not_found() {
        let (_, app) = router();
        let response = app
            .oneshot(
                Request::post("/v1/services/dali_center/scan_bus")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"device_id": "abc"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "No integration handles domain: dali_center"
        );
    }

    #[tokio::test]
    async fn test_command_for_unknown_entity_is_not_found() {
        let (_, app) = router();
        let response = app
            .oneshot(
                Request::post("/v1/entities/light.desk/command")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"command": "turn_off"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_device_triggers() {
        let (engine, app) = router();
        let hub = engine.hub();
        let device = hub.devices.get_or_create(
            "entry1",
            DeviceSpec::new(("dali_center".to_string(), "panel1".to_string())),
        );
        hub.entities.get_or_create(EntityRegistration {
            domain: "event",
            platform: "dali_center",
            unique_id: "panel1_panel_events",
            suggested_object_id: "Hall Panel Buttons",
            device_id: Some(device.id.clone()),
            config_entry_id: Some("entry1".to_string()),
            capabilities: serde_json::json!({"event_types": ["button_1_press"]}),
        });

        let response = app
            .oneshot(
                Request::get(format!("/v1/devices/{}/triggers", device.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["entity_id"], "event.hall_panel_buttons");
        assert_eq!(body[0]["type"], "button_1_press");
    }
}
