//! HTTP route handlers.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_ok, api_success};
use crate::api::AppState;
use crate::connection::Command;
use crate::error::{SentinelError, SentinelResult};
use crate::protocol_constants::SERVICE_ID;

/// Default and maximum page size for `/api/incidents`.
const DEFAULT_INCIDENT_LIMIT: usize = 50;
const MAX_INCIDENT_LIMIT: usize = 1_000;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ToggleRequest {
    enabled: bool,
}

#[derive(Deserialize)]
struct CommandRequest {
    name: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct IncidentsQuery {
    limit: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/state", get(get_state))
        .route("/api/alerts", get(list_alerts))
        .route("/api/notifications", get(list_notifications))
        .route("/api/counters", get(get_counters))
        .route("/api/incidents", get(list_incidents))
        .route("/api/events", get(stream_events))
        .route("/api/sound", get(get_sound).post(set_sound))
        .route("/api/commands", post(send_command))
        .route("/api/ai", post(toggle_ai))
        .route("/api/session/reset", post(reset_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe. Reports the connection state but never fails on it.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "connection": state.controller.connection_state(),
    }))
}

async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.controller.stats())
}

async fn list_alerts(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "alerts": state.controller.recent_alerts() }))
}

async fn list_notifications(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "notifications": state.controller.notifications() }))
}

async fn get_counters(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "counters": state.controller.counters() }))
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentsQuery>,
) -> SentinelResult<impl IntoResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_INCIDENT_LIMIT)
        .min(MAX_INCIDENT_LIMIT);
    let incidents = state.controller.incidents(limit).await?;
    Ok(api_success(json!({ "incidents": incidents })))
}

/// Streams lifecycle, alert, and command events as server-sent events.
///
/// A client that falls behind skips the events it missed.
async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.controller.subscribe_events()).filter_map(
        |msg| async move {
            match msg {
                Ok(event) => match Event::default().json_data(&event) {
                    Ok(sse) => Some(Ok(sse)),
                    Err(e) => {
                        log::warn!("[API] Failed to encode event: {}", e);
                        None
                    }
                },
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    log::warn!("[API] Event stream lagged, skipped {} events", skipped);
                    None
                }
            }
        },
    );
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn get_sound(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "enabled": state.controller.sound_enabled() }))
}

async fn set_sound(
    State(state): State<AppState>,
    Json(body): Json<ToggleRequest>,
) -> impl IntoResponse {
    state.controller.set_sound_enabled(body.enabled);
    api_success(json!({ "enabled": body.enabled }))
}

/// Sends an arbitrary command; 409 when it could not be transmitted.
async fn send_command(
    State(state): State<AppState>,
    Json(body): Json<CommandRequest>,
) -> SentinelResult<impl IntoResponse> {
    if body.name.trim().is_empty() {
        return Err(SentinelError::InvalidRequest(
            "command name must not be empty".into(),
        ));
    }
    state
        .controller
        .send_command(Command::new(body.name, body.payload))?;
    Ok(api_ok())
}

async fn toggle_ai(
    State(state): State<AppState>,
    Json(body): Json<ToggleRequest>,
) -> SentinelResult<impl IntoResponse> {
    state.controller.toggle_ai(body.enabled)?;
    Ok(api_ok())
}

async fn reset_session(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.reset_session().await;
    api_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::controller::AlertController;
    use crate::services::NoopAlarmPlayer;

    async fn spawn_api() -> (String, Arc<AlertController>) {
        let controller = Arc::new(
            AlertController::builder()
                .alarm_player(Arc::new(NoopAlarmPlayer))
                .build()
                .unwrap(),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(AppState::new(Arc::clone(&controller)));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), controller)
    }

    #[tokio::test]
    async fn health_reports_service_and_state() {
        let (base, _controller) = spawn_api().await;
        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], SERVICE_ID);
        assert_eq!(body["connection"], "disconnected");
    }

    #[tokio::test]
    async fn command_while_disconnected_is_409() {
        let (base, _controller) = spawn_api().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/ai", base))
            .json(&json!({ "enabled": false }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 409);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "not_connected");
    }

    #[tokio::test]
    async fn blank_command_name_is_400() {
        let (base, _controller) = spawn_api().await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/commands", base))
            .json(&json!({ "name": "" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn sound_preference_round_trips() {
        let (base, controller) = spawn_api().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/sound", base))
            .json(&json!({ "enabled": false }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert!(!controller.sound_enabled());

        let body: Value = client
            .get(format!("{}/api/sound", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["enabled"], false);
    }

    #[tokio::test]
    async fn empty_views_and_disabled_incident_log() {
        let (base, _controller) = spawn_api().await;

        let alerts: Value = reqwest::get(format!("{}/api/alerts", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(alerts["alerts"], json!([]));

        let counters: Value = reqwest::get(format!("{}/api/counters", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(counters["counters"], json!({}));

        let incidents = reqwest::get(format!("{}/api/incidents?limit=5", base))
            .await
            .unwrap();
        assert_eq!(incidents.status().as_u16(), 503);
    }

    #[tokio::test]
    async fn state_exposes_stats() {
        let (base, _controller) = spawn_api().await;
        let body: Value = reqwest::get(format!("{}/api/state", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["state"], "disconnected");
        assert_eq!(body["url"], "ws://localhost:8000/ws/alerts");
        assert_eq!(body["subscribers"].as_array().unwrap().len(), 4);
    }
}
