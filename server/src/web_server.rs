//! Axum HTTP + WebSocket server: OneBot push endpoint (gateways connect here and stream events),
//! plus the probe endpoints /videoDuration and /picheck.
//! Each connection is handled sequentially; outbound frames go through a per-connection writer task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use withdraw_core::config::Config;
use withdraw_core::delivery::Delivery;
use withdraw_core::discovery::Discovery;
use withdraw_core::dispatcher::{Dispatcher, MessageTarget};
use withdraw_core::event_log::DailyFileLog;
use withdraw_core::media::MediaPipeline;
use withdraw_core::onebot::event::lifecycle_connect;
use withdraw_core::onebot::log::prefix;
use withdraw_core::onebot::parse_event;
use withdraw_core::session::{SessionFrame, SessionRegistry};
use withdraw_core::state::ModerationState;

/// Query params for the WS endpoint. The token may also come from the Authorization header.
#[derive(Deserialize)]
struct WsQuery {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct VideoQuery {
    #[serde(default)]
    videourl: String,
    #[serde(flatten)]
    target: MessageTarget,
}

#[derive(Deserialize)]
struct ImageQuery {
    #[serde(default)]
    imageurl: String,
    #[serde(flatten)]
    target: MessageTarget,
}

/// Shared app state: settings, live push sessions, and the dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build every registry once: state store, discovery map (queried now, never refreshed),
/// delivery, media pipeline and event log.
pub async fn build_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let state = Arc::new(ModerationState::open(&config.state_db)?);
    let sessions = Arc::new(SessionRegistry::new());

    let http = withdraw_core::delivery::http_client(config.fetch_timeout())?;
    let discovery = Arc::new(Discovery::discover(&http, &config.http_paths, &config.access_tokens).await);
    tracing::info!(pull_bots = discovery.len(), "discovery finished");

    let delivery = Arc::new(Delivery::new(
        sessions.clone(),
        discovery,
        http,
        config.kick_and_reject_add_request,
    ));
    let media = Arc::new(MediaPipeline::from_config(&config)?);
    let events = Arc::new(DailyFileLog::new(config.data_dir.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        config.clone(),
        state,
        delivery,
        media.clone(),
        media,
        events,
    ));
    Ok(AppState {
        config,
        sessions,
        dispatcher,
    })
}

pub fn build_router(state: AppState) -> Router {
    let ws_route = state.config.ws_route();
    Router::new()
        .route(&ws_route, get(ws_handler))
        .route("/videoDuration", get(video_duration_handler))
        .route("/picheck", get(picheck_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the server until Ctrl-C. Binds all interfaces: gateways usually run on other hosts.
pub async fn run_web_server(config: Arc<Config>) -> anyhow::Result<()> {
    let state = build_state(config.clone()).await?;
    let sessions = state.sessions.clone();
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("push endpoint ws://{}{}", addr, config.ws_route());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "ctrl-c handler failed");
            }
            tracing::info!("shutting down, closing {} push sessions", sessions.len());
            for session in sessions.list() {
                sessions.close(session.session_id);
            }
        })
        .await?;
    Ok(())
}

/// Token from `Authorization` (`Token x`, `Bearer x` or the bare value), else `access_token`.
fn request_token(headers: &HeaderMap, query_token: Option<&str>) -> String {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if !value.is_empty() => value
            .strip_prefix("Token ")
            .or_else(|| value.strip_prefix("Bearer "))
            .unwrap_or(value)
            .to_string(),
        _ => query_token.unwrap_or_default().to_string(),
    }
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let self_id = headers
        .get("x-self-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_string();

    let expected = state.config.ws_token.as_str();
    if !expected.is_empty() {
        let token = request_token(&headers, query.access_token.as_deref());
        if token.is_empty() {
            tracing::warn!("{} connection rejected: missing token", prefix(&self_id));
            return json_error(StatusCode::UNAUTHORIZED, "Missing token");
        }
        if token != expected {
            tracing::warn!("{} connection rejected: incorrect token", prefix(&self_id));
            return json_error(StatusCode::FORBIDDEN, "Incorrect token");
        }
    }
    if self_id.is_empty() {
        tracing::warn!("push connection without X-Self-ID; actions for it cannot be delivered");
    }
    ws.on_upgrade(move |socket| handle_bot_socket(socket, state, self_id))
}

async fn handle_bot_socket(socket: WebSocket, state: AppState, self_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SessionFrame>();
    let hello = lifecycle_connect(&self_id, chrono::Utc::now().timestamp()).to_string();
    let _ = tx.send(SessionFrame::Text(hello));
    let guard = state.sessions.register(&self_id, tx);
    tracing::info!("{} session={} connected sessions={}", prefix(&self_id), guard.id(), state.sessions.len());

    let writer = async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                SessionFrame::Text(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                SessionFrame::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    };
    let reader = async {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => match parse_event(text.as_str()) {
                    Ok(event) => {
                        state.dispatcher.handle_event(&event).await;
                    }
                    Err(e) => tracing::warn!("{} unparseable frame: {}", prefix(&self_id), e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("{} read error: {}", prefix(&self_id), e);
                    break;
                }
            }
        }
    };
    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    let session_id = guard.id();
    drop(guard);
    tracing::info!("{} session={} disconnected sessions={}", prefix(&self_id), session_id, state.sessions.len());
}

async fn video_duration_handler(State(state): State<AppState>, Query(query): Query<VideoQuery>) -> Response {
    if query.videourl.is_empty() || query.target.self_id.is_empty() || query.target.message_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "videourl, self_id, and message_id parameters are required");
    }
    match state.dispatcher.check_video(&query.target, &query.videourl).await {
        Ok(report) if report.outcome.is_violation() => Json(json!({
            "message": "Message deleted successfully",
            "duration": report.duration,
        }))
        .into_response(),
        Ok(report) => Json(json!({ "duration": report.duration })).into_response(),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn picheck_handler(State(state): State<AppState>, Query(query): Query<ImageQuery>) -> Response {
    if query.imageurl.is_empty() || query.target.self_id.is_empty() || query.target.message_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "imageurl, self_id, and message_id parameters are required");
    }
    match state.dispatcher.check_image(&query.target, &query.imageurl).await {
        Ok(outcome) if outcome.is_violation() => {
            Json(json!({ "message": "Image contains QR code, message deleted." })).into_response()
        }
        Ok(_) => Json(json!({ "message": "No QR code detected in image." })).into_response(),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
