//! Withdraw server: Axum HTTP + WebSocket front for the moderation core.

mod web_server;

pub use web_server::{build_router, build_state, run_web_server, AppState};
