//! Withdraw core: OneBot event model, bot session registry, push/pull delivery, container
//! duration probe, QR heuristic scanner, per-group moderation state and the dispatcher tying them
//! together. No HTTP server here.

pub mod config;
pub mod container;
pub mod db;
pub mod delivery;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod event_log;
pub mod media;
pub mod onebot;
pub mod qr;
pub mod session;
pub mod state;

pub use error::{Error, Result};
