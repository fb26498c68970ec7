//! Library crate for whisper-back: game-phase orchestration for Whisperamm rooms,
//! exposed for the server binary and integration tests.

/// Game rules, phase durations and the word list.
pub mod config;
/// Persistence layer: records and store backends.
pub mod dao;
/// Wire payloads of the HTTP and WebSocket API.
pub mod dto;
pub mod error;
/// Axum routers.
pub mod routes;
/// Game logic called by the routes and the phase timers.
pub mod services;
/// Shared in-process state.
pub mod state;
