//! Omnicall API Library Crate
//!
//! HTTP surface of the voice-call service: configuration, request models,
//! handlers and routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
