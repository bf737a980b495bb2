//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the session store
//! and the relay shared by every handler.

use omnicall_core::{SessionStore, StreamRelay};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub relay: StreamRelay,
}

impl AppState {
    pub fn new(relay: StreamRelay) -> Self {
        Self {
            sessions: relay.store().clone(),
            relay,
        }
    }
}
