//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the call API, the streaming turn endpoints, and the OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        CallInfo, CallStatus, ChatPayload, ErrorResponse, SessionPayload, StartCallResponse,
        StatusResponse, SubmitTurnPayload, TextOnlyPayload,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::start_call,
        handlers::end_call,
        handlers::interrupt_call,
        handlers::call_status,
        handlers::submit_turn,
        handlers::chat,
        handlers::text_only,
        handlers::health,
    ),
    components(
        schemas(StartCallResponse, StatusResponse, CallInfo, CallStatus, SessionPayload, SubmitTurnPayload, ChatPayload, TextOnlyPayload, ErrorResponse)
    ),
    tags(
        (name = "Omnicall API", description = "Real-time voice calls relayed to a multimodal model")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/call/start", post(handlers::start_call))
        .route("/api/call/end", post(handlers::end_call))
        .route("/api/call/interrupt", post(handlers::interrupt_call))
        .route("/api/call/{session_id}", get(handlers::call_status))
        .route("/api/voice-chat", post(handlers::submit_turn))
        .route("/api/chat", post(handlers::chat))
        .route("/api/text-only", post(handlers::text_only))
        .route("/health", get(handlers::health))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
