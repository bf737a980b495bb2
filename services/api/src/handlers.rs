//! Axum Handlers for the Call API
//!
//! Every handler is a thin adapter: it parses the request, calls into the
//! core session store or relay, and maps the result onto HTTP. Turn responses
//! are streamed as server-sent events, one `{"type", "content"}` object per
//! event.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;
use omnicall_core::{RelayEvent, SessionError, SubmitError};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    models::{
        CallInfo, CallStatus, ChatPayload, ErrorResponse, SessionPayload, StartCallResponse,
        StatusResponse, SubmitTurnPayload, TextOnlyPayload,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => Self::NotFound(err.to_string()),
            SessionError::Busy(_) => Self::Conflict(err.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::EmptyInput => Self::BadRequest(err.to_string()),
            SubmitError::Session(err) => err.into(),
        }
    }
}

fn event_stream(events: ReceiverStream<RelayEvent>) -> impl IntoResponse {
    let events = events.map(|event| Event::default().json_data(event.into_wire()));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Start a new call session.
#[utoipa::path(
    post,
    path = "/api/call/start",
    responses(
        (status = 200, description = "Call started", body = StartCallResponse)
    )
)]
pub async fn start_call(State(state): State<Arc<AppState>>) -> Json<StartCallResponse> {
    let session_id = state.sessions.create().await;
    Json(StartCallResponse {
        session_id,
        status: CallStatus::Started,
    })
}

/// End a call session and discard its history.
#[utoipa::path(
    post,
    path = "/api/call/end",
    request_body = SessionPayload,
    responses(
        (status = 200, description = "Call ended", body = StatusResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionPayload>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.sessions.remove(payload.session_id).await?;
    Ok(Json(StatusResponse {
        status: CallStatus::Ended,
    }))
}

/// Interrupt the response currently being streamed for a call.
#[utoipa::path(
    post,
    path = "/api/call/interrupt",
    request_body = SessionPayload,
    responses(
        (status = 200, description = "Interrupt requested", body = StatusResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn interrupt_call(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionPayload>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.sessions.interrupt(payload.session_id).await?;
    Ok(Json(StatusResponse {
        status: CallStatus::Interrupted,
    }))
}

/// Get the current state of a call.
#[utoipa::path(
    get,
    path = "/api/call/{session_id}",
    responses(
        (status = 200, description = "Call details", body = CallInfo),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn call_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CallInfo>, ApiError> {
    let session = state.sessions.get(session_id).await?;
    Ok(Json(CallInfo {
        session_id,
        status: session.status().into(),
        turns: session.history.len(),
        created_at: session.created_at,
    }))
}

/// Submit one user turn and stream the assistant's response.
#[utoipa::path(
    post,
    path = "/api/voice-chat",
    request_body = SubmitTurnPayload,
    responses(
        (status = 200, description = "Stream of response events", body = String, content_type = "text/event-stream"),
        (status = 400, description = "No text or audio provided", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Call is already responding", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(session_id = %payload.session_id, is_final = payload.is_final))]
pub async fn submit_turn(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitTurnPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(level) = payload.audio_level {
        debug!(audio_level = level, "Client input level");
    }
    let session_id = payload.session_id;
    let events = state
        .relay
        .submit(session_id, payload.into_submission())
        .await
        .inspect_err(|e| warn!(error = %e, "Turn rejected"))?;
    Ok(event_stream(events))
}

/// One-shot exchange without a call session.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatPayload,
    responses(
        (status = 200, description = "Stream of response events", body = String, content_type = "text/event-stream"),
        (status = 400, description = "No text or audio provided", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let events = state.relay.submit_detached(payload.into())?;
    Ok(event_stream(events))
}

/// One-shot text exchange without a call session.
#[utoipa::path(
    post,
    path = "/api/text-only",
    request_body = TextOnlyPayload,
    responses(
        (status = 200, description = "Stream of response events", body = String, content_type = "text/event-stream"),
        (status = 400, description = "No text input provided", body = ErrorResponse)
    )
)]
pub async fn text_only(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TextOnlyPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.text.as_deref().is_none_or(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("No text input provided".to_string()));
    }
    let events = state.relay.submit_detached(payload.into())?;
    Ok(event_stream(events))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up")
    )
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
