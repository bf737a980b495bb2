//! API Models
//!
//! Request and response bodies for the call API, with `utoipa` schemas for the
//! generated OpenAPI document.

use chrono::{DateTime, Utc};
use omnicall_core::{Submission, session::SessionStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Started,
    Ended,
    Interrupted,
    Idle,
    Speaking,
}

impl From<SessionStatus> for CallStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Idle => Self::Idle,
            SessionStatus::Speaking => Self::Speaking,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct StartCallResponse {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(example = "started")]
    pub status: CallStatus,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct StatusResponse {
    pub status: CallStatus,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct CallInfo {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(example = "idle")]
    pub status: CallStatus,
    /// Number of turns kept in the call history.
    pub turns: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct SessionPayload {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
}

fn default_true() -> bool {
    true
}

/// One user turn for a call.
#[derive(Deserialize, ToSchema, Debug)]
pub struct SubmitTurnPayload {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(example = "What's the weather like?")]
    pub text: Option<String>,
    /// Base64 audio, bare or as a `data:` URL.
    pub audio: Option<String>,
    /// Whether this submission completes the user's turn.
    #[serde(default = "default_true")]
    pub is_final: bool,
    /// Input level reported by the client's recorder.
    pub audio_level: Option<f32>,
}

impl SubmitTurnPayload {
    pub fn into_submission(self) -> Submission {
        Submission {
            text: self.text,
            audio: self.audio,
            is_final: self.is_final,
        }
    }
}

/// A one-shot exchange outside of any call.
#[derive(Deserialize, ToSchema, Debug)]
pub struct ChatPayload {
    pub text: Option<String>,
    pub audio: Option<String>,
}

impl From<ChatPayload> for Submission {
    fn from(payload: ChatPayload) -> Self {
        Submission {
            text: payload.text,
            audio: payload.audio,
            is_final: true,
        }
    }
}

/// A one-shot, text-only exchange outside of any call.
#[derive(Deserialize, ToSchema, Debug)]
pub struct TextOnlyPayload {
    #[schema(example = "Tell me a joke")]
    pub text: Option<String>,
}

impl From<TextOnlyPayload> for Submission {
    fn from(payload: TextOnlyPayload) -> Self {
        Submission {
            text: payload.text,
            audio: None,
            is_final: true,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_status_serialization() {
        assert_eq!(serde_json::to_string(&CallStatus::Started).unwrap(), "\"started\"");
        assert_eq!(serde_json::to_string(&CallStatus::Speaking).unwrap(), "\"speaking\"");
        assert_eq!(CallStatus::from(SessionStatus::Idle), CallStatus::Idle);
    }

    #[test]
    fn test_submit_payload_defaults_to_final() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"session_id": "{id}", "text": "hello"}}"#);
        let payload: SubmitTurnPayload = serde_json::from_str(&json).unwrap();

        assert_eq!(payload.session_id, id);
        assert!(payload.is_final);
        assert!(payload.audio.is_none());

        let submission = payload.into_submission();
        assert_eq!(submission.text.as_deref(), Some("hello"));
        assert!(submission.is_final);
    }

    #[test]
    fn test_submit_payload_accepts_client_fields() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"session_id": "{id}", "audio": "UklGRg==", "audio_level": 0.42, "is_final": false}}"#
        );
        let payload: SubmitTurnPayload = serde_json::from_str(&json).unwrap();

        assert!(!payload.is_final);
        assert_eq!(payload.audio_level, Some(0.42));
    }

    #[test]
    fn test_submit_payload_requires_session_id() {
        let result: Result<SubmitTurnPayload, _> = serde_json::from_str(r#"{"text": "hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_text_only_payload_ignores_audio() {
        let payload: TextOnlyPayload =
            serde_json::from_str(r#"{"text": "hi", "audio": "UklGRg=="}"#).unwrap();
        let submission = Submission::from(payload);

        assert_eq!(submission.text.as_deref(), Some("hi"));
        assert!(submission.audio.is_none());
        assert!(submission.is_final);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Session not found"}"#);
    }
}
