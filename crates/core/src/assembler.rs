//! Turn assembly: raw client input in, canonical turns out.

use crate::audio;
use crate::session::{SessionError, SessionId, SessionStore};
use crate::turn::{Part, Turn, TurnContent};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sent upstream in place of a submission that ended up with no usable input.
pub const FALLBACK_PROMPT: &str =
    "The user sent no usable input. Briefly ask them to say something or type a message.";

/// Raw input for one turn as the client submitted it.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub text: Option<String>,
    /// Base64 audio, optionally wrapped in a data URL.
    pub audio: Option<String>,
    pub is_final: bool,
}

impl Submission {
    /// True when neither text nor audio carries anything.
    pub fn is_empty(&self) -> bool {
        let blank = |field: &Option<String>| field.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.text) && blank(&self.audio)
    }
}

/// What the relay collected from one assistant response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    pub transcript: String,
    pub has_audio: bool,
}

impl AssistantReply {
    /// Plain text when the model produced any, else the spoken transcript.
    pub fn reply_text(&self) -> &str {
        if self.text.is_empty() {
            &self.transcript
        } else {
            &self.text
        }
    }
}

#[derive(Clone)]
pub struct MessageAssembler {
    store: Arc<SessionStore>,
}

impl MessageAssembler {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Builds the user turn for a submission.
    ///
    /// Audio that fails to normalize is dropped with a warning. Parts are
    /// always ordered `[audio, text]`.
    pub fn user_turn(submission: &Submission) -> Turn {
        let text = submission
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let audio = submission
            .audio
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .and_then(|raw| match audio::normalize(raw) {
                Ok(audio) => {
                    debug!(format = %audio.format, "Normalized submitted audio");
                    Some(audio)
                }
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable audio from submission");
                    None
                }
            });

        let content = match (audio, text) {
            (Some(audio), Some(text)) => {
                TurnContent::Parts(vec![Part::audio(audio), Part::text(text)])
            }
            (Some(audio), None) => TurnContent::Parts(vec![Part::audio(audio)]),
            (None, Some(text)) => TurnContent::Text(text.to_string()),
            (None, None) => TurnContent::Text(FALLBACK_PROMPT.to_string()),
        };
        Turn::user(content)
    }

    /// Assembles the user turn and returns the message list to send upstream.
    /// Only final submissions are kept in history.
    pub async fn prepare(
        &self,
        session_id: SessionId,
        submission: &Submission,
    ) -> Result<Vec<Turn>, SessionError> {
        let turn = Self::user_turn(submission);
        let messages = self
            .store
            .prepare_request(session_id, turn, submission.is_final)
            .await?;
        debug!(
            %session_id,
            is_final = submission.is_final,
            messages = messages.len(),
            "Prepared turn request"
        );
        Ok(messages)
    }

    /// Appends the assistant reply for a final turn. Empty replies and replies
    /// to non-final turns are not recorded.
    pub async fn record_reply(&self, session_id: SessionId, reply: &AssistantReply, is_final: bool) {
        if !is_final {
            return;
        }
        let text = reply.reply_text();
        if text.is_empty() && !reply.has_audio {
            debug!(%session_id, "Empty assistant reply, nothing to record");
            return;
        }
        self.store
            .append(session_id, Turn::assistant(text, reply.has_audio))
            .await;
    }
}
