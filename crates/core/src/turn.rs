//! Conversation Turns
//!
//! A `Turn` is one logical exchange in a call. Its serde shape is exactly the
//! message shape accepted by OpenAI-compatible multimodal chat completions, so
//! session history can be handed to the upstream client without conversion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Container format tag carried next to every audio payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    Ogg,
    Webm,
    Pcm,
}

impl AudioFormat {
    /// Maps a MIME type such as `audio/wav` or `audio/webm` to a format tag.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let subtype = mime.trim().to_ascii_lowercase();
        let subtype = subtype.strip_prefix("audio/").unwrap_or(&subtype);
        match subtype {
            "wav" | "wave" | "x-wav" | "vnd.wave" => Some(Self::Wav),
            "mp3" | "mpeg" | "mpeg3" | "x-mpeg-3" => Some(Self::Mp3),
            "ogg" | "opus" => Some(Self::Ogg),
            "webm" => Some(Self::Webm),
            "pcm" | "l16" => Some(Self::Pcm),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Webm => "webm",
            Self::Pcm => "pcm",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio in the canonical envelope: `data:;base64,<payload>` plus a format tag.
///
/// Only [`crate::audio::normalize`] constructs values of this type from client
/// input, so anything holding one has already been validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAudio {
    pub data: String,
    pub format: AudioFormat,
}

/// One element of a multi-part turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    InputAudio { input_audio: NormalizedAudio },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn audio(input_audio: NormalizedAudio) -> Self {
        Self::InputAudio { input_audio }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::InputAudio { .. })
    }
}

/// Turn content: plain text for compactness, or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
    /// Set on assistant turns whose reply included spoken audio. Raw audio is
    /// never kept in history and this marker is never sent upstream.
    #[serde(skip)]
    pub has_audio: bool,
}

impl Turn {
    pub fn user(content: TurnContent) -> Self {
        Self {
            role: Role::User,
            content,
            has_audio: false,
        }
    }

    pub fn assistant(text: impl Into<String>, has_audio: bool) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
            has_audio,
        }
    }

    /// Returns the plain text of the turn, if it is a text-only turn.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(text) => Some(text),
            TurnContent::Parts(_) => None,
        }
    }
}
