//! Audio envelope normalization.
//!
//! Browsers post audio either as a bare base64 string or wrapped in a data URL
//! (`data:audio/webm;codecs=opus;base64,...`). Everything leaving this module
//! uses the single envelope the completion service expects.

use crate::turn::{AudioFormat, NormalizedAudio};
use base64::Engine;

/// Prefix of every normalized audio payload.
pub const CANONICAL_PREFIX: &str = "data:;base64,";

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio payload is empty")]
    Empty,
    #[error("unsupported audio envelope: {0}")]
    Envelope(String),
    #[error("audio payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Normalizes a client audio blob into the canonical envelope.
///
/// The format tag comes from the data URL's MIME type when there is one,
/// otherwise from the decoded bytes' magic number, falling back to WAV.
pub fn normalize(raw: &str) -> Result<NormalizedAudio, AudioError> {
    let raw = raw.trim();
    let (declared, payload) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| AudioError::Envelope("missing ',' after data URL header".into()))?;
            let mime = header
                .strip_suffix(";base64")
                .ok_or_else(|| AudioError::Envelope(format!("'{header}' is not base64-encoded")))?;
            // `audio/webm;codecs=opus` -> `audio/webm`
            let mime = mime.split(';').next().unwrap_or_default();
            (AudioFormat::from_mime(mime), payload)
        }
        None => (None, raw),
    };

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(AudioError::Empty);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(&payload)?;
    if bytes.is_empty() {
        return Err(AudioError::Empty);
    }

    let format = declared.or_else(|| sniff_format(&bytes)).unwrap_or_default();
    Ok(NormalizedAudio {
        data: format!("{CANONICAL_PREFIX}{payload}"),
        format,
    })
}

/// Guesses a container format from leading magic bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<AudioFormat> {
    match bytes {
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(AudioFormat::Wav),
        [b'I', b'D', b'3', ..] | [0xFF, 0xFB | 0xF3 | 0xF2, ..] => Some(AudioFormat::Mp3),
        [b'O', b'g', b'g', b'S', ..] => Some(AudioFormat::Ogg),
        [0x1A, 0x45, 0xDF, 0xA3, ..] => Some(AudioFormat::Webm),
        _ => None,
    }
}
