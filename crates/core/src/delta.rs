//! Decoding of streamed completion chunks.
//!
//! Every chunk is decoded leniently and reduced to at most one event, by
//! priority: text content, then audio data, then audio transcript, then
//! usage. A chunk that matches none of these is skipped, never an error.

use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

/// The event carried by a single upstream chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaEvent {
    Text(String),
    /// A base64 audio fragment.
    Audio(String),
    Transcript(String),
    Usage(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedDelta {
    pub event: Option<DeltaEvent>,
    /// The chunk carried a `finish_reason`.
    pub finished: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    audio: Option<AudioDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct AudioDelta {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

pub fn classify(raw: Value) -> ClassifiedDelta {
    let Ok(chunk) = serde_json::from_value::<Chunk>(raw) else {
        return ClassifiedDelta::default();
    };

    let choice = chunk.choices.and_then(|choices| choices.into_iter().next());
    let Some(choice) = choice else {
        // Choice-less chunks are metadata only.
        return ClassifiedDelta {
            event: chunk.usage.filter(|u| !u.is_null()).map(DeltaEvent::Usage),
            finished: false,
        };
    };

    let finished = choice.finish_reason.is_some_and(|r| !r.is_empty());
    let event = choice.delta.and_then(|delta| {
        if let Some(text) = non_empty(delta.content) {
            let dropped_audio = delta
                .audio
                .as_ref()
                .and_then(|audio| audio.data.as_deref())
                .is_some_and(|data| !data.is_empty());
            if dropped_audio {
                trace!(
                    text_len = text.len(),
                    "Chunk carries both text and audio; keeping the text only"
                );
            }
            return Some(DeltaEvent::Text(text));
        }
        let audio = delta.audio?;
        non_empty(audio.data)
            .map(DeltaEvent::Audio)
            .or_else(|| non_empty(audio.transcript).map(DeltaEvent::Transcript))
    });

    ClassifiedDelta { event, finished }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_wins_over_audio() {
        let delta = classify(json!({
            "choices": [{"delta": {"content": "Hi", "audio": {"data": "AAAA"}}}]
        }));
        assert_eq!(delta.event, Some(DeltaEvent::Text("Hi".into())));
        assert!(!delta.finished);
    }

    #[test]
    fn test_audio_data_wins_over_transcript() {
        let delta = classify(json!({
            "choices": [{"delta": {"audio": {"data": "AAAA", "transcript": "hi"}}}]
        }));
        assert_eq!(delta.event, Some(DeltaEvent::Audio("AAAA".into())));
    }

    #[test]
    fn test_transcript_only() {
        let delta = classify(json!({
            "choices": [{"delta": {"content": "", "audio": {"transcript": "hello"}}}]
        }));
        assert_eq!(delta.event, Some(DeltaEvent::Transcript("hello".into())));
    }

    #[test]
    fn test_usage_chunk_without_choices() {
        let usage = json!({"prompt_tokens": 12, "completion_tokens": 30});
        let delta = classify(json!({"choices": [], "usage": usage.clone()}));
        assert_eq!(delta.event, Some(DeltaEvent::Usage(usage.clone())));

        let delta = classify(json!({"usage": usage.clone()}));
        assert_eq!(delta.event, Some(DeltaEvent::Usage(usage)));
    }

    #[test]
    fn test_finish_reason_is_reported() {
        let delta = classify(json!({
            "choices": [{"delta": {"content": "."}, "finish_reason": "stop"}]
        }));
        assert_eq!(delta.event, Some(DeltaEvent::Text(".".into())));
        assert!(delta.finished);

        let delta = classify(json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}));
        assert_eq!(delta.event, None);
        assert!(delta.finished);
    }

    #[test]
    fn test_unrecognized_shapes_are_skipped() {
        for raw in [
            json!({}),
            json!({"choices": [{"delta": {"role": "assistant"}}]}),
            json!({"choices": [{"delta": {"audio": {}}}]}),
            json!({"choices": "garbage"}),
            json!({"choices": [], "usage": null}),
            json!("not an object"),
        ] {
            assert_eq!(classify(raw), ClassifiedDelta::default());
        }
    }
}
