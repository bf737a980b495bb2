//! Streaming Relay
//!
//! Drives one upstream completion per turn and turns its chunks into typed
//! client events. The relay runs in its own task and talks to the caller over
//! a bounded channel; event order always mirrors upstream order.

use crate::assembler::{AssistantReply, MessageAssembler, Submission};
use crate::delta::{ClassifiedDelta, DeltaEvent, classify};
use crate::interrupt::InterruptFlag;
use crate::llm_client::{CompletionClient, DeltaStream};
use crate::session::{SessionError, SessionId, SessionStore, TurnGuard};
use crate::turn::Turn;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

pub const DEFAULT_AUDIO_BATCH_SIZE: usize = 10;

/// How long the upstream may go without sending a chunk before the turn fails.
pub const DEFAULT_UPSTREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How audio fragments are forwarded to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStrategy {
    /// Forward every fragment as soon as it arrives.
    Immediate,
    /// Concatenate fragments and forward them `batch_size` at a time.
    Batched { batch_size: usize },
}

impl Default for AudioStrategy {
    fn default() -> Self {
        Self::Batched {
            batch_size: DEFAULT_AUDIO_BATCH_SIZE,
        }
    }
}

/// An event streamed back to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Text(String),
    Audio(String),
    Transcript(String),
    Usage(Value),
    Interrupted,
    Error(String),
}

/// Serialized form of a [`RelayEvent`]: `{"type": ..., "content": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: Value,
}

impl RelayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Audio(_) => "audio",
            Self::Transcript(_) => "transcript",
            Self::Usage(_) => "usage",
            Self::Interrupted => "interrupted",
            Self::Error(_) => "error",
        }
    }

    pub fn into_wire(self) -> WireEvent {
        let kind = self.kind();
        let content = match self {
            Self::Text(s) | Self::Audio(s) | Self::Transcript(s) | Self::Error(s) => {
                Value::String(s)
            }
            Self::Usage(usage) => usage,
            Self::Interrupted => Value::String(String::new()),
        };
        WireEvent { kind, content }
    }
}

/// How a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    Interrupted,
    Failed,
    /// The client stopped listening.
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("No text or audio input provided")]
    EmptyInput,
    #[error(transparent)]
    Session(#[from] SessionError),
}

struct AudioBatcher {
    batch_size: usize,
    pending: Vec<String>,
}

impl AudioBatcher {
    fn new(strategy: AudioStrategy) -> Self {
        let batch_size = match strategy {
            AudioStrategy::Immediate => 1,
            AudioStrategy::Batched { batch_size } => batch_size.max(1),
        };
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
        }
    }

    fn push(&mut self, fragment: String) -> Option<String> {
        self.pending.push(fragment);
        if self.pending.len() >= self.batch_size {
            self.flush()
        } else {
            None
        }
    }

    fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.drain(..).collect())
        }
    }
}

/// Per-turn context when the relay is bound to a call session.
struct SessionTurn {
    guard: TurnGuard,
    is_final: bool,
}

#[derive(Clone)]
pub struct StreamRelay {
    client: Arc<dyn CompletionClient>,
    store: Arc<SessionStore>,
    assembler: MessageAssembler,
    strategy: AudioStrategy,
    idle_timeout: Duration,
}

impl StreamRelay {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        store: Arc<SessionStore>,
        strategy: AudioStrategy,
    ) -> Self {
        Self {
            client,
            assembler: MessageAssembler::new(store.clone()),
            store,
            strategy,
            idle_timeout: DEFAULT_UPSTREAM_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Accepts one turn for a session and starts relaying the response.
    ///
    /// Fails without side effects if the input is empty, the session is
    /// unknown, or the session is already speaking.
    pub async fn submit(
        &self,
        session_id: SessionId,
        submission: Submission,
    ) -> Result<ReceiverStream<RelayEvent>, SubmitError> {
        if submission.is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        let guard = self.store.begin_turn(session_id).await?;
        let messages = self.assembler.prepare(session_id, &submission).await?;
        Ok(self.spawn(
            Some(SessionTurn {
                guard,
                is_final: submission.is_final,
            }),
            messages,
        ))
    }

    /// Relays a single exchange with no session, history or interruption.
    pub fn submit_detached(
        &self,
        submission: Submission,
    ) -> Result<ReceiverStream<RelayEvent>, SubmitError> {
        if submission.is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        let turn = MessageAssembler::user_turn(&submission);
        Ok(self.spawn(None, vec![turn]))
    }

    fn spawn(&self, turn: Option<SessionTurn>, messages: Vec<Turn>) -> ReceiverStream<RelayEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let relay = self.clone();
        let span = match &turn {
            Some(t) => info_span!("relay", session_id = %t.guard.session_id(), is_final = t.is_final),
            None => info_span!("relay", session_id = "detached"),
        };
        tokio::spawn(
            async move {
                // The guard is released inside `run`, before `tx` drops and
                // the client sees the end of the stream.
                let outcome = relay.run(turn, messages, &tx).await;
                info!(?outcome, "Relay finished");
            }
            .instrument(span),
        );
        ReceiverStream::new(rx)
    }

    /// Runs one relay to completion. The turn guard is held until this
    /// returns, so the session is speaking for exactly this long.
    async fn run(
        &self,
        turn: Option<SessionTurn>,
        messages: Vec<Turn>,
        tx: &mpsc::Sender<RelayEvent>,
    ) -> RelayOutcome {
        debug!(messages = messages.len(), "Opening upstream stream");
        let opened =
            tokio::time::timeout(self.idle_timeout, self.client.stream_turn(messages)).await;
        let deltas = match opened {
            Ok(Ok(deltas)) => deltas,
            Ok(Err(e)) => {
                error!(error = %e, "Upstream request failed");
                let _ = tx.send(RelayEvent::Error(e.to_string())).await;
                return RelayOutcome::Failed;
            }
            Err(_) => {
                warn!(
                    idle_timeout_secs = self.idle_timeout.as_secs(),
                    "Upstream request timed out"
                );
                let _ = tx
                    .send(RelayEvent::Error("Upstream request timed out".to_string()))
                    .await;
                return RelayOutcome::Failed;
            }
        };
        self.relay_deltas(turn.as_ref(), deltas, tx)
            .await
            .unwrap_or(RelayOutcome::Disconnected)
    }

    async fn relay_deltas(
        &self,
        turn: Option<&SessionTurn>,
        deltas: DeltaStream,
        tx: &mpsc::Sender<RelayEvent>,
    ) -> Result<RelayOutcome, SendError<RelayEvent>> {
        let mut batcher = AudioBatcher::new(self.strategy);
        let mut reply = AssistantReply::default();
        let mut committed = false;
        let interrupt = turn.map(|t| t.guard.interrupt());
        let mut deltas = std::pin::pin!(tokio_stream::StreamExt::timeout(
            deltas,
            self.idle_timeout
        ));

        loop {
            // Interrupts win over a chunk that is already waiting.
            let next = tokio::select! {
                biased;
                _ = wait_for_interrupt(interrupt) => {
                    if let Some(batch) = batcher.flush() {
                        tx.send(RelayEvent::Audio(batch)).await?;
                    }
                    tx.send(RelayEvent::Interrupted).await?;
                    if !committed {
                        self.commit(turn, &reply).await;
                    }
                    info!("Relay interrupted by client");
                    return Ok(RelayOutcome::Interrupted);
                }
                next = deltas.next() => next,
            };
            let Some(next) = next else { break };

            let failure = match next {
                Ok(Ok(chunk)) => {
                    let delta = classify(chunk);
                    self.forward(delta, &mut batcher, &mut reply, &mut committed, turn, tx)
                        .await?;
                    continue;
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Upstream stream failed");
                    e.to_string()
                }
                Err(_) => {
                    warn!(
                        idle_timeout_secs = self.idle_timeout.as_secs(),
                        "Upstream stream went idle"
                    );
                    "Upstream stream idle timeout".to_string()
                }
            };
            if let Some(batch) = batcher.flush() {
                tx.send(RelayEvent::Audio(batch)).await?;
            }
            tx.send(RelayEvent::Error(failure)).await?;
            return Ok(RelayOutcome::Failed);
        }

        if let Some(batch) = batcher.flush() {
            tx.send(RelayEvent::Audio(batch)).await?;
        }
        if !committed {
            self.commit(turn, &reply).await;
        }
        Ok(RelayOutcome::Completed)
    }

    async fn forward(
        &self,
        delta: ClassifiedDelta,
        batcher: &mut AudioBatcher,
        reply: &mut AssistantReply,
        committed: &mut bool,
        turn: Option<&SessionTurn>,
        tx: &mpsc::Sender<RelayEvent>,
    ) -> Result<(), SendError<RelayEvent>> {
        match delta.event {
            Some(DeltaEvent::Text(text)) => {
                reply.text.push_str(&text);
                tx.send(RelayEvent::Text(text)).await?;
            }
            Some(DeltaEvent::Audio(fragment)) => {
                reply.has_audio = true;
                if let Some(batch) = batcher.push(fragment) {
                    tx.send(RelayEvent::Audio(batch)).await?;
                }
            }
            Some(DeltaEvent::Transcript(transcript)) => {
                reply.transcript.push_str(&transcript);
                tx.send(RelayEvent::Transcript(transcript)).await?;
            }
            Some(DeltaEvent::Usage(usage)) => {
                tx.send(RelayEvent::Usage(usage)).await?;
            }
            None => trace!("Skipping chunk with no recognized payload"),
        }

        if delta.finished && !*committed {
            self.commit(turn, reply).await;
            *committed = true;
        }
        Ok(())
    }

    async fn commit(&self, turn: Option<&SessionTurn>, reply: &AssistantReply) {
        if let Some(turn) = turn {
            self.assembler
                .record_reply(turn.guard.session_id(), reply, turn.is_final)
                .await;
        }
    }
}

/// Resolves when the turn is interrupted. Never resolves for detached relays.
async fn wait_for_interrupt(interrupt: Option<&InterruptFlag>) {
    match interrupt {
        Some(flag) => flag.cancelled().await,
        None => std::future::pending().await,
    }
}
