//! Omnicall Core
//!
//! Session lifecycle and streaming-relay engine for real-time voice calls
//! against a multimodal completion service:
//!
//! - `session`: the registry of live calls and the per-call turn guard.
//! - `interrupt`: the per-session cancellation flag.
//! - `assembler`: canonical user and assistant turns from raw input.
//! - `relay`: one upstream stream per turn, demultiplexed into client events.
//! - `reaper`: background eviction of idle sessions.

pub mod assembler;
pub mod audio;
pub mod delta;
pub mod interrupt;
pub mod llm_client;
pub mod reaper;
pub mod relay;
pub mod session;
pub mod turn;

pub use assembler::{MessageAssembler, Submission};
pub use llm_client::{CompletionClient, OpenAICompatibleClient};
pub use reaper::{ExpiryReaper, ReaperConfig};
pub use relay::{AudioStrategy, RelayEvent, StreamRelay, SubmitError};
pub use session::{SessionError, SessionId, SessionStore};
