pub mod decode;
pub mod openai;

pub use openai::OpenAiChatClient;

use crate::registry::{ToolInvocationRequest, ToolRegistry};
use crate::session::TranscriptTurn;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("reasoning model request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("reasoning model transport failure: {0}")]
    Transport(String),
    #[error("reasoning model api error (status {status}): {detail}")]
    Api { status: u16, detail: String },
    #[error("reasoning model response decode failure: {0}")]
    Decode(String),
    #[error("api key environment variable `{env}` is not set")]
    MissingApiKey { env: String },
}

impl ModelError {
    /// Timeouts and transport failures are transient and eligible for one
    /// retry with backoff; everything else fails the step immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_))
    }
}

/// One reasoning turn: either more tool invocations to dispatch, or the
/// completion signal carrying the final analysis text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTurn {
    ToolCalls(Vec<ToolInvocationRequest>),
    Completion(String),
}

/// The external text-generation collaborator selecting next actions. The
/// orchestrator depends only on this contract, never on the wire format.
pub trait ReasoningModel {
    fn next_turn(
        &self,
        transcript: &[TranscriptTurn],
        registry: &ToolRegistry,
        reasoning_step: u32,
    ) -> Result<ModelTurn, ModelError>;
}
