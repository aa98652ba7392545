//! Narrator abstraction.
//!
//! The narrator is the external text-generation capability that merges
//! participant actions into narrative and writes prompts and summaries.
//! It is single-shot, possibly slow and possibly failing; callers must not
//! persist anything derived from a failed call.

use async_trait::async_trait;
use thiserror::Error;

/// A structured narrator request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarratorPrompt {
    /// Standing instructions (scenario rules, tone, output constraints).
    pub system: String,
    /// The request for this particular call.
    pub user: String,
}

/// Failure modes of a narrator call. All of them are recoverable: the
/// engine defers the round and retries on the next trigger.
#[derive(Debug, Error)]
pub enum NarratorError {
    /// The call exceeded its time budget.
    #[error("narrator timed out after {0}ms")]
    Timeout(u64),

    /// The provider rejected the request or could not be reached.
    #[error("narrator provider error: {0}")]
    Provider(String),

    /// The provider answered with no usable text.
    #[error("narrator returned an empty response")]
    EmptyResponse,
}

/// Text generation capability used by the round resolver.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Generates text for the given prompt.
    async fn generate(&self, prompt: &NarratorPrompt) -> Result<String, NarratorError>;
}
