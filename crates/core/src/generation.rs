//! Generation boundary — the abstraction over the language-model call.
//!
//! The pipeline never produces text itself. It hands an assembled prompt to a
//! `GenerationBoundary` and treats whatever comes back as untrusted input for
//! the validator chain. Retry policy, if any, belongs to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::GenerationError;

/// Which generation tier a request is routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// The cheaper default model.
    #[default]
    Standard,
    /// The more capable (and more expensive) model.
    High,
}

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Fully assembled prompt text (context sections + user query).
    pub prompt: String,

    /// Tier selected by the routing decision.
    #[serde(default)]
    pub tier: ModelTier,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The generated response text.
    pub text: String,

    /// Token usage statistics, when the provider reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The language-model boundary.
#[async_trait]
pub trait GenerationBoundary: Send + Sync {
    /// The implementation name (for logs).
    fn name(&self) -> &str;

    /// Generate a response for the given prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError>;
}
