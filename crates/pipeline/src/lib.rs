//! # factlayer Pipeline
//!
//! Ties the pieces together for one request:
//! retrieval → vault selection and budgets → routing → generation →
//! validator chain → final text.
//!
//! ```text
//! ChatRequest ──► ContextAssembler ──► decide() ──► GenerationBoundary
//!                                                        │
//!                 PipelineResponse ◄── ValidatorChain ◄──┘
//! ```

pub mod pipeline;
pub mod routing;

pub use pipeline::{ChatRequest, FactPipeline, PipelineResponse, VaultReport, build_prompt};
pub use routing::{RoutingDecision, RoutingReason, RoutingSignals, decide, detect_high_stakes};
