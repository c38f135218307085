//! # factlayer Context
//!
//! Everything that happens before generation: memory retrieval, vault
//! section selection, session documents, and per-source token budgets.
//!
//! ## Modules
//!
//! - [`token`] — character-based token estimation
//! - [`budget`] — boundary-safe truncation and the [`TokenBudgetEnforcer`]
//! - [`vault`] — splitting, scoring, and selecting vault sections
//! - [`retrieval`] — the [`MemoryRetrievalGateway`] with its keyword fallback
//! - [`session_cache`] — uploaded documents keyed by session
//! - [`assembler`] — the [`ContextAssembler`] tying the above together

pub mod assembler;
pub mod budget;
pub mod retrieval;
pub mod session_cache;
pub mod token;
pub mod vault;

pub use assembler::{AssembledContext, AssemblyInput, ContextAssembler};
pub use budget::{
    Boundary, BudgetCompliance, ContextBundle, ContextSource, SourceCompliance, TokenBudgetEnforcer, Truncation,
    truncate_at_boundary,
};
pub use retrieval::{
    MemoryRetrievalGateway, RetrievalPath, RetrievalTelemetry, RetrievedFact, RetrievedFacts, is_safety_critical,
};
pub use session_cache::{SessionCache, SessionDocument};
pub use token::estimate_tokens;
pub use vault::{SelectionReason, SplitStrategy, VaultSection, VaultSectionSelector, VaultSelection};
