//! # factlayer Core
//!
//! Domain types, traits, and error definitions for the factlayer
//! fact-consistency pipeline. This crate has **zero framework dependencies**:
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators of the pipeline are defined as traits here:
//! - [`PersistentMemoryStore`] — the read-only fact store queried by the
//!   retrieval gateway and by validators
//! - [`GenerationBoundary`] — the language-model call, treated as untrusted
//!
//! Implementations live in their respective crates, which keeps every
//! component testable against in-memory stubs.

pub mod error;
pub mod fact;
pub mod generation;
pub mod mode;
pub mod text;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GenerationError, MemoryError, Result, ValidatorError, panic_message};
pub use fact::{Fact, FactFilter, PersistentMemoryStore};
pub use generation::{Generation, GenerationBoundary, GenerationRequest, ModelTier, Usage};
pub use mode::ChatMode;
