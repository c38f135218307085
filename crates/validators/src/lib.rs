//! # factlayer Validators
//!
//! Generated text is untrusted. After generation, an ordered chain of
//! validators reconciles the response against the persistent store and
//! applies minimal corrections: replace a wrong value, append a missing one,
//! or prepend a disclosure.
//!
//! Every validator is gated by a cheap check on the query, consults the
//! already retrieved facts first, and issues at most one extra store query.
//! Validators never fail the request: an internal error is logged, reported,
//! and treated as "no correction".

pub mod ambiguity;
pub mod chain;
pub mod conflict;
pub mod ordinal;
pub mod refusal;
pub mod temporal;
pub mod unicode_names;
pub mod vehicle;

pub use ambiguity::AmbiguityValidator;
pub use chain::{ChainOutput, ValidationContext, ValidationOutcome, Validator, ValidatorChain, ValidatorReport};
pub use conflict::ConflictValidator;
pub use ordinal::OrdinalValidator;
pub use refusal::is_refusal;
pub use temporal::TemporalValidator;
pub use unicode_names::UnicodeNameValidator;
pub use vehicle::VehicleRecallValidator;
