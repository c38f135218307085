//! Model routing.
//!
//! A pure decision over cost, confidence, and stakes signals. Reasons are
//! collected in priority order so the first reason is the one that decided.

use factlayer_config::RoutingConfig;
use factlayer_core::{ChatMode, ModelTier};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static HIGH_STAKES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:diagnos\w*|symptoms?|dosage|dose|overdose|medication\w*|prescri\w*|surgery|chest\s+pain|suicid\w*|self[-\s]harm|emergency|lawsuit|sue|suing|legal\s+advice|contract\s+dispute|custody|divorce|immigration|visa|criminal|arrest\w*|tax(?:es)?|irs|bankrupt\w*|mortgage|invest\w*|retirement\s+account|401k|loan|debt)\b",
    )
    .expect("HIGH_STAKES_RE regex should compile")
});

/// Whether the query touches a medical, legal, or financial decision.
pub fn detect_high_stakes(query: &str) -> bool {
    HIGH_STAKES_RE.is_match(query)
}

/// Inputs to the routing decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutingSignals {
    /// 0.0 to 1.0; how sure the caller is the standard tier suffices.
    pub confidence_score: f32,
    /// Total assembled context tokens.
    pub token_count: usize,
    pub has_vault_access: bool,
    pub high_stakes: bool,
    pub mode: ChatMode,
    pub requires_expertise: bool,
    /// 0.0 to 1.0.
    pub complexity: f32,
}

impl Default for RoutingSignals {
    fn default() -> Self {
        Self {
            confidence_score: 1.0,
            token_count: 0,
            has_vault_access: false,
            high_stakes: false,
            mode: ChatMode::Standard,
            requires_expertise: false,
            complexity: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RoutingReason {
    HighStakes,
    VaultAccess,
    LargeContext { tokens: usize, threshold: usize },
    LowConfidence { score: f32, threshold: f32 },
    RequiresExpertise,
    ComplexBusinessValidation { complexity: f32, threshold: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub use_high_tier: bool,
    pub reasons: Vec<RoutingReason>,
}

impl RoutingDecision {
    pub fn tier(&self) -> ModelTier {
        if self.use_high_tier { ModelTier::High } else { ModelTier::Standard }
    }
}

/// Choose the generation tier. Any reason forces the high tier.
pub fn decide(signals: &RoutingSignals, config: &RoutingConfig) -> RoutingDecision {
    let mut reasons = Vec::new();

    if signals.high_stakes {
        reasons.push(RoutingReason::HighStakes);
    }
    if signals.has_vault_access && signals.mode == ChatMode::Vault {
        reasons.push(RoutingReason::VaultAccess);
    }
    if signals.token_count > config.token_threshold {
        reasons.push(RoutingReason::LargeContext {
            tokens: signals.token_count,
            threshold: config.token_threshold,
        });
    }
    if signals.confidence_score < config.low_confidence_threshold {
        reasons.push(RoutingReason::LowConfidence {
            score: signals.confidence_score,
            threshold: config.low_confidence_threshold,
        });
    }
    if signals.requires_expertise {
        reasons.push(RoutingReason::RequiresExpertise);
    }
    if signals.mode == ChatMode::BusinessValidation && signals.complexity > config.complexity_threshold {
        reasons.push(RoutingReason::ComplexBusinessValidation {
            complexity: signals.complexity,
            threshold: config.complexity_threshold,
        });
    }

    RoutingDecision {
        use_high_tier: !reasons.is_empty(),
        reasons,
    }
}
