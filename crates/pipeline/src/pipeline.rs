//! The request pipeline.
//!
//! One request runs as a single sequential task: assemble context, decide the
//! generation tier, await generation under a timeout, then run the validator
//! chain over the generated text. A generation failure, or a panic while
//! assembling context, returns the configured fallback response; the caller
//! never sees a technical error.

use crate::routing::{RoutingDecision, RoutingSignals, decide, detect_high_stakes};
use chrono::Datelike;
use factlayer_config::{AppConfig, RoutingConfig};
use factlayer_context::{
    AssembledContext, AssemblyInput, BudgetCompliance, ContextAssembler, MemoryRetrievalGateway, RetrievalTelemetry,
    SelectionReason, SessionCache, TokenBudgetEnforcer, VaultSectionSelector,
};
use factlayer_core::{
    ChatMode, Error, GenerationBoundary, GenerationError, GenerationRequest, ModelTier, PersistentMemoryStore,
    panic_message,
};
use factlayer_validators::{ValidationContext, ValidatorChain, ValidatorReport};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

// ── Request / response ────────────────────────────────────────────────────

/// One chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub mode: ChatMode,
    /// Vault corpus available to this request.
    #[serde(default)]
    pub vault_text: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f32,
    #[serde(default)]
    pub requires_expertise: bool,
    #[serde(default)]
    pub complexity: f32,
    /// Overrides high-stakes detection on the query.
    #[serde(default)]
    pub high_stakes: Option<bool>,
}

fn default_confidence() -> f32 {
    1.0
}

impl ChatRequest {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            query: query.into(),
            mode: ChatMode::Standard,
            vault_text: None,
            confidence_score: default_confidence(),
            requires_expertise: false,
            complexity: 0.0,
            high_stakes: None,
        }
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_vault(mut self, vault_text: impl Into<String>) -> Self {
        self.vault_text = Some(vault_text.into());
        self
    }
}

/// Summary of the vault selection for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultReport {
    pub tokens: usize,
    pub sections_selected: usize,
    pub sections_total: usize,
    pub selection_reason: SelectionReason,
}

/// The final answer plus everything that shaped it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub text: String,
    /// True when the fallback response was returned.
    pub degraded: bool,
    pub tier: ModelTier,
    pub routing: RoutingDecision,
    pub budget_compliance: BudgetCompliance,
    pub retrieval: RetrievalTelemetry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultReport>,
    pub validation: Vec<ValidatorReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Pipeline ──────────────────────────────────────────────────────────────

pub struct FactPipeline {
    assembler: ContextAssembler,
    chain: ValidatorChain,
    generator: Arc<dyn GenerationBoundary>,
    routing: RoutingConfig,
    fallback_response: String,
    generation_timeout: Duration,
}

impl FactPipeline {
    /// Build every component from configuration.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn PersistentMemoryStore>,
        generator: Arc<dyn GenerationBoundary>,
        cache: Arc<SessionCache>,
    ) -> Self {
        let assembler = ContextAssembler::new(
            MemoryRetrievalGateway::new(store, config.retrieval.clone()),
            VaultSectionSelector::new(config.vault.clone()),
            TokenBudgetEnforcer::new(config.budget.clone()),
            cache,
        );
        Self {
            assembler,
            chain: ValidatorChain::from_config(&config.validators),
            generator,
            routing: config.routing.clone(),
            fallback_response: config.fallback_response.clone(),
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
        }
    }

    /// Replace the validator chain.
    pub fn with_chain(mut self, chain: ValidatorChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        self.assembler.cache()
    }

    pub fn chain(&self) -> &ValidatorChain {
        &self.chain
    }

    /// Answer one request. Always returns a response.
    pub async fn respond(&self, request: ChatRequest) -> PipelineResponse {
        let (context, assembly_error) = match self.assemble(&request).await {
            Ok(context) => (context, None),
            Err(e) => {
                error!(error = %e, "Context assembly failed, returning fallback response");
                (self.assembler.empty(request.mode, Some(e.to_string())), Some(e))
            }
        };

        let signals = RoutingSignals {
            confidence_score: request.confidence_score,
            token_count: context.bundle.total_tokens,
            has_vault_access: context.has_vault_content(),
            high_stakes: request.high_stakes.unwrap_or_else(|| detect_high_stakes(&request.query)),
            mode: request.mode,
            requires_expertise: request.requires_expertise,
            complexity: request.complexity,
        };
        let routing = decide(&signals, &self.routing);
        debug!(tier = ?routing.tier(), reasons = routing.reasons.len(), "Routing decided");

        let generated = match assembly_error {
            Some(e) => Err(e),
            None => self.generate(build_prompt(&context, &request.query), routing.tier()).await,
        };

        let vault = context.vault_selection.as_ref().map(|s| VaultReport {
            tokens: s.tokens,
            sections_selected: s.sections_selected,
            sections_total: s.sections_total,
            selection_reason: s.selection_reason.clone(),
        });

        let text = match generated {
            Ok(text) => text,
            Err(e) => {
                warn!(generator = self.generator.name(), error = %e, "No usable generation, returning fallback response");
                return PipelineResponse {
                    text: self.fallback_response.clone(),
                    degraded: true,
                    tier: routing.tier(),
                    routing,
                    budget_compliance: context.bundle.budget_compliance,
                    retrieval: context.retrieval.telemetry,
                    vault,
                    validation: Vec::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        let facts = context.retrieval.fact_list();
        let store = self.assembler.gateway().store();
        let ctx = ValidationContext {
            user_id: &request.user_id,
            query: &request.query,
            facts: &facts,
            store: &**store,
            current_year: chrono::Utc::now().year(),
        };
        let output = self.chain.run(&text, &ctx).await;
        info!(
            corrections = output.corrections(),
            tier = ?routing.tier(),
            total_tokens = context.bundle.total_tokens,
            "Response validated"
        );

        PipelineResponse {
            text: output.response,
            degraded: false,
            tier: routing.tier(),
            routing,
            budget_compliance: context.bundle.budget_compliance,
            retrieval: context.retrieval.telemetry,
            vault,
            validation: output.reports,
            error: None,
        }
    }

    /// Assemble context, turning a panic anywhere below into an error.
    async fn assemble(&self, request: &ChatRequest) -> factlayer_core::Result<AssembledContext> {
        let input = AssemblyInput {
            user_id: &request.user_id,
            session_id: request.session_id.as_deref(),
            query: &request.query,
            mode: request.mode,
            vault_text: request.vault_text.as_deref(),
        };
        AssertUnwindSafe(self.assembler.assemble(input))
            .catch_unwind()
            .await
            .map_err(|payload| Error::Internal(format!("context assembly panicked: {}", panic_message(payload.as_ref()))))
    }

    async fn generate(&self, prompt: String, tier: ModelTier) -> factlayer_core::Result<String> {
        let request = GenerationRequest { prompt, tier };
        let generation = tokio::time::timeout(self.generation_timeout, self.generator.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout {
                timeout_secs: self.generation_timeout.as_secs(),
            })??;
        if generation.text.trim().is_empty() {
            return Err(GenerationError::Empty.into());
        }
        Ok(generation.text)
    }
}

/// Context sections followed by the user's message.
pub fn build_prompt(context: &AssembledContext, query: &str) -> String {
    let sections = context.bundle.render();
    if sections.is_empty() {
        format!("[User]\n{query}")
    } else {
        format!("{sections}\n\n[User]\n{query}")
    }
}
