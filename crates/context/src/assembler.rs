//! Context assembly.
//!
//! Merges retrieved memory, session documents, and the selected vault slice
//! into one token-accounted [`ContextBundle`]. Assembly is deterministic for
//! a given store state and input: sections are recomputed per request and
//! nothing here is cached across queries.

use crate::budget::{ContextBundle, TokenBudgetEnforcer};
use crate::retrieval::{MemoryRetrievalGateway, RetrievedFacts};
use crate::session_cache::SessionCache;
use crate::vault::{VaultSectionSelector, VaultSelection};
use factlayer_core::ChatMode;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

// ── Types ─────────────────────────────────────────────────────────────────

/// Everything the assembler needs for one request.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    pub user_id: &'a str,
    /// Session whose uploaded documents are included, if any.
    pub session_id: Option<&'a str>,
    pub query: &'a str,
    pub mode: ChatMode,
    /// Raw vault corpus available to this request.
    pub vault_text: Option<&'a str>,
}

/// The assembled context plus the intermediate results behind it.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub bundle: ContextBundle,
    pub retrieval: RetrievedFacts,
    pub vault_selection: Option<VaultSelection>,
}

impl AssembledContext {
    /// Whether any vault content reached the bundle.
    pub fn has_vault_content(&self) -> bool {
        self.bundle.vault_tokens > 0
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    gateway: MemoryRetrievalGateway,
    selector: VaultSectionSelector,
    enforcer: TokenBudgetEnforcer,
    cache: Arc<SessionCache>,
}

impl ContextAssembler {
    pub fn new(
        gateway: MemoryRetrievalGateway,
        selector: VaultSectionSelector,
        enforcer: TokenBudgetEnforcer,
        cache: Arc<SessionCache>,
    ) -> Self {
        Self {
            gateway,
            selector,
            enforcer,
            cache,
        }
    }

    pub fn gateway(&self) -> &MemoryRetrievalGateway {
        &self.gateway
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// A context with no memory, documents, or vault, used when assembly
    /// itself could not complete.
    pub fn empty(&self, mode: ChatMode, error: Option<String>) -> AssembledContext {
        AssembledContext {
            bundle: self.enforcer.enforce("", "", ""),
            retrieval: RetrievedFacts::empty(mode, error),
            vault_selection: None,
        }
    }

    /// Retrieve, select, and enforce budgets for one request.
    pub async fn assemble(&self, input: AssemblyInput<'_>) -> AssembledContext {
        let retrieval = self.gateway.retrieve(input.user_id, input.query, input.mode).await;

        let documents = match input.session_id {
            Some(session) => self.cache.document_text(session).await,
            None => String::new(),
        };

        let vault_selection = input
            .vault_text
            .filter(|v| !v.trim().is_empty())
            .map(|v| self.selector.select(v, input.query));
        let vault = vault_selection.as_ref().map_or("", |s| s.content.as_str());

        let bundle = self.enforcer.enforce(&retrieval.text, &documents, vault);
        debug!(
            facts = retrieval.facts.len(),
            total_tokens = bundle.total_tokens,
            vault = vault_selection.is_some(),
            "Context assembled"
        );

        AssembledContext {
            bundle,
            retrieval,
            vault_selection,
        }
    }
}
