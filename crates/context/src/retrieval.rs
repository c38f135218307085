//! Long-term memory retrieval.
//!
//! The gateway asks the store for relevance-ranked facts and, if that path
//! fails for any reason, retries once with a plain keyword lookup against the
//! same store. Either way the result is capped at `max_facts`, safety-critical
//! facts are moved to the front and flagged, and the rendered text is fitted
//! to the memory token budget. Store failures never propagate.

use crate::token::estimate_tokens;
use factlayer_config::RetrievalConfig;
use factlayer_core::{ChatMode, Fact, FactFilter, MemoryError, PersistentMemoryStore, text};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Prefix placed in front of safety-critical facts when rendered.
pub const SAFETY_PREFIX: &str = "[SAFETY-CRITICAL] ";

static SAFETY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:allerg\w*|anaphyla\w*|medications?|medicines?|prescri\w*|chronic|diabet\w*|asthma\w*|epilep\w*|seizures?|insulin|inhaler|epipen|blood thinners?|pacemaker)\b",
    )
    .expect("SAFETY_RE regex should compile")
});

static TRIVIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:hi|hello|hey|yo|thanks|thank you|thx|ok|okay|cool|great|bye|goodbye|good (?:morning|afternoon|evening|night))(?:\s+there)?[\s!.?]*$",
    )
    .expect("TRIVIAL_RE regex should compile")
});

/// Whether fact text carries safety-relevant language.
pub fn is_safety_critical(content: &str) -> bool {
    SAFETY_RE.is_match(content)
}

/// Which retrieval path produced the facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPath {
    Primary,
    Fallback,
    /// Nothing was queried: no facts stored, a trivial query, or both paths failed.
    Skipped,
}

/// Observability record for one retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalTelemetry {
    pub path: RetrievalPath,
    pub mode: ChatMode,
    /// Facts returned by the store before capping.
    pub candidates: usize,
    pub returned: usize,
    /// Whether the hard fact cap dropped anything.
    pub capped: bool,
    pub safety_critical: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedFact {
    pub fact: Fact,
    pub safety_critical: bool,
}

/// Bounded, ordered facts plus their rendered memory text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedFacts {
    pub facts: Vec<RetrievedFact>,
    pub text: String,
    pub tokens: usize,
    pub telemetry: RetrievalTelemetry,
}

impl RetrievedFacts {
    pub(crate) fn empty(mode: ChatMode, error: Option<String>) -> Self {
        Self {
            facts: Vec::new(),
            text: String::new(),
            tokens: 0,
            telemetry: RetrievalTelemetry {
                path: RetrievalPath::Skipped,
                mode,
                candidates: 0,
                returned: 0,
                capped: false,
                safety_critical: 0,
                error,
            },
        }
    }

    /// The plain facts, in retrieval order.
    pub fn fact_list(&self) -> Vec<Fact> {
        self.facts.iter().map(|f| f.fact.clone()).collect()
    }
}

/// Queries the persistent store for facts relevant to a request.
pub struct MemoryRetrievalGateway {
    store: Arc<dyn PersistentMemoryStore>,
    config: RetrievalConfig,
}

impl MemoryRetrievalGateway {
    pub fn new(store: Arc<dyn PersistentMemoryStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn PersistentMemoryStore> {
        &self.store
    }

    /// Retrieve facts for `query`. Never fails; store errors degrade to the
    /// fallback path and then to an empty result.
    pub async fn retrieve(&self, user_id: &str, query: &str, mode: ChatMode) -> RetrievedFacts {
        match self.store.has_any(user_id).await {
            Ok(false) => {
                debug!(user_id, "No stored facts, skipping retrieval");
                return RetrievedFacts::empty(mode, None);
            }
            Ok(true) => {}
            // An unreachable store may still answer the fallback query
            Err(e) => debug!(error = %e, "Fact existence check failed"),
        }

        if self.config.skip_trivial_queries && mode == ChatMode::Standard && TRIVIAL_RE.is_match(query) {
            debug!(query, "Trivial query, skipping retrieval");
            return RetrievedFacts::empty(mode, None);
        }

        let (path, result) = match self.primary(user_id, query).await {
            Ok(facts) => (RetrievalPath::Primary, Ok(facts)),
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Primary retrieval failed, using keyword fallback");
                (RetrievalPath::Fallback, self.fallback(user_id, query).await)
            }
        };

        match result {
            Ok(facts) => self.normalize(facts, path, mode),
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Fallback retrieval failed, continuing without memory");
                RetrievedFacts::empty(mode, Some(e.to_string()))
            }
        }
    }

    async fn primary(&self, user_id: &str, query: &str) -> Result<Vec<Fact>, MemoryError> {
        let filter = FactFilter::Relevance(query.to_string());
        self.store.query(user_id, &filter, self.config.primary_limit).await
    }

    async fn fallback(&self, user_id: &str, query: &str) -> Result<Vec<Fact>, MemoryError> {
        let keywords = text::keywords(query);
        let filter = if keywords.is_empty() {
            FactFilter::Recent
        } else {
            FactFilter::AnyKeyword(keywords)
        };
        self.store.query(user_id, &filter, self.config.fallback_limit).await
    }

    /// Flag, reorder, cap, and render.
    fn normalize(&self, facts: Vec<Fact>, path: RetrievalPath, mode: ChatMode) -> RetrievedFacts {
        let candidates = facts.len();
        let mut flagged: Vec<RetrievedFact> = facts
            .into_iter()
            .map(|fact| RetrievedFact {
                safety_critical: is_safety_critical(&fact.content),
                fact,
            })
            .collect();
        // Stable: ranking is kept within each group
        flagged.sort_by_key(|f| !f.safety_critical);
        let capped = flagged.len() > self.config.max_facts;
        flagged.truncate(self.config.max_facts);

        let mut lines: Vec<String> = Vec::with_capacity(flagged.len());
        let mut kept = 0;
        let mut used = 0;
        for fact in &flagged {
            let line = render_line(fact);
            let cost = estimate_tokens(&line) + usize::from(kept > 0);
            if used + cost > self.config.token_budget {
                break;
            }
            used += cost;
            lines.push(line);
            kept += 1;
        }
        flagged.truncate(kept);

        let text = lines.join("\n");
        let safety_critical = flagged.iter().filter(|f| f.safety_critical).count();
        info!(
            ?path,
            candidates,
            returned = flagged.len(),
            safety_critical,
            "Memory retrieval complete"
        );

        RetrievedFacts {
            tokens: estimate_tokens(&text),
            text,
            telemetry: RetrievalTelemetry {
                path,
                mode,
                candidates,
                returned: flagged.len(),
                capped,
                safety_critical,
                error: None,
            },
            facts: flagged,
        }
    }
}

fn render_line(fact: &RetrievedFact) -> String {
    if fact.safety_critical {
        format!("- {SAFETY_PREFIX}{}", fact.fact.content)
    } else {
        format!("- {}", fact.fact.content)
    }
}
