//! The validator trait and the ordered chain that runs it.
//!
//! Ordering is data: the chain is a list of stages run one after another by a
//! single dispatcher, each stage reading the output of the one before it.
//! New validators are added by pushing onto the list.

use async_trait::async_trait;
use factlayer_config::ValidatorConfig;
use factlayer_core::{Fact, FactFilter, PersistentMemoryStore, ValidatorError, panic_message};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

use crate::{
    AmbiguityValidator, ConflictValidator, OrdinalValidator, TemporalValidator, UnicodeNameValidator,
    VehicleRecallValidator,
};

// ── Types ─────────────────────────────────────────────────────────────────

/// What one validator did to the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub correction_applied: bool,
    pub response: String,
    pub detail: Value,
}

impl ValidationOutcome {
    pub fn unchanged(response: &str, detail: Value) -> Self {
        Self {
            correction_applied: false,
            response: response.to_string(),
            detail,
        }
    }

    pub fn corrected(response: String, detail: Value) -> Self {
        Self {
            correction_applied: true,
            response,
            detail,
        }
    }
}

/// Read-only request state shared by every validator.
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    pub user_id: &'a str,
    pub query: &'a str,
    /// Facts already retrieved for this request.
    pub facts: &'a [Fact],
    pub store: &'a dyn PersistentMemoryStore,
    /// Upper bound for plausible years.
    pub current_year: i32,
}

impl ValidationContext<'_> {
    /// The single extra store query a validator may issue.
    pub async fn lookup(
        &self,
        validator: &'static str,
        filter: FactFilter,
        limit: usize,
    ) -> Result<Vec<Fact>, ValidatorError> {
        debug!(validator, ?filter, "Validator store lookup");
        self.store
            .query(self.user_id, &filter, limit)
            .await
            .map_err(|source| ValidatorError::Store { validator, source })
    }
}

/// A gated, fail-open response corrector.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Stable name used in reports and in `validators.enabled`.
    fn name(&self) -> &'static str;

    /// Cheap query check; when false the validator does no store work.
    fn gate(&self, query: &str) -> bool;

    /// Reconcile `response` with stored facts.
    async fn apply(&self, response: &str, ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError>;
}

/// One validator's participation in a chain run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorReport {
    pub validator: String,
    pub gated: bool,
    pub correction_applied: bool,
    pub detail: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The final text plus a report for every validator, applied or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutput {
    pub response: String,
    pub reports: Vec<ValidatorReport>,
}

impl ChainOutput {
    pub fn corrections(&self) -> usize {
        self.reports.iter().filter(|r| r.correction_applied).count()
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ValidatorChain {
    stages: Vec<Box<dyn Validator>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The validators named in `config.enabled`, in that order.
    pub fn from_config(config: &ValidatorConfig) -> Self {
        let mut chain = Self::new();
        for name in &config.enabled {
            match build(name, config) {
                Some(stage) => chain.push(stage),
                None => warn!(validator = %name, "Unknown validator in config, skipping"),
            }
        }
        chain
    }

    /// Every validator in the default order.
    pub fn standard(config: &ValidatorConfig) -> Self {
        let mut chain = Self::new();
        for name in factlayer_config::KNOWN_VALIDATORS {
            if let Some(stage) = build(name, config) {
                chain.push(stage);
            }
        }
        chain
    }

    pub fn push(&mut self, stage: Box<dyn Validator>) {
        self.stages.push(stage);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order. A failing or panicking stage leaves the
    /// response as it was and the chain moves on.
    pub async fn run(&self, response: &str, ctx: &ValidationContext<'_>) -> ChainOutput {
        let mut current = response.to_string();
        let mut reports = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let name = stage.name();
            let open = match std::panic::catch_unwind(AssertUnwindSafe(|| stage.gate(ctx.query))) {
                Ok(open) => open,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(validator = name, error = %message, "Validator gate panicked, skipping");
                    reports.push(ValidatorReport {
                        validator: name.to_string(),
                        gated: false,
                        correction_applied: false,
                        detail: Value::Null,
                        error: Some(format!("gate panicked: {message}")),
                    });
                    continue;
                }
            };
            if !open {
                debug!(validator = name, "Gate closed, skipping");
                reports.push(ValidatorReport {
                    validator: name.to_string(),
                    gated: false,
                    correction_applied: false,
                    detail: Value::Null,
                    error: None,
                });
                continue;
            }

            let result = match AssertUnwindSafe(stage.apply(&current, ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(ValidatorError::Internal(format!(
                    "{name} panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            };

            match result {
                Ok(outcome) => {
                    if outcome.correction_applied {
                        info!(validator = name, "Correction applied");
                        current = outcome.response;
                    } else {
                        debug!(validator = name, "No correction needed");
                    }
                    reports.push(ValidatorReport {
                        validator: name.to_string(),
                        gated: true,
                        correction_applied: outcome.correction_applied,
                        detail: outcome.detail,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(validator = name, error = %e, "Validator failed, continuing without correction");
                    reports.push(ValidatorReport {
                        validator: name.to_string(),
                        gated: true,
                        correction_applied: false,
                        detail: Value::Null,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        ChainOutput {
            response: current,
            reports,
        }
    }
}

fn build(name: &str, config: &ValidatorConfig) -> Option<Box<dyn Validator>> {
    let stage: Box<dyn Validator> = match name {
        "ordinal" => Box::new(OrdinalValidator::new(config)),
        "temporal" => Box::new(TemporalValidator::new(config)),
        "ambiguity" => Box::new(AmbiguityValidator::new(config)),
        "vehicle_recall" => Box::new(VehicleRecallValidator::new(config)),
        "conflict" => Box::new(ConflictValidator::new(config)),
        "unicode_names" => Box::new(UnicodeNameValidator::new(config)),
        _ => return None,
    };
    Some(stage)
}

/// Union of retrieved and looked-up facts, first occurrence wins.
pub(crate) fn merge_facts(retrieved: &[Fact], looked_up: Vec<Fact>) -> Vec<Fact> {
    let mut merged: Vec<Fact> = retrieved.to_vec();
    for fact in looked_up {
        if !merged.iter().any(|f| f.id == fact.id) {
            merged.push(fact);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use factlayer_core::MemoryError;
    use factlayer_memory::InMemoryFactStore;
    use serde_json::json;

    struct Shouting;

    #[async_trait]
    impl Validator for Shouting {
        fn name(&self) -> &'static str {
            "shouting"
        }

        fn gate(&self, query: &str) -> bool {
            query.contains("loud")
        }

        async fn apply(&self, response: &str, _ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
            if response.ends_with('!') {
                return Ok(ValidationOutcome::unchanged(response, json!({})));
            }
            Ok(ValidationOutcome::corrected(format!("{response}!"), json!({"added": "!"})))
        }
    }

    struct Broken;

    #[async_trait]
    impl Validator for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn gate(&self, _query: &str) -> bool {
            true
        }

        async fn apply(&self, _response: &str, _ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
            Err(ValidatorError::Store {
                validator: "broken",
                source: MemoryError::Unavailable("down".into()),
            })
        }
    }

    struct Panicking;

    #[async_trait]
    impl Validator for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn gate(&self, _query: &str) -> bool {
            true
        }

        async fn apply(&self, _response: &str, _ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
            let values: Vec<&str> = Vec::new();
            Ok(ValidationOutcome::corrected(values[3].to_string(), Value::Null))
        }
    }

    struct PanickingGate;

    #[async_trait]
    impl Validator for PanickingGate {
        fn name(&self) -> &'static str {
            "panicking_gate"
        }

        fn gate(&self, _query: &str) -> bool {
            panic!("bad pattern")
        }

        async fn apply(&self, response: &str, _ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
            Ok(ValidationOutcome::corrected(format!("{response}?"), Value::Null))
        }
    }

    fn ctx<'a>(store: &'a InMemoryFactStore, query: &'a str) -> ValidationContext<'a> {
        ValidationContext {
            user_id: "u1",
            query,
            facts: &[],
            store,
            current_year: 2025,
        }
    }

    #[tokio::test]
    async fn failing_stage_does_not_stop_the_chain() {
        let store = InMemoryFactStore::new();
        let mut chain = ValidatorChain::new();
        chain.push(Box::new(Broken));
        chain.push(Box::new(Shouting));

        let out = chain.run("hello", &ctx(&store, "say it loud")).await;
        assert_eq!(out.response, "hello!");
        assert_eq!(out.reports.len(), 2);
        assert!(out.reports[0].error.is_some());
        assert!(!out.reports[0].correction_applied);
        assert!(out.reports[1].correction_applied);
        assert_eq!(out.corrections(), 1);
    }

    #[tokio::test]
    async fn panicking_stage_is_reported_and_skipped() {
        let store = InMemoryFactStore::new();
        let mut chain = ValidatorChain::new();
        chain.push(Box::new(Panicking));
        chain.push(Box::new(PanickingGate));
        chain.push(Box::new(Shouting));

        let out = chain.run("hello", &ctx(&store, "say it loud")).await;
        assert_eq!(out.response, "hello!");
        assert_eq!(out.reports.len(), 3);
        assert!(out.reports[0].error.as_deref().is_some_and(|e| e.contains("panicked")));
        assert!(out.reports[0].gated);
        assert!(out.reports[1].error.as_deref().is_some_and(|e| e.contains("bad pattern")));
        assert!(!out.reports[1].gated);
        assert!(out.reports[2].correction_applied);
    }

    #[tokio::test]
    async fn closed_gates_are_reported() {
        let store = InMemoryFactStore::new();
        let mut chain = ValidatorChain::new();
        chain.push(Box::new(Shouting));
        let out = chain.run("hello", &ctx(&store, "quietly")).await;
        assert_eq!(out.response, "hello");
        assert!(!out.reports[0].gated);
    }

    #[test]
    fn standard_chain_order() {
        let chain = ValidatorChain::standard(&ValidatorConfig::default());
        assert_eq!(
            chain.names(),
            vec!["ordinal", "temporal", "ambiguity", "vehicle_recall", "conflict", "unicode_names"]
        );
    }

    #[test]
    fn config_controls_membership_and_order() {
        let config = ValidatorConfig {
            enabled: vec!["unicode_names".into(), "bogus".into(), "ordinal".into()],
            ..ValidatorConfig::default()
        };
        assert_eq!(ValidatorChain::from_config(&config).names(), vec!["unicode_names", "ordinal"]);
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let a = Fact::new("1", "u1", "retrieved");
        let merged = merge_facts(
            std::slice::from_ref(&a),
            vec![Fact::new("1", "u1", "looked up"), Fact::new("2", "u1", "new")],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "retrieved");
    }
}
