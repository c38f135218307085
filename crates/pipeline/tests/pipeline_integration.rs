//! End-to-end pipeline behavior against an in-memory store and a scripted
//! generator.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use factlayer_config::{AppConfig, ValidatorConfig};
use factlayer_context::SessionCache;
use factlayer_core::{
    ChatMode, Fact, FactFilter, Generation, GenerationBoundary, GenerationError, GenerationRequest, MemoryError,
    ModelTier, PersistentMemoryStore, ValidatorError,
};
use factlayer_memory::InMemoryFactStore;
use factlayer_pipeline::{ChatRequest, FactPipeline, RoutingReason};
use factlayer_validators::{OrdinalValidator, ValidationContext, ValidationOutcome, Validator, ValidatorChain};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ── Test doubles ──────────────────────────────────────────────────────────

struct Scripted(String);

#[async_trait]
impl GenerationBoundary for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<Generation, GenerationError> {
        Ok(Generation {
            text: self.0.clone(),
            usage: None,
        })
    }
}

struct Slow;

#[async_trait]
impl GenerationBoundary for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<Generation, GenerationError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(Generation {
            text: "too late".into(),
            usage: None,
        })
    }
}

/// Fails queries whose predicate matches `fails`, and optionally everything.
struct FailingStore {
    inner: InMemoryFactStore,
    fails: fn(&FactFilter) -> bool,
}

#[async_trait]
impl PersistentMemoryStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn query(&self, user_id: &str, filter: &FactFilter, limit: usize) -> Result<Vec<Fact>, MemoryError> {
        if (self.fails)(filter) {
            return Err(MemoryError::QueryFailed("injected failure".into()));
        }
        self.inner.query(user_id, filter, limit).await
    }

    async fn has_any(&self, user_id: &str) -> Result<bool, MemoryError> {
        if (self.fails)(&FactFilter::Recent) {
            return Err(MemoryError::Unavailable("injected failure".into()));
        }
        self.inner.has_any(user_id).await
    }
}

/// Panics on every store call.
struct PanickingStore;

#[async_trait]
impl PersistentMemoryStore for PanickingStore {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn query(&self, _user_id: &str, _filter: &FactFilter, _limit: usize) -> Result<Vec<Fact>, MemoryError> {
        panic!("store driver crashed")
    }

    async fn has_any(&self, _user_id: &str) -> Result<bool, MemoryError> {
        panic!("store driver crashed")
    }
}

struct ExplodingValidator;

#[async_trait]
impl Validator for ExplodingValidator {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn gate(&self, _query: &str) -> bool {
        true
    }

    async fn apply(&self, _response: &str, _ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
        panic!("validator bug")
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────

fn pipeline_with(config: &AppConfig, store: Arc<dyn PersistentMemoryStore>, generator: impl GenerationBoundary + 'static) -> FactPipeline {
    let cache = Arc::new(SessionCache::new(&config.session_cache));
    FactPipeline::new(config, store, Arc::new(generator), cache)
}

fn pipeline(facts: Vec<Fact>, reply: &str) -> FactPipeline {
    pipeline_with(
        &AppConfig::default(),
        Arc::new(InMemoryFactStore::with_facts(facts)),
        Scripted(reply.into()),
    )
}

fn code(id: &str, ordinal: u32, value: &str) -> Fact {
    Fact::new(id, "u1", format!("Locker combination {value}"))
        .with_metadata("ordinal", ordinal)
        .with_metadata("ordinalSubject", "code")
        .with_metadata("ordinalValue", value)
}

fn job_facts(years: u32) -> Vec<Fact> {
    vec![
        Fact::new("w", "u1", format!("I worked at Acme for {years} years")),
        Fact::new("l", "u1", "I left Acme in 2020"),
    ]
}

fn alex_facts() -> Vec<Fact> {
    vec![
        Fact::new("a1", "u1", "My friend Alex loves hiking"),
        Fact::new("a2", "u1", "Alex, my colleague, runs the Monday standup"),
    ]
}

fn report<'a>(out: &'a factlayer_pipeline::PipelineResponse, name: &str) -> &'a factlayer_validators::ValidatorReport {
    out.validation
        .iter()
        .find(|r| r.validator == name)
        .unwrap_or_else(|| panic!("no report for {name}"))
}

// ── Correction properties ─────────────────────────────────────────────────

#[tokio::test]
async fn ordinal_reference_is_corrected() {
    let p = pipeline(vec![code("c1", 1, "AAA"), code("c2", 2, "BBB")], "Your second code is AAA.");
    let out = p.respond(ChatRequest::new("u1", "what is my second code?")).await;
    assert!(out.text.contains("BBB"));
    assert!(!out.text.contains("AAA"));
    assert!(report(&out, "ordinal").correction_applied);
}

#[tokio::test]
async fn temporal_start_year_is_appended() {
    let p = pipeline(job_facts(5), "You started at Acme some time ago.");
    let out = p.respond(ChatRequest::new("u1", "When did I start at Acme?")).await;
    assert!(out.text.contains("2015"));
    assert!(out.text.starts_with("You started at Acme some time ago."));
}

#[tokio::test]
async fn implausible_duration_suppresses_temporal_correction() {
    let p = pipeline(job_facts(200), "You started at Acme some time ago.");
    let out = p.respond(ChatRequest::new("u1", "When did I start at Acme?")).await;
    assert_eq!(out.text, "You started at Acme some time ago.");
    assert!(!report(&out, "temporal").correction_applied);
}

#[tokio::test]
async fn ambiguous_name_is_disclosed() {
    let p = pipeline(alex_facts(), "Alex enjoys the outdoors.");
    let out = p.respond(ChatRequest::new("u1", "What does Alex like?")).await;
    assert!(out.text.contains("Which Alex do you mean"));
    assert!(out.text.contains("friend"));
    assert!(out.text.contains("colleague"));
    assert!(out.text.ends_with("Alex enjoys the outdoors."));
}

#[tokio::test]
async fn every_validator_is_reported() {
    let p = pipeline(vec![], "Sure.");
    let out = p.respond(ChatRequest::new("u1", "tell me a joke")).await;
    let names: Vec<&str> = out.validation.iter().map(|r| r.validator.as_str()).collect();
    assert_eq!(
        names,
        vec!["ordinal", "temporal", "ambiguity", "vehicle_recall", "conflict", "unicode_names"]
    );
}

// ── Idempotence ───────────────────────────────────────────────────────────

#[tokio::test]
async fn second_chain_pass_changes_nothing() {
    let colour = |id: &str, value: &str, days: i64, current: bool| {
        let f = Fact::new(id, "u1", format!("Favorite color: {value}"))
            .with_created_at(Utc::now() - ChronoDuration::days(days))
            .with_metadata("attribute", "favorite_color")
            .with_metadata("attributeValue", value);
        if current { f } else { f.superseded() }
    };
    let scenarios: Vec<(Vec<Fact>, &str, &str)> = vec![
        (vec![code("c1", 1, "AAA"), code("c2", 2, "BBB")], "what is my second code?", "It is AAA."),
        (vec![code("c1", 1, "AAA"), code("c2", 2, "BBB")], "what is my second code?", "I don't know."),
        (job_facts(5), "When did I start at Acme?", "A while ago."),
        (alex_facts(), "What does Alex like?", "Alex likes hiking."),
        (alex_facts(), "Tell me about Alex", "I don't have enough information."),
        (vec![Fact::new("v", "u1", "I drive a 2018 Honda Civic")], "What car do I drive?", "I'm not sure."),
        (
            vec![colour("old", "blue", 60, false), colour("new", "green", 1, true)],
            "what's my favorite color?",
            "Your favorite color is blue.",
        ),
        (
            vec![Fact::new("z", "u1", "Contact: Jose").with_metadata("anchors", json!({"unicode": ["José"]}))],
            "List my contacts",
            "Your contacts: Jose and Sam.",
        ),
    ];

    let chain = ValidatorChain::standard(&ValidatorConfig::default());
    for (facts, query, response) in scenarios {
        let store = InMemoryFactStore::with_facts(facts.clone());
        let ctx = ValidationContext {
            user_id: "u1",
            query,
            facts: &facts,
            store: &store,
            current_year: 2025,
        };
        let first = chain.run(response, &ctx).await;
        assert!(first.corrections() > 0, "expected a correction for {query:?} / {response:?}");
        let second = chain.run(&first.response, &ctx).await;
        assert_eq!(second.corrections(), 0, "second pass changed {:?}", first.response);
        assert_eq!(second.response, first.response);
    }
}

// ── Fail-open ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_failing_lookup_does_not_affect_other_validators() {
    let mut facts = job_facts(5);
    facts.extend([code("c1", 1, "AAA"), code("c2", 2, "BBB")]);
    let store = FailingStore {
        inner: InMemoryFactStore::with_facts(facts),
        fails: |f| matches!(f.predicate(), FactFilter::HasMetadata(_)),
    };
    let p = pipeline_with(
        &AppConfig::default(),
        Arc::new(store),
        Scripted("You started a while back, and your code is AAA.".into()),
    );
    let out = p
        .respond(ChatRequest::new("u1", "What year did I start, and what is my second code?"))
        .await;

    assert!(!out.degraded);
    assert!(report(&out, "ordinal").error.is_some());
    assert!(report(&out, "temporal").correction_applied);
    assert!(out.text.contains("2015"));
    assert!(out.text.starts_with("You started a while back, and your code is AAA."));
}

#[tokio::test]
async fn unreachable_store_still_answers() {
    let store = FailingStore {
        inner: InMemoryFactStore::new(),
        fails: |_| true,
    };
    let p = pipeline_with(&AppConfig::default(), Arc::new(store), Scripted("Your second code is AAA.".into()));
    let out = p.respond(ChatRequest::new("u1", "what is my second code?")).await;
    assert!(!out.degraded);
    assert_eq!(out.text, "Your second code is AAA.");
    assert!(out.retrieval.error.is_some());
    assert!(report(&out, "ordinal").error.is_some());
}

#[tokio::test]
async fn panicking_assembly_returns_fallback() {
    let config = AppConfig::default();
    let p = pipeline_with(&config, Arc::new(PanickingStore), Scripted("Hello.".into()));
    let out = p.respond(ChatRequest::new("u1", "what is my second code?")).await;
    assert!(out.degraded);
    assert_eq!(out.text, config.fallback_response);
    assert!(out.validation.is_empty());
    assert!(out.error.as_deref().is_some_and(|e| e.contains("store driver crashed")));
    assert!(out.retrieval.error.is_some());
}

#[tokio::test]
async fn panicking_validator_leaves_response_and_later_stages_intact() {
    let facts = vec![code("c1", 1, "AAA"), code("c2", 2, "BBB")];
    let mut chain = ValidatorChain::new();
    chain.push(Box::new(ExplodingValidator));
    chain.push(Box::new(OrdinalValidator::new(&ValidatorConfig::default())));

    let p = pipeline(facts, "Your second code is AAA.").with_chain(chain);
    let out = p.respond(ChatRequest::new("u1", "what is my second code?")).await;
    assert!(!out.degraded);
    assert_eq!(out.text, "Your second code is BBB.");
    assert!(report(&out, "exploding").error.as_deref().is_some_and(|e| e.contains("validator bug")));
    assert!(report(&out, "ordinal").correction_applied);
}

#[tokio::test(start_paused = true)]
async fn generation_timeout_returns_fallback() {
    let config = AppConfig {
        generation_timeout_secs: 1,
        ..AppConfig::default()
    };
    let p = pipeline_with(&config, Arc::new(InMemoryFactStore::new()), Slow);
    let out = p.respond(ChatRequest::new("u1", "hello there")).await;
    assert!(out.degraded);
    assert_eq!(out.text, config.fallback_response);
    assert!(out.error.as_deref().is_some_and(|e| e.contains("timed out")));
}

// ── Budgets and routing ───────────────────────────────────────────────────

#[tokio::test]
async fn oversized_sources_stay_within_ceilings() {
    let facts: Vec<Fact> = (0..40)
        .map(|i| Fact::new(format!("f{i}"), "u1", format!("Gardening note {i}: {}", "compost ".repeat(60))))
        .collect();
    let vault = (0..30)
        .map(|i| format!("# Topic {i}\n{}", "Policy text about gardening and soil. ".repeat(80)))
        .collect::<Vec<_>>()
        .join("\n");
    let p = pipeline(facts, "Compost helps.");
    let out = p
        .respond(
            ChatRequest::new("u1", "what do my notes say about gardening?")
                .with_mode(ChatMode::Vault)
                .with_vault(vault),
        )
        .await;

    let compliance = &out.budget_compliance;
    assert!(compliance.compliant);
    assert!(compliance.total_tokens <= 15_000);
    for source in &compliance.sources {
        assert!(source.tokens <= source.limit, "{:?} over budget", source.source);
    }
    assert!(out.retrieval.returned <= 15);
    let vault = out.vault.as_ref().expect("vault report");
    assert!(vault.tokens <= 9_000);
    assert!(vault.sections_selected >= 1);
    assert_eq!(out.tier, ModelTier::High);
    assert!(out.routing.reasons.contains(&RoutingReason::VaultAccess));
}
