//! `factlayer validate` — Run the validator chain over a response.

use chrono::Datelike;
use factlayer_config::AppConfig;
use factlayer_context::MemoryRetrievalGateway;
use factlayer_core::{ChatMode, PersistentMemoryStore};
use factlayer_validators::{ChainOutput, ValidationContext, ValidatorChain};
use std::sync::Arc;
use tracing::debug;

pub async fn run(
    config: &AppConfig,
    db: Option<&str>,
    user: &str,
    query: &str,
    response: &str,
    mode: ChatMode,
) -> anyhow::Result<()> {
    let store = super::open_store(config, db).await?;
    let output = check(config, store, user, query, response, mode).await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Retrieve facts the way a chat request would, then run the chain.
pub(crate) async fn check(
    config: &AppConfig,
    store: Arc<dyn PersistentMemoryStore>,
    user: &str,
    query: &str,
    response: &str,
    mode: ChatMode,
) -> ChainOutput {
    let gateway = MemoryRetrievalGateway::new(store.clone(), config.retrieval.clone());
    let retrieved = gateway.retrieve(user, query, mode).await;
    let facts = retrieved.fact_list();
    debug!(facts = facts.len(), path = ?retrieved.telemetry.path, "Retrieved facts for validation");

    let chain = ValidatorChain::from_config(&config.validators);
    let ctx = ValidationContext {
        user_id: user,
        query,
        facts: &facts,
        store: &*store,
        current_year: chrono::Utc::now().year(),
    };
    chain.run(response, &ctx).await
}
