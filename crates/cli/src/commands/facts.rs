//! `factlayer facts` — Seed and inspect the SQLite fact store.

use anyhow::{Context, bail};
use factlayer_core::{Fact, FactFilter, PersistentMemoryStore};
use factlayer_memory::SqliteFactStore;
use serde_json::Value;

pub async fn add(
    store: &SqliteFactStore,
    user: &str,
    content: &str,
    category: &str,
    metadata: Option<&str>,
) -> anyhow::Result<()> {
    let fact = build_fact(user, content, category, metadata)?;
    let id = store.insert(&fact).await?;
    println!("✅ Stored fact {id}");
    Ok(())
}

pub async fn list(store: &SqliteFactStore, user: &str, all: bool, limit: usize) -> anyhow::Result<()> {
    let filter = if all {
        FactFilter::Recent.including_superseded()
    } else {
        FactFilter::Recent
    };
    let facts = store.query(user, &filter, limit).await?;
    if facts.is_empty() {
        println!("   No facts stored for {user}.");
        return Ok(());
    }
    for fact in &facts {
        let marker = if fact.is_current { " " } else { "~" };
        println!(
            "{marker} {}  {}  {}",
            fact.id,
            fact.created_at.format("%Y-%m-%d %H:%M"),
            fact.content
        );
        if !fact.metadata.is_empty() {
            println!("      {}", Value::Object(fact.metadata.clone()));
        }
    }
    Ok(())
}

pub async fn supersede(store: &SqliteFactStore, id: &str) -> anyhow::Result<()> {
    if store.supersede(id).await? {
        println!("✅ Fact {id} superseded");
        Ok(())
    } else {
        bail!("no fact with id {id}")
    }
}

fn build_fact(user: &str, content: &str, category: &str, metadata: Option<&str>) -> anyhow::Result<Fact> {
    let content = content.trim();
    if content.is_empty() {
        bail!("fact content must not be empty");
    }
    let mut fact = Fact::new(uuid::Uuid::new_v4().to_string(), user, content).with_category(category);
    if let Some(raw) = metadata {
        let value: Value = serde_json::from_str(raw).context("metadata is not valid JSON")?;
        let Value::Object(map) = value else {
            bail!("metadata must be a JSON object");
        };
        fact.metadata = map;
    }
    Ok(fact)
}
