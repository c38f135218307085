//! In-memory fact store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use factlayer_core::error::MemoryError;
use factlayer_core::fact::{Fact, FactFilter, PersistentMemoryStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory store that keeps facts in a Vec.
/// Useful for testing and sessions where persistence isn't needed.
#[derive(Clone, Default)]
pub struct InMemoryFactStore {
    facts: Arc<RwLock<Vec<Fact>>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-seeded with facts.
    pub fn with_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        Self {
            facts: Arc::new(RwLock::new(facts.into_iter().collect())),
        }
    }

    /// Insert a fact (ingestion path). Facts with an empty id get a UUID.
    pub async fn insert(&self, mut fact: Fact) -> String {
        if fact.id.is_empty() {
            fact.id = Uuid::new_v4().to_string();
        }
        let id = fact.id.clone();
        self.facts.write().await.push(fact);
        id
    }

    /// Soft-supersede a fact. Returns false when the id is unknown.
    pub async fn supersede(&self, id: &str) -> bool {
        let mut facts = self.facts.write().await;
        match facts.iter_mut().find(|f| f.id == id) {
            Some(fact) => {
                fact.is_current = false;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.facts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.facts.read().await.is_empty()
    }
}

#[async_trait]
impl PersistentMemoryStore for InMemoryFactStore {
    fn name(&self) -> &str { "in_memory" }

    async fn query(&self, user_id: &str, filter: &FactFilter, limit: usize) -> Result<Vec<Fact>, MemoryError> {
        let facts = self.facts.read().await;
        Ok(filter.select(facts.iter().filter(|f| f.user_id == user_id), limit))
    }

    async fn has_any(&self, user_id: &str) -> Result<bool, MemoryError> {
        let facts = self.facts.read().await;
        Ok(facts.iter().any(|f| f.user_id == user_id && f.is_current))
    }
}
