//! No-op fact store — disables persistent memory entirely.

use async_trait::async_trait;
use factlayer_core::error::MemoryError;
use factlayer_core::fact::{Fact, FactFilter, PersistentMemoryStore};

/// A fact store that holds nothing.
pub struct NoopFactStore;

#[async_trait]
impl PersistentMemoryStore for NoopFactStore {
    fn name(&self) -> &str { "none" }

    async fn query(&self, _user_id: &str, _filter: &FactFilter, _limit: usize) -> Result<Vec<Fact>, MemoryError> {
        Ok(Vec::new())
    }

    async fn has_any(&self, _user_id: &str) -> Result<bool, MemoryError> {
        Ok(false)
    }
}
