//! Per-session uploaded document cache.
//!
//! Documents uploaded during a chat session are held here, keyed by session
//! id, and rendered as the documents context source. The cache is an explicit
//! component owned by the pipeline. Sessions expire after `ttl_secs` without
//! access, and once `capacity` sessions are held the least recently used one
//! is evicted.

use factlayer_config::SessionCacheConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// One uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub name: String,
    pub content: String,
}

impl SessionDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

struct SessionEntry {
    documents: Vec<SessionDocument>,
    last_access: Instant,
}

pub struct SessionCache {
    entries: RwLock<HashMap<String, SessionEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(config: &SessionCacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: config.capacity.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// Attach a document to a session, creating the session if needed.
    pub async fn add_document(&self, session_id: &str, document: SessionDocument) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.last_access) < self.ttl);

        if !entries.contains_key(session_id) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                debug!(session = %id, "Evicting least recently used session");
                entries.remove(&id);
            }
        }

        let entry = entries.entry(session_id.to_string()).or_insert_with(|| SessionEntry {
            documents: Vec::new(),
            last_access: now,
        });
        entry.last_access = now;
        entry.documents.push(document);
    }

    /// Documents for a session, refreshing its access time. Expired
    /// sessions are dropped and return nothing.
    pub async fn documents(&self, session_id: &str) -> Vec<SessionDocument> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expired = match entries.get_mut(session_id) {
            None => return Vec::new(),
            Some(entry) if now.duration_since(entry.last_access) >= self.ttl => true,
            Some(entry) => {
                entry.last_access = now;
                return entry.documents.clone();
            }
        };
        if expired {
            debug!(session = session_id, "Session documents expired");
            entries.remove(session_id);
        }
        Vec::new()
    }

    /// Documents rendered as one text block, each under its name.
    pub async fn document_text(&self, session_id: &str) -> String {
        self.documents(session_id)
            .await
            .iter()
            .map(|d| format!("[{}]\n{}", d.name, d.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub async fn clear(&self, session_id: &str) -> bool {
        self.entries.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
