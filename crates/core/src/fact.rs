//! Facts and the persistent memory store trait.
//!
//! A fact is a single persisted memory record about a user. Facts are written
//! by an upstream ingestion process and are immutable once written, except
//! for the soft `is_current` flag that marks a fact as superseded. Nothing in
//! this workspace's request path ever writes a fact.
//!
//! `metadata` is an open JSON object. Validators read these optional keys:
//! - `ordinal` (int), `ordinalSubject` (string), `ordinalValue` (string)
//! - `attribute` (string), `attributeValue` (string)
//! - `anchors` (object of category → list of strings, e.g. `{"unicode": ["José"]}`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use crate::error::MemoryError;
use crate::text;

/// A single persisted memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    /// Unique ID for this fact
    pub id: String,

    /// Owner of the fact
    pub user_id: String,

    /// The fact text as the user stated it
    #[serde(alias = "userText")]
    pub content: String,

    /// Coarse category assigned at ingestion ("personal", "work", ...)
    #[serde(default)]
    pub category_tag: String,

    /// When this fact was written
    pub created_at: DateTime<Utc>,

    /// False once a newer fact supersedes this one
    #[serde(default = "default_current")]
    pub is_current: bool,

    /// Relevance assigned at ingestion
    #[serde(default)]
    pub relevance_score: f32,

    /// Structured annotations
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

fn default_current() -> bool {
    true
}

impl Fact {
    /// Create a current fact with an empty category and metadata.
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            content: content.into(),
            category_tag: String::new(),
            created_at: Utc::now(),
            is_current: true,
            relevance_score: 0.0,
            metadata: Map::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_tag = category.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_relevance(mut self, score: f32) -> Self {
        self.relevance_score = score;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Mark this fact as superseded.
    pub fn superseded(mut self) -> Self {
        self.is_current = false;
        self
    }

    /// `metadata.ordinal`, accepting either a number or a numeric string.
    pub fn ordinal(&self) -> Option<u32> {
        match self.metadata.get("ordinal")? {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn ordinal_subject(&self) -> Option<&str> {
        self.metadata_str("ordinalSubject")
    }

    pub fn ordinal_value(&self) -> Option<&str> {
        self.metadata_str("ordinalValue")
    }

    pub fn attribute(&self) -> Option<&str> {
        self.metadata_str("attribute")
    }

    pub fn attribute_value(&self) -> Option<&str> {
        self.metadata_str("attributeValue")
    }

    /// Strings stored under `metadata.anchors.<category>`.
    pub fn anchors(&self, category: &str) -> Vec<String> {
        self.metadata
            .get("anchors")
            .and_then(|a| a.get(category))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// The filter predicate of a store query.
///
/// Stores answer only current facts unless the filter is wrapped in
/// [`FactFilter::IncludingSuperseded`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FactFilter {
    /// Relevance-ranked lookup against query text.
    Relevance(String),
    /// Facts containing any of the given words (case-insensitive, word-bounded).
    AnyKeyword(Vec<String>),
    /// Facts with the given category tag.
    Category(String),
    /// Facts carrying a non-null metadata key.
    HasMetadata(String),
    /// Most recent facts first.
    Recent,
    /// The inner filter, without dropping superseded facts.
    IncludingSuperseded(Box<FactFilter>),
}

impl FactFilter {
    /// Wrap this filter so superseded facts are returned too.
    pub fn including_superseded(self) -> Self {
        match self {
            Self::IncludingSuperseded(_) => self,
            other => Self::IncludingSuperseded(Box::new(other)),
        }
    }

    pub fn includes_superseded(&self) -> bool {
        matches!(self, Self::IncludingSuperseded(_))
    }

    /// The predicate with any superseded wrapper removed.
    pub fn predicate(&self) -> &FactFilter {
        match self {
            Self::IncludingSuperseded(inner) => inner.predicate(),
            other => other,
        }
    }

    /// Whether a fact passes this filter.
    pub fn matches(&self, fact: &Fact) -> bool {
        if !fact.is_current && !self.includes_superseded() {
            return false;
        }
        match self.predicate() {
            Self::Relevance(text) => {
                let terms = text::keywords(text);
                terms.is_empty() || terms.iter().any(|t| text::contains_word_ignore_case(&fact.content, t))
            }
            Self::AnyKeyword(words) => words
                .iter()
                .any(|w| text::contains_word_ignore_case(&fact.content, w)),
            Self::Category(category) => fact.category_tag.eq_ignore_ascii_case(category),
            Self::HasMetadata(key) => fact.metadata.get(key).is_some_and(|v| !v.is_null()),
            Self::Recent | Self::IncludingSuperseded(_) => true,
        }
    }

    /// Filter, rank, and truncate a candidate set.
    ///
    /// Relevance lookups rank by distinct query-term hits plus the stored
    /// relevance score; every other filter ranks newest first.
    pub fn select<'a>(&self, candidates: impl IntoIterator<Item = &'a Fact>, limit: usize) -> Vec<Fact> {
        let mut selected: Vec<Fact> = candidates.into_iter().filter(|f| self.matches(f)).cloned().collect();
        match self.predicate() {
            Self::Relevance(text) => {
                let terms = text::keywords(text);
                let rank = |f: &Fact| {
                    let hits = terms
                        .iter()
                        .filter(|t| text::contains_word_ignore_case(&f.content, t))
                        .count();
                    hits as f32 + f.relevance_score
                };
                selected.sort_by(|a, b| {
                    rank(b)
                        .partial_cmp(&rank(a))
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| b.created_at.cmp(&a.created_at))
                });
            }
            _ => selected.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        selected.truncate(limit);
        selected
    }
}

/// The persistent memory store, as seen by the pipeline.
///
/// Implementations: SQLite, in-memory (for testing), none (no-op).
#[async_trait]
pub trait PersistentMemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory", "none").
    fn name(&self) -> &str;

    /// Return up to `limit` of the user's facts passing `filter`.
    async fn query(&self, user_id: &str, filter: &FactFilter, limit: usize) -> Result<Vec<Fact>, MemoryError>;

    /// Whether the user has any current facts at all.
    async fn has_any(&self, user_id: &str) -> Result<bool, MemoryError>;
}
