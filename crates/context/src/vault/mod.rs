//! Vault section selection.
//!
//! The vault is a large curated reference corpus. Per request it is split
//! into sections, each section is scored against the query, and the highest
//! value subset that fits the vault token ceiling is returned. Sections are
//! recomputed for every request and never cached.

pub mod scoring;
pub mod sections;
pub mod selector;

use serde::{Deserialize, Serialize};

pub use scoring::QueryProfile;
pub use sections::{SplitStrategy, split_sections};
pub use selector::{SelectionError, VaultSectionSelector};

/// A contiguous slice of the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSection {
    /// Position in document order.
    pub index: usize,
    /// Header or marker line that opens the section, if any.
    pub title: Option<String>,
    pub content: String,
    /// Whether the section opens with a markdown header.
    pub has_header: bool,
    pub tokens: usize,
}

/// Why the selector returned what it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionReason {
    /// The vault was empty.
    Empty,
    /// The whole vault fit under the ceiling.
    FitsWithinBudget,
    /// The query asked for everything stored.
    Inventory,
    /// The query named a folder or file and matching sections were returned.
    FolderMatch { target: String },
    /// Generic relevance scoring.
    Scored,
    /// Selection failed; the raw vault was truncated instead.
    FlatTruncation { error: String },
}

impl std::fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("vault empty"),
            Self::FitsWithinBudget => f.write_str("entire vault fits within budget"),
            Self::Inventory => f.write_str("inventory query: largest slice within budget"),
            Self::FolderMatch { target } => write!(f, "sections matching folder/file '{target}'"),
            Self::Scored => f.write_str("relevance-scored sections"),
            Self::FlatTruncation { error } => write!(f, "flat truncation after selection error: {error}"),
        }
    }
}

/// The selector's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSelection {
    pub content: String,
    pub tokens: usize,
    pub sections_selected: usize,
    pub sections_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SplitStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_score: Option<i64>,
    pub selection_reason: SelectionReason,
}
