//! Budgeted vault section selection.

use super::scoring::{QueryProfile, matches_target, score_section};
use super::sections::split_sections;
use super::{SelectionReason, VaultSection, VaultSelection};
use crate::budget::truncate_at_boundary;
use crate::token::estimate_tokens;
use factlayer_config::VaultConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Tokens charged for the blank line joining two selected sections.
const SEPARATOR_TOKENS: usize = 1;

/// Internal selection failures. Never escapes [`VaultSectionSelector::select`].
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("vault produced no sections")]
    NoSections,

    #[error("selection produced {tokens} tokens, over the {limit} token ceiling")]
    BudgetOverrun { tokens: usize, limit: usize },
}

/// Chooses the highest value vault slice that fits the vault ceiling.
pub struct VaultSectionSelector {
    config: VaultConfig,
}

impl VaultSectionSelector {
    pub fn new(config: VaultConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Select vault content for `query`. Any internal failure degrades to a
    /// flat truncation of the raw vault.
    pub fn select(&self, vault_text: &str, query: &str) -> VaultSelection {
        match self.try_select(vault_text, query) {
            Ok(selection) => {
                info!(
                    sections = selection.sections_selected,
                    total = selection.sections_total,
                    tokens = selection.tokens,
                    reason = %selection.selection_reason,
                    "Vault selection complete"
                );
                selection
            }
            Err(e) => {
                warn!(error = %e, "Vault selection failed, falling back to flat truncation");
                let cut = truncate_at_boundary(vault_text, self.config.max_tokens, self.config.sentence_boundary_ratio);
                VaultSelection {
                    tokens: estimate_tokens(&cut.text),
                    sections_selected: usize::from(!cut.text.is_empty()),
                    sections_total: 0,
                    strategy: None,
                    top_score: None,
                    selection_reason: SelectionReason::FlatTruncation { error: e.to_string() },
                    content: cut.text,
                }
            }
        }
    }

    fn try_select(&self, vault_text: &str, query: &str) -> Result<VaultSelection, SelectionError> {
        let limit = self.config.max_tokens;
        if vault_text.trim().is_empty() {
            return Ok(VaultSelection {
                content: String::new(),
                tokens: 0,
                sections_selected: 0,
                sections_total: 0,
                strategy: None,
                top_score: None,
                selection_reason: SelectionReason::Empty,
            });
        }

        let profile = QueryProfile::new(query);
        let (sections, strategy) = split_sections(vault_text, &self.config);
        if sections.is_empty() {
            return Err(SelectionError::NoSections);
        }
        debug!(sections = sections.len(), ?strategy, "Vault split");

        let whole_tokens = estimate_tokens(vault_text);

        let selection = if profile.is_inventory {
            let cut = truncate_at_boundary(vault_text, limit, self.config.sentence_boundary_ratio);
            let selected = if cut.truncated() {
                sections.iter().filter(|s| cut.text.contains(s.content.as_str())).count().max(1)
            } else {
                sections.len()
            };
            VaultSelection {
                tokens: estimate_tokens(&cut.text),
                content: cut.text,
                sections_selected: selected,
                sections_total: sections.len(),
                strategy,
                top_score: None,
                selection_reason: SelectionReason::Inventory,
            }
        } else if let Some(selection) = self.select_named(&sections, &profile, strategy) {
            selection
        } else if whole_tokens <= limit {
            VaultSelection {
                content: vault_text.to_string(),
                tokens: whole_tokens,
                sections_selected: sections.len(),
                sections_total: sections.len(),
                strategy,
                top_score: None,
                selection_reason: SelectionReason::FitsWithinBudget,
            }
        } else {
            self.select_scored(&sections, &profile, strategy)
        };

        if selection.tokens > limit {
            return Err(SelectionError::BudgetOverrun {
                tokens: selection.tokens,
                limit,
            });
        }
        Ok(selection)
    }

    /// Sections whose folder or file markers name the queried target, in
    /// document order.
    fn select_named(
        &self,
        sections: &[VaultSection],
        profile: &QueryProfile,
        strategy: Option<super::SplitStrategy>,
    ) -> Option<VaultSelection> {
        let target = profile.named_target.as_deref()?;
        let matching: Vec<&VaultSection> = sections.iter().filter(|s| matches_target(s, target)).collect();
        if matching.is_empty() {
            debug!(target, "No vault section matches named folder/file");
            return None;
        }

        let mut picked: Vec<(usize, String)> = Vec::new();
        let mut remaining = self.config.max_tokens;
        for section in matching {
            let cost = section.tokens + if picked.is_empty() { 0 } else { SEPARATOR_TOKENS };
            if cost <= remaining {
                remaining -= cost;
                picked.push((section.index, section.content.clone()));
            } else if picked.is_empty() {
                let cut = truncate_at_boundary(&section.content, remaining, self.config.sentence_boundary_ratio);
                picked.push((section.index, cut.text));
                break;
            }
        }

        Some(self.assemble(
            picked,
            sections.len(),
            strategy,
            None,
            SelectionReason::FolderMatch {
                target: target.to_string(),
            },
        ))
    }

    fn select_scored(
        &self,
        sections: &[VaultSection],
        profile: &QueryProfile,
        strategy: Option<super::SplitStrategy>,
    ) -> VaultSelection {
        let mut scored: Vec<(i64, &VaultSection)> = sections
            .iter()
            .map(|s| (score_section(s, profile, &self.config.weights), s))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.index.cmp(&b.1.index)));
        let top_score = scored.first().map(|(score, _)| *score);

        let mut picked: Vec<(usize, String)> = Vec::new();
        let mut remaining = self.config.max_tokens;
        for (score, section) in &scored {
            if !picked.is_empty() && *score < self.config.min_section_score {
                break;
            }
            let separator = if picked.is_empty() { 0 } else { SEPARATOR_TOKENS };
            let cost = section.tokens + separator;
            if cost <= remaining {
                remaining -= cost;
                picked.push((section.index, section.content.clone()));
                continue;
            }
            if *score >= self.config.partial_fit_min_score
                && remaining > self.config.partial_fit_min_remaining_tokens
            {
                let cut = truncate_at_boundary(
                    &section.content,
                    remaining - separator,
                    self.config.sentence_boundary_ratio,
                );
                if !cut.text.is_empty() {
                    debug!(index = section.index, score, "Partial section fit");
                    picked.push((section.index, cut.text));
                }
                break;
            }
        }

        if picked.is_empty() {
            if let Some((_, top)) = scored.first() {
                let cut = truncate_at_boundary(&top.content, self.config.max_tokens, self.config.sentence_boundary_ratio);
                picked.push((top.index, cut.text));
            }
        }

        self.assemble(picked, sections.len(), strategy, top_score, SelectionReason::Scored)
    }

    fn assemble(
        &self,
        mut picked: Vec<(usize, String)>,
        total: usize,
        strategy: Option<super::SplitStrategy>,
        top_score: Option<i64>,
        reason: SelectionReason,
    ) -> VaultSelection {
        picked.sort_by_key(|(index, _)| *index);
        let content = picked
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        VaultSelection {
            tokens: estimate_tokens(&content),
            sections_selected: picked.len(),
            sections_total: total,
            strategy,
            top_score,
            selection_reason: reason,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(max_tokens: usize) -> VaultSectionSelector {
        VaultSectionSelector::new(VaultConfig {
            max_tokens,
            partial_fit_min_remaining_tokens: 20,
            ..VaultConfig::default()
        })
    }

    fn filler(word: &str, n: usize) -> String {
        vec![word; n].join(" ")
    }

    /// Ten separator-delimited sections of roughly 150 tokens each.
    fn vault() -> String {
        let topics = [
            "weather", "gardening", "painting", "history", "travel", "cooking", "music", "sports", "refund",
            "astronomy",
        ];
        topics
            .iter()
            .map(|t| format!("Notes about {t}.\n{}", filler("lorem", 100)))
            .collect::<Vec<_>>()
            .join("\n=====\n")
    }

    #[test]
    fn empty_vault_selects_nothing() {
        let s = selector(9_000).select("   ", "anything");
        assert_eq!(s.selection_reason, SelectionReason::Empty);
        assert_eq!(s.tokens, 0);
        assert!(s.content.is_empty());
    }

    #[test]
    fn small_vault_is_returned_whole() {
        let text = vault();
        let s = selector(9_000).select(&text, "refund");
        assert_eq!(s.selection_reason, SelectionReason::FitsWithinBudget);
        assert_eq!(s.content, text);
        assert_eq!(s.sections_selected, 10);
    }

    #[test]
    fn scored_selection_prefers_matching_section() {
        let s = selector(200).select(&vault(), "refund");
        assert_eq!(s.selection_reason, SelectionReason::Scored);
        assert!(s.content.starts_with("Notes about refund."));
        assert_eq!(s.sections_selected, 1);
        assert!(s.tokens <= 200);
        assert_eq!(s.top_score, Some(10));
    }

    #[test]
    fn low_scorers_stop_once_something_is_accepted() {
        let s = selector(1_000).select(&vault(), "refund");
        // Only the refund section scores above zero
        assert_eq!(s.sections_selected, 1);
    }

    #[test]
    fn nothing_scores_still_returns_top_section() {
        let s = selector(1_000).select(&vault(), "zebra");
        assert_eq!(s.sections_selected, 1);
        assert!(s.content.starts_with("Notes about weather."));
        assert!(s.tokens <= 1_000);
    }

    #[test]
    fn selected_sections_keep_document_order() {
        let s = selector(1_000).select(&vault(), "weather astronomy");
        assert_eq!(s.sections_selected, 2);
        let weather = s.content.find("weather").unwrap_or(usize::MAX);
        let astronomy = s.content.find("astronomy").unwrap_or(0);
        assert!(weather < astronomy);
    }

    #[test]
    fn partial_fit_for_high_scorers() {
        let mut text = format!("# Refund policy\nrefund refund refund refund refund. {}", filler("refund", 300));
        text.push_str("\n=====\n");
        text.push_str(&filler("other", 400));
        let s = selector(200).select(&text, "refund");
        assert_eq!(s.sections_selected, 1);
        assert!(s.tokens <= 200);
        assert!(s.content.starts_with("# Refund policy"));
    }

    #[test]
    fn inventory_returns_largest_slice() {
        let text = vault();
        let s = selector(400).select(&text, "show me everything");
        assert_eq!(s.selection_reason, SelectionReason::Inventory);
        assert!(s.tokens <= 400);
        assert!(s.content.starts_with("Notes about weather."));
        assert_eq!(s.sections_total, 10);
    }

    #[test]
    fn folder_queries_bypass_scoring() {
        let text = format!(
            "[FOLDER: contracts]\n{}\n=====\n[FOLDER: marketing]\n{}\n=====\n[FOLDER: contracts]\n{}",
            filler("alpha", 200),
            filler("refund", 200),
            filler("beta", 200)
        );
        let s = selector(700).select(&text, "what's in the folder named contracts?");
        assert_eq!(
            s.selection_reason,
            SelectionReason::FolderMatch {
                target: "contracts".into()
            }
        );
        assert_eq!(s.sections_selected, 2);
        assert!(!s.content.contains("refund"));
        assert!(s.tokens <= 700);
    }

    #[test]
    fn folder_match_applies_to_small_vaults() {
        let text = format!(
            "[FOLDER: contracts]\n{}\n=====\n[FOLDER: marketing]\n{}",
            filler("alpha", 40),
            filler("launch", 40)
        );
        let s = selector(9_000).select(&text, "what's in the folder named contracts?");
        assert_eq!(
            s.selection_reason,
            SelectionReason::FolderMatch {
                target: "contracts".into()
            }
        );
        assert_eq!(s.sections_selected, 1);
        assert_eq!(s.sections_total, 2);
        assert!(!s.content.contains("marketing"));
    }

    #[test]
    fn unmatched_folder_falls_back_to_scoring() {
        let s = selector(200).select(&vault(), "the folder named finance refund");
        assert_eq!(s.selection_reason, SelectionReason::Scored);
    }

    #[test]
    fn huge_unstructured_vault_respects_ceiling() {
        let text = filler("word", 20_000);
        let s = selector(9_000).select(&text, "word");
        assert!(s.tokens <= 9_000);
        assert!(s.sections_selected >= 1);
        assert!(!s.content.is_empty());
    }

    #[test]
    fn selection_never_exceeds_ceiling_for_any_query() {
        let text = vault();
        for query in ["", "refund", "list all files", "pricing history travel", "folder named x"] {
            let s = selector(300).select(&text, query);
            assert!(s.tokens <= 300, "query {query:?} produced {} tokens", s.tokens);
            assert!(s.sections_selected >= 1);
        }
    }
}
