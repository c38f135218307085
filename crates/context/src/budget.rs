//! Token budget enforcement across the three context sources.
//!
//! Each source (memory, documents, vault) has its own ceiling. A source over
//! its ceiling is cut at the last sentence boundary inside the target length
//! when that keeps at least `sentence_boundary_ratio` of it, otherwise at the
//! last whitespace, so names, numbers, and words are never split while a safe
//! boundary exists.

use crate::token::{self, byte_offset_of_char, chars_for_tokens, estimate_tokens};
use factlayer_config::BudgetConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Where a truncation cut was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// The text fit; nothing was cut.
    Untouched,
    /// Cut after `. `, `.\n`, or before a blank line.
    Sentence,
    /// Cut at the last whitespace.
    Whitespace,
    /// No boundary existed; cut at the character limit.
    Hard,
}

/// The result of fitting one text to a token ceiling.
#[derive(Debug, Clone)]
pub struct Truncation {
    pub text: String,
    pub boundary: Boundary,
}

impl Truncation {
    pub fn truncated(&self) -> bool {
        self.boundary != Boundary::Untouched
    }
}

/// Fit `text` into `max_tokens`, cutting only at safe boundaries.
pub fn truncate_at_boundary(text: &str, max_tokens: usize, sentence_ratio: f32) -> Truncation {
    if estimate_tokens(text) <= max_tokens {
        return Truncation {
            text: text.to_string(),
            boundary: Boundary::Untouched,
        };
    }

    let target_chars = chars_for_tokens(max_tokens);
    if target_chars == 0 {
        return Truncation {
            text: String::new(),
            boundary: Boundary::Hard,
        };
    }

    let cut = byte_offset_of_char(text, target_chars);
    // One character past the limit lets a boundary sitting exactly on the
    // limit be seen; every kept prefix still ends at or before `cut`.
    let probe = &text[..byte_offset_of_char(text, target_chars + 1)];

    let min_keep = (target_chars as f32 * sentence_ratio).ceil() as usize;
    if let Some(end) = last_sentence_boundary(probe) {
        let kept = probe[..end].trim_end();
        if kept.chars().count() >= min_keep {
            return Truncation {
                text: kept.to_string(),
                boundary: Boundary::Sentence,
            };
        }
    }

    if let Some(ws) = probe.rfind(char::is_whitespace) {
        let kept = probe[..ws].trim_end();
        if !kept.is_empty() {
            return Truncation {
                text: kept.to_string(),
                boundary: Boundary::Whitespace,
            };
        }
    }

    Truncation {
        text: text[..cut].to_string(),
        boundary: Boundary::Hard,
    }
}

/// Byte length of the longest prefix ending on a sentence boundary.
fn last_sentence_boundary(window: &str) -> Option<usize> {
    let after_period = [". ", ".\n"]
        .iter()
        .filter_map(|p| window.rfind(p).map(|i| i + 1));
    let before_blank = window.rfind("\n\n");
    after_period.chain(before_blank).filter(|&end| end > 0).max()
}

/// One of the three budgeted context sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    Memory,
    Documents,
    Vault,
}

impl ContextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Documents => "documents",
            Self::Vault => "vault",
        }
    }
}

/// Budget outcome for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCompliance {
    pub source: ContextSource,
    pub original_tokens: usize,
    pub tokens: usize,
    pub limit: usize,
    pub boundary: Boundary,
    pub compliant: bool,
}

/// Per-source pass/fail plus the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetCompliance {
    pub sources: Vec<SourceCompliance>,
    pub total_tokens: usize,
    pub total_limit: usize,
    pub compliant: bool,
}

impl BudgetCompliance {
    pub fn source(&self, source: ContextSource) -> Option<&SourceCompliance> {
        self.sources.iter().find(|s| s.source == source)
    }
}

/// The enforced, token-accounted context handed to generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub memory_text: String,
    pub memory_tokens: usize,
    pub document_text: String,
    pub document_tokens: usize,
    pub vault_text: String,
    pub vault_tokens: usize,
    /// Exact sum of the three source counts.
    pub total_tokens: usize,
    pub budget_compliance: BudgetCompliance,
}

impl ContextBundle {
    /// Render the labelled context sections for a prompt.
    pub fn render(&self) -> String {
        [
            ("[Long-Term Memory]", &self.memory_text),
            ("[Uploaded Documents]", &self.document_text),
            ("[Knowledge Vault]", &self.vault_text),
        ]
        .iter()
        .filter(|(_, body)| !body.trim().is_empty())
        .map(|(header, body)| format!("{header}\n{}", body.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}

/// Fits memory, documents, and vault text to their ceilings.
#[derive(Debug, Clone)]
pub struct TokenBudgetEnforcer {
    config: BudgetConfig,
}

impl TokenBudgetEnforcer {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Enforce every ceiling and report compliance.
    pub fn enforce(&self, memory: &str, documents: &str, vault: &str) -> ContextBundle {
        let ratio = self.config.sentence_boundary_ratio;
        let (memory_text, memory_report) =
            Self::fit(ContextSource::Memory, memory, self.config.memory_tokens, ratio);
        let (document_text, document_report) =
            Self::fit(ContextSource::Documents, documents, self.config.document_tokens, ratio);
        let (vault_text, vault_report) =
            Self::fit(ContextSource::Vault, vault, self.config.vault_tokens, ratio);

        let memory_tokens = memory_report.tokens;
        let document_tokens = document_report.tokens;
        let vault_tokens = vault_report.tokens;
        let total_tokens = memory_tokens + document_tokens + vault_tokens;

        let sources = vec![memory_report, document_report, vault_report];
        let compliant =
            sources.iter().all(|s| s.compliant) && total_tokens <= self.config.total_tokens;

        info!(
            memory_tokens,
            document_tokens,
            vault_tokens,
            total_tokens,
            compliant,
            "Context budget enforced"
        );

        ContextBundle {
            memory_text,
            memory_tokens,
            document_text,
            document_tokens,
            vault_text,
            vault_tokens,
            total_tokens,
            budget_compliance: BudgetCompliance {
                sources,
                total_tokens,
                total_limit: self.config.total_tokens,
                compliant,
            },
        }
    }

    fn fit(source: ContextSource, text: &str, limit: usize, ratio: f32) -> (String, SourceCompliance) {
        let original_tokens = token::estimate_tokens(text);
        let truncation = truncate_at_boundary(text, limit, ratio);
        let tokens = token::estimate_tokens(&truncation.text);
        if truncation.truncated() {
            debug!(
                source = source.as_str(),
                original_tokens,
                tokens,
                limit,
                boundary = ?truncation.boundary,
                "Source truncated to budget"
            );
        }
        (
            truncation.text,
            SourceCompliance {
                source,
                original_tokens,
                tokens,
                limit,
                boundary: truncation.boundary,
                compliant: tokens <= limit,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer() -> TokenBudgetEnforcer {
        TokenBudgetEnforcer::new(BudgetConfig::default())
    }

    #[test]
    fn short_text_is_untouched() {
        let t = truncate_at_boundary("Short and sweet.", 100, 0.8);
        assert_eq!(t.text, "Short and sweet.");
        assert_eq!(t.boundary, Boundary::Untouched);
    }

    #[test]
    fn cuts_at_sentence_when_enough_is_kept() {
        // 40-char target (10 tokens); the period sits at char 35
        let text = "Alpha beta gamma delta epsilon zeta. Eta theta iota kappa lambda.";
        let t = truncate_at_boundary(text, 10, 0.8);
        assert_eq!(t.boundary, Boundary::Sentence);
        assert_eq!(t.text, "Alpha beta gamma delta epsilon zeta.");
    }

    #[test]
    fn falls_back_to_whitespace_when_sentence_too_early() {
        // Period at char 6 keeps far less than 80% of the 40-char target
        let text = "Hello. Aaaaaa bbbbbb cccccc dddddd eeeeee ffffff gggggg";
        let t = truncate_at_boundary(text, 10, 0.8);
        assert_eq!(t.boundary, Boundary::Whitespace);
        assert!(text.starts_with(&t.text));
        let next = &text[t.text.len()..];
        assert!(next.starts_with(' '), "cut must land on a word boundary");
    }

    #[test]
    fn boundary_exactly_at_limit_keeps_whole_word() {
        // 8-char target; the 9th char is a space
        let t = truncate_at_boundary("Müllerin Schmidt", 2, 0.8);
        assert_eq!(t.text, "Müllerin");
    }

    #[test]
    fn hard_cut_without_any_boundary() {
        let text = "x".repeat(100);
        let t = truncate_at_boundary(&text, 5, 0.8);
        assert_eq!(t.boundary, Boundary::Hard);
        assert_eq!(t.text.len(), 20);
    }

    #[test]
    fn blank_line_is_a_sentence_boundary() {
        let text = format!("{}\n\n{}", "word ".repeat(8).trim_end(), "tail ".repeat(20));
        let t = truncate_at_boundary(&text, 12, 0.8);
        assert_eq!(t.boundary, Boundary::Sentence);
        assert_eq!(t.text, "word ".repeat(8).trim_end());
    }

    #[test]
    fn numbers_are_not_split() {
        let text = "Account 1234567890 is active and 9876543210 is closed";
        let t = truncate_at_boundary(text, 9, 0.8);
        assert!(!t.text.ends_with("98765"));
        assert!(t.text.split_whitespace().all(|w| text.split_whitespace().any(|o| o == w)));
    }

    #[test]
    fn enforce_respects_every_ceiling() {
        let memory = "Memory fact. ".repeat(2_000);
        let documents = "Document line. ".repeat(2_000);
        let vault = "Vault paragraph text. ".repeat(3_000);
        let bundle = enforcer().enforce(&memory, &documents, &vault);

        assert!(bundle.memory_tokens <= 2_500);
        assert!(bundle.document_tokens <= 3_000);
        assert!(bundle.vault_tokens <= 9_000);
        assert_eq!(
            bundle.total_tokens,
            bundle.memory_tokens + bundle.document_tokens + bundle.vault_tokens
        );
        assert!(bundle.budget_compliance.compliant);
        let mem = bundle.budget_compliance.source(ContextSource::Memory).unwrap();
        assert_eq!(mem.boundary, Boundary::Sentence);
        assert!(mem.original_tokens > mem.limit);
    }

    #[test]
    fn token_counts_match_text() {
        let bundle = enforcer().enforce("abc", "", "defgh");
        assert_eq!(bundle.memory_tokens, 1);
        assert_eq!(bundle.document_tokens, 0);
        assert_eq!(bundle.vault_tokens, 2);
        assert_eq!(bundle.total_tokens, 3);
    }

    #[test]
    fn render_skips_empty_sections() {
        let bundle = enforcer().enforce("- likes tea", "", "Pricing policy");
        let rendered = bundle.render();
        assert!(rendered.contains("[Long-Term Memory]\n- likes tea"));
        assert!(!rendered.contains("[Uploaded Documents]"));
        assert!(rendered.contains("[Knowledge Vault]\nPricing policy"));
    }
}
