//! Query analysis and section scoring.

use super::VaultSection;
use super::sections::DOC_MARKER_RE;
use factlayer_config::ScoringWeights;
use factlayer_core::text;
use regex::Regex;
use std::sync::LazyLock;

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:founder|ceo|policy|policies|directive|must|must not|never|always|required|mandatory|guideline|principle|mission|vision|core values?)\b",
    )
    .expect("DIRECTIVE_RE regex should compile")
});

static BUSINESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:pricing|price|prices|cost|costs|revenue|margin|subscription|tier|plan|invoice|discount|budget|customer|client|sales|quote|fee|fees)\b|\$\s?\d)",
    )
    .expect("BUSINESS_RE regex should compile")
});

static LEGAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:legal|law|laws|contract|contracts|agreement|clause|liability|indemnif\w*|warranty|terms|compliance|regulation\w*|nda|confidential\w*|jurisdiction|licen[cs]e\w*|copyright|trademark|gdpr|lawsuit|attorney)\b",
    )
    .expect("LEGAL_RE regex should compile")
});

static INVENTORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:everything|list (?:all|every)|show (?:me )?all|all (?:of )?(?:the |my )?(?:documents|files|folders|content)|what(?:'s| is) in (?:the |my )?vault|inventory|what do you have)\b",
    )
    .expect("INVENTORY_RE regex should compile")
});

static NAMED_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:folder|directory|file|document)\s+(?:(?:named|called|titled)\s+["'“]?([^"'”?\s]+)|["'“]([^"'”]+)["'”])"#,
    )
    .expect("NAMED_TARGET_RE regex should compile")
});

static TRAILING_FOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([\w.\-]+)\s+(?:folder|directory)\b").expect("TRAILING_FOLDER_RE regex should compile")
});

const STEM_SUFFIXES: &[&str] = &["ing", "ed", "es", "s"];

/// Everything scoring needs to know about the query, computed once.
#[derive(Debug, Clone)]
pub struct QueryProfile {
    /// Lowercased, trimmed query.
    pub phrase: String,
    /// Whether the query has two or more words.
    pub multi_word: bool,
    pub keywords: Vec<String>,
    /// Stems of the longer query words; matched as substrings.
    pub important_terms: Vec<String>,
    pub is_legal: bool,
    pub is_inventory: bool,
    /// Folder or file name the query explicitly targets.
    pub named_target: Option<String>,
}

impl QueryProfile {
    pub fn new(query: &str) -> Self {
        let phrase = query.trim().trim_end_matches(['?', '!', '.']).trim().to_lowercase();
        let keywords = text::keywords(query);
        let mut important_terms: Vec<String> = Vec::new();
        for word in text::words(&phrase) {
            if word.chars().count() <= 4 || text::is_stop_word(word) {
                continue;
            }
            let stem = stem(word);
            if !keywords.contains(&stem) && !important_terms.contains(&stem) {
                important_terms.push(stem);
            }
        }

        Self {
            multi_word: text::words(&phrase).count() >= 2,
            is_legal: LEGAL_RE.is_match(query),
            is_inventory: INVENTORY_RE.is_match(query),
            named_target: named_target(query),
            phrase,
            keywords,
            important_terms,
        }
    }
}

fn stem(word: &str) -> String {
    for suffix in STEM_SUFFIXES {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.chars().count() >= 4 {
                return base.to_string();
            }
        }
    }
    word.to_string()
}

fn named_target(query: &str) -> Option<String> {
    let quoted = NAMED_TARGET_RE
        .captures(query)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string());
    let trailing = || {
        TRAILING_FOLDER_RE
            .captures_iter(query)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .find(|w| !text::is_stop_word(&w.to_lowercase()) && w.chars().count() > 1)
    };
    quoted
        .or_else(trailing)
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
}

/// Marker kinds found in a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Folder,
    File,
}

/// Folder and file names declared by marker lines inside `content`.
pub fn markers(content: &str) -> Vec<(MarkerKind, String)> {
    DOC_MARKER_RE
        .find_iter(content)
        .filter_map(|m| {
            let line = m.as_str().trim().trim_start_matches('[').trim_end_matches(']');
            let (label, name) = line.split_once(':')?;
            let kind = match label.trim().to_lowercase().as_str() {
                "folder" | "directory" => MarkerKind::Folder,
                _ => MarkerKind::File,
            };
            let name = name.trim().to_lowercase();
            // `docs/legal/nda.md` declares both a folder and a file
            let mut found = Vec::new();
            if kind == MarkerKind::File {
                if let Some((dir, _)) = name.rsplit_once('/') {
                    found.push((MarkerKind::Folder, dir.to_string()));
                }
            }
            found.push((kind, name));
            Some(found)
        })
        .flatten()
        .collect()
}

/// Score one section against the query.
pub fn score_section(section: &VaultSection, profile: &QueryProfile, weights: &ScoringWeights) -> i64 {
    let lower = section.content.to_lowercase();
    let mut score = 0i64;

    for term in profile.keywords.iter().chain(&profile.important_terms) {
        score += weights.keyword_occurrence * lower.matches(term.as_str()).count() as i64;
    }

    if profile.multi_word && !profile.phrase.is_empty() && lower.contains(&profile.phrase) {
        score += weights.exact_phrase;
    }
    if section.has_header {
        score += weights.header;
    }
    if DIRECTIVE_RE.is_match(&section.content) {
        score += weights.directive_language;
    }
    if BUSINESS_RE.is_match(&section.content) {
        score += weights.business_language;
    }
    if profile.is_legal && LEGAL_RE.is_match(&section.content) {
        score += weights.legal_language;
    }

    let found = markers(&section.content);
    let matches_kind = |kind: MarkerKind| {
        found
            .iter()
            .any(|(k, name)| *k == kind && profile.keywords.iter().any(|kw| name.contains(kw.as_str())))
    };
    if matches_kind(MarkerKind::Folder) {
        score += weights.folder_match;
    }
    if matches_kind(MarkerKind::File) {
        score += weights.file_match;
    }

    score
}

/// Whether any marker in `section` names `target`.
pub fn matches_target(section: &VaultSection, target: &str) -> bool {
    markers(&section.content).iter().any(|(_, name)| name.contains(target))
}
