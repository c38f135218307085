//! Accented name preservation.
//!
//! Generated text tends to flatten names like "José" to "Jose". For contact
//! and name-listing questions, names with non-ASCII letters are collected
//! from `metadata.anchors.unicode` (or, failing that, from people mentioned
//! in the fact text) and
//! any ASCII-folded spelling in the response is restored. If the response
//! mentions none of the names at all, they are appended.

use crate::ambiguity::{NAME_RELATION_RE, RELATION_NAME_RE};
use crate::chain::{ValidationContext, ValidationOutcome, Validator};
use async_trait::async_trait;
use factlayer_config::ValidatorConfig;
use factlayer_core::{Fact, FactFilter, ValidatorError, text};
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static GATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:contacts?\b|who\s+(?:are|is)\s+my\b|(?:list|name)\s+(?:all\s+)?(?:of\s+)?my\s+(?:contacts|friends|people|family|relatives|colleagues|co-?workers|team)\b|spell\w*\b[^?.!]*\bnames?\b|names?\s+of\s+my\b)",
    )
    .expect("GATE_RE regex should compile")
});

/// "Met José Álvarez", "Contact: Zoë", "her name is Zoë"
static PERSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(?:(?:met(?:[ \t]+with)?|meeting[ \t]+with|spoke[ \t]+(?:to|with)|talked[ \t]+(?:to|with)|name[ \t]+is)[ \t]+|(?:contact|friend|colleague)s?[ \t]*:[ \t]*))(\p{Lu}[\p{L}'’-]*\p{L}(?:[ \t]+\p{Lu}[\p{L}'’-]*\p{L})?)",
    )
    .expect("PERSON_RE regex should compile")
});

/// Letters that do not decompose into base + combining mark.
fn fold_special(c: char) -> Option<&'static str> {
    Some(match c {
        'ł' => "l",
        'Ł' => "L",
        'ø' => "o",
        'Ø' => "O",
        'ß' => "ss",
        'đ' => "d",
        'Đ' => "D",
        'æ' => "ae",
        'Æ' => "Ae",
        'œ' => "oe",
        'Œ' => "Oe",
        'ı' => "i",
        _ => return None,
    })
}

/// Strip diacritics: "José Ñúñez" becomes "Jose Nunez".
pub fn ascii_fold(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.nfd().filter(|c| !is_combining_mark(*c)) {
        match fold_special(c) {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }
    out
}

/// Names worth preserving: those whose folded form differs.
fn accented(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim().to_string();
        if !name.is_empty() && !name.is_ascii() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

fn anchored_names(facts: &[Fact]) -> Vec<String> {
    accented(facts.iter().flat_map(|f| f.anchors("unicode")))
}

/// Names that appear in a person context; capitalized place names and
/// brands are not collected.
fn extracted_names(facts: &[Fact]) -> Vec<String> {
    let mut names = Vec::new();
    for fact in facts {
        let content = fact.content.as_str();
        names.extend(PERSON_RE.captures_iter(content).map(|c| c[1].to_string()));
        names.extend(RELATION_NAME_RE.captures_iter(content).map(|c| c[2].to_string()));
        names.extend(NAME_RELATION_RE.captures_iter(content).map(|c| c[1].to_string()));
    }
    accented(names)
}

pub struct UnicodeNameValidator {
    lookup_limit: usize,
}

impl UnicodeNameValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            lookup_limit: config.lookup_limit,
        }
    }
}

#[async_trait]
impl Validator for UnicodeNameValidator {
    fn name(&self) -> &'static str {
        "unicode_names"
    }

    fn gate(&self, query: &str) -> bool {
        GATE_RE.is_match(query)
    }

    async fn apply(&self, response: &str, ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
        let mut names = anchored_names(ctx.facts);
        let mut source = "retrieved_anchors";
        if names.is_empty() {
            let recent = ctx.lookup(self.name(), FactFilter::Recent, self.lookup_limit).await?;
            names = anchored_names(&recent);
            source = "recent_anchors";
            if names.is_empty() {
                names = extracted_names(&recent);
                source = "recent_text";
            }
            if names.is_empty() {
                names = extracted_names(ctx.facts);
                source = "retrieved_text";
            }
        }
        if names.is_empty() {
            return Ok(ValidationOutcome::unchanged(response, json!({"names": []})));
        }

        // Longer names first so "José Álvarez" is restored before "José"
        names.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));

        let mut corrected = response.to_string();
        let mut restored = Vec::new();
        let mut present = 0;
        for name in &names {
            if text::contains_word(&corrected, name) {
                present += 1;
                continue;
            }
            let folded = ascii_fold(name);
            let (next, count) = text::replace_word(&corrected, &folded, name);
            if count > 0 {
                corrected = next;
                restored.push(json!({"from": folded, "to": name}));
                present += 1;
            }
        }

        if !restored.is_empty() {
            return Ok(ValidationOutcome::corrected(
                corrected,
                json!({"source": source, "restored": restored}),
            ));
        }
        if present > 0 {
            return Ok(ValidationOutcome::unchanged(response, json!({"source": source, "names": names})));
        }

        names.sort();
        let sentence = format!("Names as you saved them: {}.", names.join(", "));
        Ok(ValidationOutcome::corrected(
            text::append_sentence(response, &sentence),
            json!({"source": source, "appended": names}),
        ))
    }
}
