//! Ordinal references ("my second code").
//!
//! Facts may carry `metadata.ordinal`, `metadata.ordinalSubject`, and
//! `metadata.ordinalValue`. When the query asks for the n-th value of a known
//! subject, any other ordinal's value quoted in the response is replaced with
//! the n-th one. If no value is quoted, the correct one is appended.

use crate::chain::{ValidationContext, ValidationOutcome, Validator, merge_facts};
use async_trait::async_trait;
use factlayer_config::ValidatorConfig;
use factlayer_core::{Fact, FactFilter, ValidatorError, text};
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|1st|2nd|3rd|4th|5th|6th|7th|8th|9th|10th)\s+([a-z]+)(?:\s+([a-z]+))?",
    )
    .expect("ORDINAL_RE regex should compile")
});

const ORDINAL_WORDS: &[(&str, &str, u32)] = &[
    ("first", "1st", 1),
    ("second", "2nd", 2),
    ("third", "3rd", 3),
    ("fourth", "4th", 4),
    ("fifth", "5th", 5),
    ("sixth", "6th", 6),
    ("seventh", "7th", 7),
    ("eighth", "8th", 8),
    ("ninth", "9th", 9),
    ("tenth", "10th", 10),
];

/// What the query asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalRequest {
    pub ordinal: u32,
    /// Ordinal word as written in the query, lowercased.
    pub word: String,
    pub subject: String,
}

pub struct OrdinalValidator {
    subjects: Vec<String>,
    lookup_limit: usize,
}

impl OrdinalValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            subjects: config.ordinal_subjects.iter().map(|s| s.to_lowercase()).collect(),
            lookup_limit: config.lookup_limit,
        }
    }

    /// The ordinal and subject the query names, if the subject is known.
    /// One word may sit between them ("second secret code").
    pub fn parse(&self, query: &str) -> Option<OrdinalRequest> {
        ORDINAL_RE.captures_iter(query).find_map(|caps| {
            let word = caps.get(1)?.as_str().to_lowercase();
            let ordinal = ORDINAL_WORDS
                .iter()
                .find(|(long, short, _)| *long == word || *short == word)
                .map(|(_, _, n)| *n)?;
            [caps.get(2), caps.get(3)]
                .into_iter()
                .flatten()
                .map(|m| m.as_str().to_lowercase())
                .find_map(|candidate| self.known_subject(&candidate))
                .map(|subject| OrdinalRequest {
                    ordinal,
                    word: word.clone(),
                    subject,
                })
        })
    }

    fn known_subject(&self, word: &str) -> Option<String> {
        let singular = word.strip_suffix("es").filter(|s| self.subjects.iter().any(|k| k == s));
        let singular = singular.or_else(|| word.strip_suffix('s'));
        [Some(word), singular]
            .into_iter()
            .flatten()
            .find(|w| self.subjects.iter().any(|k| k == w))
            .map(str::to_string)
    }
}

fn same_subject(fact: &Fact, subject: &str) -> bool {
    fact.ordinal().is_some() && fact.ordinal_subject().is_some_and(|s| s.eq_ignore_ascii_case(subject))
}

#[async_trait]
impl Validator for OrdinalValidator {
    fn name(&self) -> &'static str {
        "ordinal"
    }

    fn gate(&self, query: &str) -> bool {
        self.parse(query).is_some()
    }

    async fn apply(&self, response: &str, ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
        let Some(request) = self.parse(ctx.query) else {
            return Ok(ValidationOutcome::unchanged(response, json!({"reason": "no_ordinal_request"})));
        };

        let target_of = |facts: &[Fact]| {
            facts
                .iter()
                .any(|f| same_subject(f, &request.subject) && f.ordinal() == Some(request.ordinal))
        };
        let facts = if target_of(ctx.facts) {
            ctx.facts.to_vec()
        } else {
            let found = ctx
                .lookup(self.name(), FactFilter::HasMetadata("ordinal".into()), self.lookup_limit)
                .await?;
            merge_facts(ctx.facts, found)
        };

        let tagged: Vec<&Fact> = facts.iter().filter(|f| same_subject(f, &request.subject)).collect();
        let Some(target) = tagged.iter().find(|f| f.ordinal() == Some(request.ordinal)) else {
            return Ok(ValidationOutcome::unchanged(
                response,
                json!({"reason": "no_matching_fact", "ordinal": request.ordinal, "subject": request.subject}),
            ));
        };
        let Some(value) = target.ordinal_value() else {
            return Err(ValidatorError::MalformedFact {
                fact_id: target.id.clone(),
                reason: "ordinal fact has no ordinalValue".into(),
            });
        };

        let mut corrected = response.to_string();
        let mut replaced = Vec::new();
        for other in &tagged {
            if other.ordinal() == Some(request.ordinal) {
                continue;
            }
            let Some(wrong) = other.ordinal_value() else {
                continue;
            };
            if wrong == value {
                continue;
            }
            let (next, count) = text::replace_word(&corrected, wrong, value);
            if count > 0 {
                corrected = next;
                replaced.push(wrong.to_string());
            }
        }

        let detail = json!({
            "ordinal": request.ordinal,
            "subject": request.subject,
            "value": value,
            "replaced": replaced,
        });
        if !replaced.is_empty() {
            return Ok(ValidationOutcome::corrected(corrected, detail));
        }
        if text::contains_word(response, value) {
            return Ok(ValidationOutcome::unchanged(
                response,
                json!({"reason": "already_correct", "value": value}),
            ));
        }

        let sentence = format!("Your {} {} is {value}.", request.word, request.subject);
        Ok(ValidationOutcome::corrected(
            text::append_sentence(response, &sentence),
            json!({
                "ordinal": request.ordinal,
                "subject": request.subject,
                "value": value,
                "appended": true,
            }),
        ))
    }
}
