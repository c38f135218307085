//! Start-year arithmetic.
//!
//! For "when" questions, a duration ("worked 5 years") and an end anchor
//! ("left in 2020") found in stored facts give `start = end - duration`.
//! Every input and the result are range-checked; anything implausible
//! suppresses the correction. The computed year is only ever appended.

use crate::chain::{ValidationContext, ValidationOutcome, Validator, merge_facts};
use async_trait::async_trait;
use factlayer_config::ValidatorConfig;
use factlayer_core::{Fact, FactFilter, ValidatorError, text};
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

static GATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:when|what\s+year|which\s+year|since\s+when|how\s+long\s+ago)\b")
        .expect("GATE_RE regex should compile")
});

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:worked|been|served|lived|stayed|spent|employed|studied|taught)\b[^.]*?\b(\d{1,3})\s+years?\b")
        .expect("DURATION_RE regex should compile")
});

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:left|leaving|quit|retired|departed|ended|finished|resigned|stopped|moved\s+out|graduated)\b[^.]*?\b(\d{4})\b",
    )
    .expect("ANCHOR_RE regex should compile")
});

/// Words the fallback lookup matches on.
const LOOKUP_WORDS: &[&str] = &[
    "years", "year", "worked", "left", "quit", "retired", "resigned", "lived", "served", "stopped",
];

pub struct TemporalValidator {
    min_year: i32,
    min_duration: i32,
    max_duration: i32,
    lookup_limit: usize,
}

/// A number extracted from a fact, with how well the fact matches the query.
#[derive(Debug, Clone, Copy)]
struct Found {
    value: i32,
    relevance: usize,
}

impl TemporalValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            min_year: config.min_year,
            min_duration: config.min_duration_years,
            max_duration: config.max_duration_years,
            lookup_limit: config.lookup_limit,
        }
    }

    /// Best match of `re`'s first group across `facts`, preferring facts that
    /// share more query keywords, then earlier (higher ranked) facts.
    fn extract(re: &Regex, facts: &[Fact], keywords: &[String]) -> Option<Found> {
        let mut best: Option<Found> = None;
        for fact in facts {
            let Some(value) = re
                .captures(&fact.content)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i32>().ok())
            else {
                continue;
            };
            let relevance = keywords
                .iter()
                .filter(|k| text::contains_word_ignore_case(&fact.content, k))
                .count();
            if best.is_none_or(|b| relevance > b.relevance) {
                best = Some(Found { value, relevance });
            }
        }
        best
    }
}

#[async_trait]
impl Validator for TemporalValidator {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn gate(&self, query: &str) -> bool {
        GATE_RE.is_match(query)
    }

    async fn apply(&self, response: &str, ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
        let keywords = text::keywords(ctx.query);
        let mut duration = Self::extract(&DURATION_RE, ctx.facts, &keywords);
        let mut anchor = Self::extract(&ANCHOR_RE, ctx.facts, &keywords);

        if duration.is_none() || anchor.is_none() {
            let words = LOOKUP_WORDS.iter().map(|w| w.to_string()).collect();
            let found = ctx
                .lookup(self.name(), FactFilter::AnyKeyword(words), self.lookup_limit)
                .await?;
            let facts = merge_facts(ctx.facts, found);
            duration = duration.or_else(|| Self::extract(&DURATION_RE, &facts, &keywords));
            anchor = anchor.or_else(|| Self::extract(&ANCHOR_RE, &facts, &keywords));
        }

        let (Some(duration), Some(anchor)) = (duration, anchor) else {
            return Ok(ValidationOutcome::unchanged(
                response,
                json!({"reason": "missing_inputs", "duration": duration.map(|d| d.value), "anchor": anchor.map(|a| a.value)}),
            ));
        };
        let (duration, anchor) = (duration.value, anchor.value);
        let start = anchor - duration;
        let years = self.min_year..=ctx.current_year;
        let durations = self.min_duration..=self.max_duration;

        if !durations.contains(&duration) || !years.contains(&anchor) || !years.contains(&start) {
            return Ok(ValidationOutcome::unchanged(
                response,
                json!({"reason": "out_of_range", "duration": duration, "anchor": anchor, "start": start}),
            ));
        }

        let year = start.to_string();
        let detail = json!({"duration": duration, "anchor": anchor, "start": start});
        if text::contains_word(response, &year) {
            return Ok(ValidationOutcome::unchanged(response, detail));
        }

        let sentence = format!("That works out to {start}: {duration} years before {anchor}.");
        Ok(ValidationOutcome::corrected(text::append_sentence(response, &sentence), detail))
    }
}
