//! Superseded attribute values.
//!
//! Facts may record a named attribute (`metadata.attribute`, e.g.
//! `favorite_color`) with a value (`metadata.attributeValue`). When a value
//! changes, the old fact is superseded rather than deleted. A response that
//! repeats a stale value for an attribute the query asks about has that value
//! replaced by the current one. Nothing is ever appended.

use crate::chain::{ValidationContext, ValidationOutcome, Validator};
use async_trait::async_trait;
use factlayer_config::ValidatorConfig;
use factlayer_core::{Fact, FactFilter, ValidatorError, text};
use serde_json::json;
use std::collections::BTreeMap;

pub struct ConflictValidator {
    lookup_limit: usize,
    attribute_terms: Vec<String>,
}

impl ConflictValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            lookup_limit: config.lookup_limit,
            attribute_terms: config.attribute_terms.clone(),
        }
    }
}

/// Current value and stale values for one attribute.
#[derive(Debug, Default)]
struct AttributeHistory<'a> {
    current: Option<&'a Fact>,
    stale: Vec<&'a str>,
}

/// Group facts by attribute, keeping only attributes the query names.
fn histories<'a>(facts: &'a [Fact], query: &str) -> BTreeMap<String, AttributeHistory<'a>> {
    let mut by_attribute: BTreeMap<String, Vec<&'a Fact>> = BTreeMap::new();
    for fact in facts {
        let (Some(attribute), Some(_)) = (fact.attribute(), fact.attribute_value()) else {
            continue;
        };
        let spoken = attribute.replace('_', " ");
        if text::contains_word_ignore_case(query, &spoken) {
            by_attribute.entry(spoken).or_default().push(fact);
        }
    }

    by_attribute
        .into_iter()
        .map(|(attribute, group)| {
            let current = group
                .iter()
                .filter(|f| f.is_current)
                .max_by_key(|f| f.created_at)
                .copied();
            let current_value = current.and_then(Fact::attribute_value);
            let mut stale: Vec<&str> = Vec::new();
            for fact in &group {
                if current.is_some_and(|c| c.id == fact.id) {
                    continue;
                }
                if let Some(value) = fact.attribute_value() {
                    let differs = current_value.is_none_or(|c| !c.eq_ignore_ascii_case(value));
                    if differs && !stale.contains(&value) {
                        stale.push(value);
                    }
                }
            }
            (attribute, AttributeHistory { current, stale })
        })
        .collect()
}

#[async_trait]
impl Validator for ConflictValidator {
    fn name(&self) -> &'static str {
        "conflict"
    }

    /// A possessive plus attribute phrasing ("my current address").
    fn gate(&self, query: &str) -> bool {
        text::contains_word_ignore_case(query, "my")
            && self
                .attribute_terms
                .iter()
                .any(|term| text::contains_word_ignore_case(query, term))
    }

    async fn apply(&self, response: &str, ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
        let filter = FactFilter::HasMetadata("attribute".into()).including_superseded();
        let facts = ctx.lookup(self.name(), filter, self.lookup_limit).await?;

        let mut corrected = response.to_string();
        let mut changes = Vec::new();
        for (attribute, history) in histories(&facts, ctx.query) {
            let Some(current) = history.current.and_then(Fact::attribute_value) else {
                continue;
            };
            if text::contains_word(&corrected, current) {
                continue;
            }
            for stale in history.stale {
                let (next, count) = text::replace_word(&corrected, stale, current);
                if count > 0 {
                    corrected = next;
                    changes.push(json!({"attribute": attribute, "from": stale, "to": current}));
                }
            }
        }

        if changes.is_empty() {
            return Ok(ValidationOutcome::unchanged(response, json!({"changes": []})));
        }
        Ok(ValidationOutcome::corrected(corrected, json!({"changes": changes})))
    }
}
