//! Vehicle recall.
//!
//! Vehicle facts are easy for ranking to drop. For vehicle questions whose
//! response names no vehicle, the store is queried directly for
//! vehicle-indicative facts and the vehicle is appended as a sentence.

use crate::chain::{ValidationContext, ValidationOutcome, Validator};
use crate::refusal::is_refusal;
use async_trait::async_trait;
use factlayer_config::ValidatorConfig;
use factlayer_core::{FactFilter, ValidatorError, text};
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

static GATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:cars?|vehicles?|trucks?|suvs?|vans?|motorcycles?|motorbikes?|drive|drives|driving|ride)\b")
        .expect("GATE_RE regex should compile")
});

const MAKES: &str = "toyota|honda|ford|chevrolet|chevy|tesla|bmw|audi|mercedes(?:-benz)?|volkswagen|vw|subaru|nissan|hyundai|kia|mazda|jeep|dodge|gmc|lexus|acura|volvo|porsche|jaguar|land\\s+rover|range\\s+rover|fiat|buick|cadillac|lincoln|chrysler|mitsubishi|rivian|polestar|harley-davidson|harley|ducati|yamaha|kawasaki|suzuki";

const BODY_TYPES: &str = "car|truck|suv|van|sedan|hatchback|coupe|convertible|wagon|minivan|pickup|motorcycle|motorbike";

static MAKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b(?:{MAKES})\b")).expect("MAKE_RE regex should compile"));

/// "2018 Honda Civic", "Tesla Model 3"
static MAKE_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(?:(?:19|20)\d{{2}}[ \t]+)?(?i:{MAKES})\b(?:[ \t]+[A-Z0-9][\w-]*){{0,2}}"))
        .expect("MAKE_PHRASE_RE regex should compile")
});

/// "a red pickup truck"
static BODY_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:a|an|my)[ \t]+((?:[\w-]+[ \t]+){{0,2}}?(?:{BODY_TYPES})(?:[ \t]+(?:truck|van))?)\b"))
        .expect("BODY_PHRASE_RE regex should compile")
});

/// Words the direct store lookup matches on.
const LOOKUP_WORDS: &[&str] = &[
    "car", "truck", "suv", "van", "sedan", "pickup", "motorcycle", "drive", "drives", "vehicle", "toyota",
    "honda", "ford", "chevrolet", "tesla", "bmw", "audi", "mercedes", "volkswagen", "subaru", "nissan",
    "hyundai", "kia", "mazda", "jeep", "lexus", "volvo", "porsche",
];

pub struct VehicleRecallValidator {
    lookup_limit: usize,
}

impl VehicleRecallValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            lookup_limit: config.lookup_limit,
        }
    }
}

/// Whether the text already names a vehicle.
pub fn mentions_vehicle(text: &str) -> bool {
    MAKE_RE.is_match(text) || BODY_PHRASE_RE.is_match(text)
}

/// The most specific vehicle phrase in `content`.
pub fn vehicle_phrase(content: &str) -> Option<String> {
    if let Some(m) = MAKE_PHRASE_RE.find(content) {
        return Some(m.as_str().trim().to_string());
    }
    BODY_PHRASE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn with_article(phrase: &str) -> String {
    let vowel = phrase
        .chars()
        .next()
        .is_some_and(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'));
    if vowel {
        format!("an {phrase}")
    } else {
        format!("a {phrase}")
    }
}

#[async_trait]
impl Validator for VehicleRecallValidator {
    fn name(&self) -> &'static str {
        "vehicle_recall"
    }

    fn gate(&self, query: &str) -> bool {
        GATE_RE.is_match(query)
    }

    async fn apply(&self, response: &str, ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
        if mentions_vehicle(response) && !is_refusal(response) {
            return Ok(ValidationOutcome::unchanged(response, json!({"reason": "vehicle_mentioned"})));
        }

        let words = LOOKUP_WORDS.iter().map(|w| w.to_string()).collect();
        let facts = ctx
            .lookup(self.name(), FactFilter::AnyKeyword(words), self.lookup_limit)
            .await?;

        let Some((fact_id, phrase)) = facts
            .iter()
            .find_map(|f| vehicle_phrase(&f.content).map(|p| (f.id.clone(), p)))
        else {
            return Ok(ValidationOutcome::unchanged(
                response,
                json!({"reason": "no_vehicle_fact", "candidates": facts.len()}),
            ));
        };

        if text::contains_word_ignore_case(response, &phrase) {
            return Ok(ValidationOutcome::unchanged(response, json!({"reason": "vehicle_mentioned"})));
        }

        let sentence = format!("From what you've told me, you drive {}.", with_article(&phrase));
        Ok(ValidationOutcome::corrected(
            text::append_sentence(response, &sentence),
            json!({"vehicle": phrase, "fact_id": fact_id}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factlayer_core::Fact;
    use factlayer_memory::InMemoryFactStore;

    fn validator() -> VehicleRecallValidator {
        VehicleRecallValidator::new(&ValidatorConfig::default())
    }

    fn ctx<'a>(store: &'a InMemoryFactStore) -> ValidationContext<'a> {
        ValidationContext {
            user_id: "u1",
            query: "What car do I drive?",
            facts: &[],
            store,
            current_year: 2025,
        }
    }

    #[test]
    fn phrase_extraction() {
        assert_eq!(vehicle_phrase("I drive a 2018 Honda Civic to work").as_deref(), Some("2018 Honda Civic"));
        assert_eq!(vehicle_phrase("Just bought a Tesla Model 3").as_deref(), Some("Tesla Model 3"));
        assert_eq!(vehicle_phrase("I have a red pickup truck").as_deref(), Some("red pickup truck"));
        assert_eq!(vehicle_phrase("I like pasta"), None);
    }

    #[test]
    fn mention_detection() {
        assert!(mentions_vehicle("You drive a Subaru."));
        assert!(mentions_vehicle("You have an old blue van."));
        assert!(!mentions_vehicle("I'm not sure what you drive."));
    }

    #[tokio::test]
    async fn appends_vehicle_from_store() {
        let store = InMemoryFactStore::with_facts(vec![
            Fact::new("a", "u1", "I like pasta"),
            Fact::new("b", "u1", "I drive a 2018 Honda Civic to work"),
        ]);
        let out = validator()
            .apply("I don't have that information.", &ctx(&store))
            .await
            .unwrap();
        assert!(out.correction_applied);
        assert_eq!(
            out.response,
            "I don't have that information. From what you've told me, you drive a 2018 Honda Civic."
        );
        assert_eq!(out.detail["fact_id"], "b");
    }

    #[tokio::test]
    async fn existing_mention_skips_lookup() {
        let store = InMemoryFactStore::with_facts(vec![Fact::new("b", "u1", "I drive a Honda Civic")]);
        let out = validator().apply("You drive a Honda Civic.", &ctx(&store)).await.unwrap();
        assert!(!out.correction_applied);
    }

    #[tokio::test]
    async fn no_vehicle_facts_leaves_response() {
        let store = InMemoryFactStore::with_facts(vec![Fact::new("a", "u1", "I like pasta")]);
        let out = validator().apply("No idea.", &ctx(&store)).await.unwrap();
        assert!(!out.correction_applied);
        assert_eq!(out.response, "No idea.");
    }
}
