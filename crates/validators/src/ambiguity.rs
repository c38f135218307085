//! Name ambiguity disclosure.
//!
//! When a name in the query belongs to more than one person in the user's
//! facts ("my friend Alex" and "Alex, my colleague"), the response gets a
//! question asking which one is meant. Descriptors are found with fixed
//! patterns and compared to the name by plain string equality; no pattern is
//! ever built from user text.

use crate::chain::{ValidationContext, ValidationOutcome, Validator, merge_facts};
use crate::refusal::is_refusal;
use async_trait::async_trait;
use factlayer_config::ValidatorConfig;
use factlayer_core::{Fact, FactFilter, ValidatorError, text};
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Names considered per query.
const MAX_NAMES: usize = 2;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\p{Lu}\p{Ll}+\b").expect("NAME_RE regex should compile"));

/// "my friend Alex", "colleague Alex"
pub(crate) static RELATION_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(best\s+friend|friend|colleague|co-?worker|boss|manager|brother|sister|cousin|neighbou?r|partner|wife|husband|son|daughter|uncle|aunt|mother|father|mom|dad|roommate|classmate|teacher|doctor|dentist|client|mentor|coach)\b)[ \t]*,?[ \t]+(\p{Lu}\p{Ll}+)\b",
    )
    .expect("RELATION_NAME_RE regex should compile")
});

/// "Alex, my colleague", "Alex is my sister"
pub(crate) static NAME_RELATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\p{Lu}\p{Ll}+)(?:[ \t]*,[ \t]*|[ \t]+(?:is|was)[ \t]+|[ \t]*\([ \t]*)(?i:my|our|a)[ \t]+(?i:(best\s+friend|friend|colleague|co-?worker|boss|manager|brother|sister|cousin|neighbou?r|partner|wife|husband|son|daughter|uncle|aunt|mother|father|mom|dad|roommate|classmate|teacher|doctor|dentist|client|mentor|coach))\b",
    )
    .expect("NAME_RELATION_RE regex should compile")
});

/// "Alex from Lisbon", "Alex from work"
static NAME_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\p{Lu}\p{Ll}+)[ \t]+from[ \t]+(?:the[ \t]+)?(\p{Lu}[\w'-]*(?:[ \t]+\p{Lu}[\w'-]*)*|(?i:work|the\s+office|office|school|high\s+school|college|university|church|the\s+gym|gym|yoga|book\s+club|soccer|football|tennis))\b",
    )
    .expect("NAME_FROM_RE regex should compile")
});

/// Capitalized words that are not names.
const NOT_NAMES: &[&str] = &[
    "What", "Who", "Whom", "Whose", "Where", "When", "Why", "How", "Which", "Is", "Are", "Was", "Were", "Do",
    "Does", "Did", "Can", "Could", "Should", "Would", "Will", "Tell", "Remind", "Give", "Show", "Please", "Hey",
    "Hi", "Hello", "My", "Me", "Mine", "The", "An", "And", "Or", "But", "It", "Its", "He", "She", "They", "We",
    "You", "Your", "Our", "Their", "His", "Her", "Has", "Have", "Had", "Any", "Some", "This", "That", "If",
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January", "February",
    "March", "April", "May", "June", "July", "August", "September", "October", "November", "December",
    "Today", "Tomorrow", "Yesterday", "Thanks", "Thank", "Ok", "Okay", "Yes", "No", "List", "Find", "Name",
    "Names", "Spell", "Say", "Explain", "Describe", "Summarize", "Remember", "Recall",
];

pub struct AmbiguityValidator {
    lookup_limit: usize,
}

/// A relation or origin describing one person.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Descriptor {
    Relation(String),
    From(String),
}

impl Descriptor {
    fn render(&self, name: &str) -> String {
        match self {
            Self::Relation(r) => format!("your {r}"),
            Self::From(place) => format!("{name} from {place}"),
        }
    }
}

fn normalize_relation(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let lower: String = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    match lower.as_str() {
        "coworker" | "co-worker" => "colleague".into(),
        "best friend" => "friend".into(),
        "mom" => "mother".into(),
        "dad" => "father".into(),
        "neighbour" => "neighbor".into(),
        _ => lower,
    }
}

fn normalize_origin(raw: &str) -> Descriptor {
    let lower = raw.to_lowercase();
    let lower: String = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    match lower.as_str() {
        "work" | "the office" | "office" => Descriptor::Relation("colleague".into()),
        _ => Descriptor::From(raw.split_whitespace().collect::<Vec<_>>().join(" ")),
    }
}

/// Capitalized query words that look like personal names, at most two.
pub fn candidate_names(query: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for m in NAME_RE.find_iter(query) {
        let word = m.as_str();
        if NOT_NAMES.contains(&word) || names.iter().any(|n| n == word) {
            continue;
        }
        names.push(word.to_string());
        if names.len() == MAX_NAMES {
            break;
        }
    }
    names
}

/// Distinct descriptors attached to `name` across `facts`.
fn descriptors(name: &str, facts: &[Fact]) -> Vec<Descriptor> {
    let mut found: Vec<Descriptor> = Vec::new();
    let mut add = |d: Descriptor| {
        if !found.contains(&d) {
            found.push(d);
        }
    };
    for fact in facts {
        let content = &fact.content;
        for caps in RELATION_NAME_RE.captures_iter(content) {
            if caps.get(2).is_some_and(|m| m.as_str() == name) {
                if let Some(rel) = caps.get(1) {
                    add(Descriptor::Relation(normalize_relation(rel.as_str())));
                }
            }
        }
        for caps in NAME_RELATION_RE.captures_iter(content) {
            if caps.get(1).is_some_and(|m| m.as_str() == name) {
                if let Some(rel) = caps.get(2) {
                    add(Descriptor::Relation(normalize_relation(rel.as_str())));
                }
            }
        }
        for caps in NAME_FROM_RE.captures_iter(content) {
            if caps.get(1).is_some_and(|m| m.as_str() == name) {
                if let Some(origin) = caps.get(2) {
                    add(normalize_origin(origin.as_str()));
                }
            }
        }
    }
    found
}

fn question(name: &str, found: &[Descriptor]) -> String {
    let rendered: Vec<String> = found.iter().map(|d| d.render(name)).collect();
    let options = match rendered.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} or {last}", rest.join(", ")),
        Some((last, _)) => last.clone(),
        None => String::new(),
    };
    format!("You've mentioned more than one {name}. Which {name} do you mean: {options}?")
}

fn disclosure_marker(name: &str) -> String {
    format!("Which {name} do you mean")
}

impl AmbiguityValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            lookup_limit: config.lookup_limit,
        }
    }

    fn ambiguous(names: &[String], facts: &[Fact]) -> BTreeMap<String, Vec<Descriptor>> {
        names
            .iter()
            .map(|n| (n.clone(), descriptors(n, facts)))
            .filter(|(_, d)| d.len() >= 2)
            .collect()
    }
}

#[async_trait]
impl Validator for AmbiguityValidator {
    fn name(&self) -> &'static str {
        "ambiguity"
    }

    fn gate(&self, query: &str) -> bool {
        !candidate_names(query).is_empty()
    }

    async fn apply(&self, response: &str, ctx: &ValidationContext<'_>) -> Result<ValidationOutcome, ValidatorError> {
        let names: Vec<String> = candidate_names(ctx.query)
            .into_iter()
            .filter(|n| !response.contains(&disclosure_marker(n)))
            .collect();
        if names.is_empty() {
            return Ok(ValidationOutcome::unchanged(response, json!({"reason": "already_disclosed"})));
        }

        let mut ambiguous = Self::ambiguous(&names, ctx.facts);
        if ambiguous.len() < names.len() {
            let found = ctx
                .lookup(self.name(), FactFilter::AnyKeyword(names.clone()), self.lookup_limit)
                .await?;
            ambiguous = Self::ambiguous(&names, &merge_facts(ctx.facts, found));
        }

        if ambiguous.is_empty() {
            return Ok(ValidationOutcome::unchanged(response, json!({"names": names, "ambiguous": []})));
        }

        let refusal = is_refusal(response);
        let mut corrected = response.to_string();
        for (name, found) in &ambiguous {
            let q = question(name, found);
            corrected = if refusal {
                text::append_sentence(&corrected, &q)
            } else {
                text::prepend_sentence(&corrected, &q)
            };
        }

        let detail = json!({
            "names": ambiguous.keys().collect::<Vec<_>>(),
            "descriptors": ambiguous
                .iter()
                .map(|(n, d)| (n.clone(), d.iter().map(|x| x.render(n)).collect::<Vec<_>>()))
                .collect::<BTreeMap<_, _>>(),
            "placement": if refusal { "append" } else { "prepend" },
        });
        Ok(ValidationOutcome::corrected(corrected, detail))
    }
}
