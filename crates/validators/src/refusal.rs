//! Refusal detection.
//!
//! Classifies whether a response is a "not enough information" style
//! refusal. Validators use it to decide between replacing, appending, and
//! skipping, so genuine refusals get annotated rather than overwritten.

use regex::Regex;
use std::sync::LazyLock;

static REFUSAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\bi\s+(?:don't|don’t|do not)\s+(?:have|know|see|recall|remember)\b|\b(?:not|no)\s+enough\s+(?:information|info|context|details)\b|\bi\s+(?:can't|can’t|cannot|couldn't|couldn’t|could not|was unable to|wasn't able to|am unable to)\s+(?:find|recall|remember|locate|determine|tell|say|access)\b|\bi'?m\s+(?:not sure|unable to)\b|\bi\s+am\s+(?:not sure|unable to)\b|\bno\s+(?:record|records|information|details|mention)\s+(?:of|about|on|for)\b|\byou\s+(?:haven't|haven’t|have not)\s+(?:told|mentioned|shared)\b)",
    )
    .expect("REFUSAL_RE regex should compile")
});

/// Whether `response` reads as a refusal for lack of information.
pub fn is_refusal(response: &str) -> bool {
    REFUSAL_RE.is_match(response)
}
