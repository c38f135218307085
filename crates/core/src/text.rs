//! Shared text helpers: stop words, keyword extraction, and literal
//! word-bounded search and replace.
//!
//! Every lookup here is a literal substring or equality check. Patterns are
//! never built from user-supplied text.

/// Words ignored when extracting query keywords.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "his", "how", "its", "may", "now", "see", "who", "did",
    "does", "what", "when", "where", "which", "why", "with", "this", "that", "these", "those",
    "from", "into", "about", "would", "could", "should", "there", "their", "them", "they",
    "then", "than", "been", "being", "were", "will", "your", "yours", "mine", "tell", "know",
    "just", "like", "some", "more", "most", "also", "only", "very", "please", "give", "show",
    "find", "get", "got", "let", "want", "need", "doing", "done", "say", "said", "ever", "each",
    "other", "such", "here", "him", "she", "hers", "its", "too", "yes", "okay", "thanks",
    "thank", "hello", "hey", "much", "many", "own", "same", "over", "under", "again", "once",
    "while", "because", "until", "both", "few", "whom", "whose", "i'm", "can't", "don't",
];

/// Whether `word` (already lowercased) is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Split text into alphanumeric words.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
}

/// Extract lowercase query keywords: words longer than two characters that
/// are not stop words, deduplicated in first-seen order.
pub fn keywords(query: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in words(query) {
        let lower = word.to_lowercase();
        if lower.chars().count() <= 2 || is_stop_word(&lower) {
            continue;
        }
        if !out.contains(&lower) {
            out.push(lower);
        }
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offsets of every occurrence of `needle` in `haystack` that is not
/// glued to a neighbouring word character. Matching is case-sensitive and
/// occurrences never overlap.
pub fn word_positions(haystack: &str, needle: &str) -> Vec<usize> {
    let mut out = Vec::new();
    if needle.is_empty() {
        return out;
    }
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut start = 0;
    let mut last_end = 0;
    while let Some(rel) = haystack[start..].find(needle) {
        let pos = start + rel;
        let end = pos + needle.len();
        let before_ok = haystack[..pos].chars().next_back().is_none_or(|c| !is_word_char(c));
        let after_ok = haystack[end..].chars().next().is_none_or(|c| !is_word_char(c));
        if before_ok && after_ok && pos >= last_end {
            out.push(pos);
            last_end = end;
        }
        start = pos + step;
    }
    out
}

/// Case-sensitive word-bounded containment.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    !word_positions(haystack, needle).is_empty()
}

/// Case-insensitive word-bounded containment.
pub fn contains_word_ignore_case(haystack: &str, needle: &str) -> bool {
    contains_word(&haystack.to_lowercase(), &needle.to_lowercase())
}

/// Replace every word-bounded occurrence of `from` with `to`.
///
/// Returns the rewritten text and the number of replacements made.
pub fn replace_word(haystack: &str, from: &str, to: &str) -> (String, usize) {
    let positions = word_positions(haystack, from);
    if positions.is_empty() {
        return (haystack.to_string(), 0);
    }
    let mut out = String::with_capacity(haystack.len() + positions.len() * to.len());
    let mut cursor = 0;
    for pos in &positions {
        out.push_str(&haystack[cursor..*pos]);
        out.push_str(to);
        cursor = pos + from.len();
    }
    out.push_str(&haystack[cursor..]);
    (out, positions.len())
}

/// Append a sentence to a response, keeping sentence punctuation intact.
pub fn append_sentence(response: &str, sentence: &str) -> String {
    let trimmed = response.trim_end();
    if trimmed.is_empty() {
        return sentence.to_string();
    }
    let needs_stop = trimmed.chars().next_back().is_some_and(is_word_char);
    if needs_stop {
        format!("{trimmed}. {sentence}")
    } else {
        format!("{trimmed} {sentence}")
    }
}

/// Prepend a sentence to a response.
pub fn prepend_sentence(response: &str, sentence: &str) -> String {
    let trimmed = response.trim_start();
    if trimmed.is_empty() {
        return sentence.to_string();
    }
    format!("{sentence} {trimmed}")
}
