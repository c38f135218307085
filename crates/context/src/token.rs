//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! Characters are Unicode scalar values, so accented names cost the same as
//! their ASCII spellings. The estimate is for budgeting only and is not tied
//! to any model tokenizer.

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count for a string: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// The number of characters a token budget allows.
pub fn chars_for_tokens(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN)
}

/// Byte offset of the `n`-th character, or the string length if shorter.
pub fn byte_offset_of_char(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}
