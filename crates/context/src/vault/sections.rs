//! Splitting the vault into sections.
//!
//! Strategies are tried in priority order: separator runs, markdown headers,
//! document/file markers. A structural strategy is used only when its markers
//! exist and at least one resulting section is longer than
//! `min_section_chars`. Otherwise paragraphs are merged into sections of at
//! least `min_paragraph_chars`, and as a last resort the text is chunked at
//! safe boundaries. Non-empty text always yields at least one section.

use crate::budget::truncate_at_boundary;
use crate::token::estimate_tokens;
use factlayer_config::VaultConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Lines made of three or more `=`.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*={3,}[ \t]*$").expect("SEPARATOR_RE regex should compile"));

/// Markdown ATX headers.
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+\S.*$").expect("HEADER_RE regex should compile"));

/// `[DOCUMENT: x]`, `[FILE: x]`, `[FOLDER: x]`, or `File: x` style lines.
pub(crate) static DOC_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*(?:\[(?:document|file|folder)[ \t]*:[^\]\n]*\]|(?:document|file|folder|directory|path|source)[ \t]*:[ \t]*\S.*)$",
    )
    .expect("DOC_MARKER_RE regex should compile")
});

static BLANK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("BLANK_LINE_RE regex should compile"));

/// How the vault was split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    Separator,
    Header,
    DocumentMarker,
    Paragraph,
    FixedChunk,
}

/// A raw slice before indexing.
struct Piece<'a> {
    text: &'a str,
    title: Option<String>,
    has_header: bool,
}

/// Split the vault into sections.
pub fn split_sections(text: &str, config: &VaultConfig) -> (Vec<super::VaultSection>, Option<SplitStrategy>) {
    if text.trim().is_empty() {
        return (Vec::new(), None);
    }

    let structural: [(SplitStrategy, fn(&str) -> Option<Vec<Piece<'_>>>); 3] = [
        (SplitStrategy::Separator, split_on_separators),
        (SplitStrategy::Header, split_on_headers),
        (SplitStrategy::DocumentMarker, split_on_markers),
    ];
    for (strategy, split) in structural {
        if let Some(pieces) = split(text) {
            if pieces.iter().any(|p| p.text.chars().count() > config.min_section_chars) {
                return (index(pieces), Some(strategy));
            }
        }
    }

    let paragraphs = split_paragraphs(text, config.min_paragraph_chars);
    if paragraphs.len() > 1 {
        return (index(paragraphs), Some(SplitStrategy::Paragraph));
    }

    (index(split_chunks(text, config)), Some(SplitStrategy::FixedChunk))
}

fn index(pieces: Vec<Piece<'_>>) -> Vec<super::VaultSection> {
    pieces
        .into_iter()
        .filter(|p| !p.text.trim().is_empty())
        .enumerate()
        .map(|(index, p)| {
            let content = p.text.trim().to_string();
            super::VaultSection {
                index,
                title: p.title,
                tokens: estimate_tokens(&content),
                has_header: p.has_header || HEADER_RE.is_match(&content),
                content,
            }
        })
        .collect()
}

fn split_on_separators(text: &str) -> Option<Vec<Piece<'_>>> {
    if !SEPARATOR_RE.is_match(text) {
        return None;
    }
    Some(
        SEPARATOR_RE
            .split(text)
            .map(|chunk| Piece {
                text: chunk,
                title: first_line_title(chunk),
                has_header: false,
            })
            .collect(),
    )
}

fn split_on_headers(text: &str) -> Option<Vec<Piece<'_>>> {
    split_before(text, &HEADER_RE)
}

fn split_on_markers(text: &str) -> Option<Vec<Piece<'_>>> {
    split_before(text, &DOC_MARKER_RE)
}

/// Start a new piece at every line matching `re`.
fn split_before<'a>(text: &'a str, re: &Regex) -> Option<Vec<Piece<'a>>> {
    let starts: Vec<usize> = re.find_iter(text).map(|m| m.start()).collect();
    if starts.is_empty() {
        return None;
    }
    let mut bounds = Vec::with_capacity(starts.len() + 2);
    if starts[0] > 0 {
        bounds.push(0);
    }
    bounds.extend(starts.iter().copied());
    bounds.push(text.len());

    Some(
        bounds
            .windows(2)
            .map(|w| {
                let chunk = &text[w[0]..w[1]];
                let opener = re.find(chunk).filter(|m| m.start() == 0 || chunk[..m.start()].trim().is_empty());
                Piece {
                    text: chunk,
                    title: opener.map(|m| m.as_str().trim().trim_start_matches('#').trim().to_string()),
                    has_header: opener.is_some_and(|m| m.as_str().trim_start().starts_with('#')),
                }
            })
            .collect(),
    )
}

/// Merge blank-line separated paragraphs until each piece exceeds `min_chars`.
fn split_paragraphs(text: &str, min_chars: usize) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut start: Option<usize> = None;
    let mut cursor = 0;
    for m in BLANK_LINE_RE.find_iter(text) {
        let begin = *start.get_or_insert(cursor);
        let candidate = &text[begin..m.start()];
        if candidate.trim().chars().count() > min_chars {
            pieces.push(Piece {
                text: candidate,
                title: first_line_title(candidate),
                has_header: false,
            });
            start = None;
        }
        cursor = m.end();
    }
    let tail_begin = start.unwrap_or(cursor);
    let tail = &text[tail_begin..];
    if !tail.trim().is_empty() {
        pieces.push(Piece {
            text: tail,
            title: first_line_title(tail),
            has_header: false,
        });
    }
    pieces
}

/// Fixed-size chunks cut at safe boundaries.
fn split_chunks<'a>(text: &'a str, config: &VaultConfig) -> Vec<Piece<'a>> {
    let chunk_tokens = config.chunk_chars.div_ceil(crate::token::CHARS_PER_TOKEN).max(1);
    let mut pieces = Vec::new();
    let mut rest = text.trim_start();
    while !rest.trim().is_empty() {
        let taken = truncate_at_boundary(rest, chunk_tokens, config.sentence_boundary_ratio);
        // The truncated text is always a prefix of `rest`
        let len = taken.text.len().max(rest.chars().next().map_or(1, char::len_utf8));
        let (chunk, tail) = rest.split_at(len.min(rest.len()));
        pieces.push(Piece {
            text: chunk,
            title: None,
            has_header: false,
        });
        rest = tail.trim_start();
    }
    pieces
}

fn first_line_title(chunk: &str) -> Option<String> {
    let line = chunk.trim_start().lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    let title: String = line.trim_start_matches('#').trim().chars().take(80).collect();
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VaultConfig {
        VaultConfig::default()
    }

    fn long(word: &str, n: usize) -> String {
        vec![word; n].join(" ")
    }

    #[test]
    fn empty_text_has_no_sections() {
        let (sections, strategy) = split_sections("  \n ", &config());
        assert!(sections.is_empty());
        assert!(strategy.is_none());
    }

    #[test]
    fn separators_take_priority() {
        let text = format!(
            "# Intro\n{}\n=====\n# Pricing\n{}\n=====\n{}",
            long("alpha", 30),
            long("beta", 30),
            long("gamma", 30)
        );
        let (sections, strategy) = split_sections(&text, &config());
        assert_eq!(strategy, Some(SplitStrategy::Separator));
        assert_eq!(sections.len(), 3);
        assert!(sections[1].content.starts_with("# Pricing"));
        assert!(sections[1].has_header);
        assert!(!sections[2].has_header);
    }

    #[test]
    fn headers_split_when_no_separators() {
        let text = format!("# One\n{}\n## Two\n{}\n", long("alpha", 30), long("beta", 30));
        let (sections, strategy) = split_sections(&text, &config());
        assert_eq!(strategy, Some(SplitStrategy::Header));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].title.as_deref(), Some("Two"));
    }

    #[test]
    fn preamble_before_first_header_is_kept() {
        let text = format!("{}\n# Header\n{}", long("pre", 40), long("body", 40));
        let (sections, _) = split_sections(&text, &config());
        assert_eq!(sections.len(), 2);
        assert!(sections[0].content.starts_with("pre"));
        assert!(!sections[0].has_header);
    }

    #[test]
    fn document_markers_split() {
        let text = format!(
            "[DOCUMENT: contracts/nda.md]\n{}\n[DOCUMENT: pricing.md]\n{}",
            long("clause", 30),
            long("price", 30)
        );
        let (sections, strategy) = split_sections(&text, &config());
        assert_eq!(strategy, Some(SplitStrategy::DocumentMarker));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title.as_deref(), Some("[DOCUMENT: contracts/nda.md]"));
    }

    #[test]
    fn paragraphs_used_without_markers() {
        let text = format!("{}\n\n{}\n\n{}", long("one", 60), long("two", 60), long("three", 60));
        let (sections, strategy) = split_sections(&text, &config());
        assert_eq!(strategy, Some(SplitStrategy::Paragraph));
        assert_eq!(sections.len(), 3);
        assert!(sections[2].content.starts_with("three"));
    }

    #[test]
    fn tiny_header_sections_are_not_structural() {
        let (sections, strategy) = split_sections("# a\nshort\n# b\nshort", &config());
        assert_eq!(strategy, Some(SplitStrategy::FixedChunk));
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn short_paragraphs_merge_into_one_piece() {
        let text = (0..5).map(|i| format!("Paragraph {i} is short")).collect::<Vec<_>>().join("\n\n");
        let (sections, strategy) = split_sections(&text, &config());
        assert_eq!(strategy, Some(SplitStrategy::FixedChunk));
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn paragraphs_merge_until_minimum_length() {
        let text = (0..12).map(|i| format!("Paragraph {i} is short")).collect::<Vec<_>>().join("\n\n");
        let (sections, strategy) = split_sections(&text, &config());
        assert_eq!(strategy, Some(SplitStrategy::Paragraph));
        assert_eq!(sections.len(), 2);
        assert!(sections[0].content.chars().count() > 200);
    }

    #[test]
    fn unstructured_text_is_chunked() {
        let text = long("word", 3_000); // ~15k chars, no blank lines
        let (sections, strategy) = split_sections(&text, &config());
        assert_eq!(strategy, Some(SplitStrategy::FixedChunk));
        assert!(sections.len() >= 4);
        assert!(sections.iter().all(|s| s.content.chars().count() <= 4_000));
        let rejoined: usize = sections.iter().map(|s| s.content.split_whitespace().count()).sum();
        assert_eq!(rejoined, 3_000);
    }
}
