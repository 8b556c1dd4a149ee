//! Lexical normalization shared by every matching step.
//!
//! Two canonical forms are used throughout Shelfmark:
//!
//! - **Normalized text** ([`normalize`]) - lowercase ASCII letters and digits
//!   separated by single spaces. Used for corpus lookup, category scoring,
//!   keyword extraction, and lexical fallback ranking.
//! - **Tag slugs** ([`slugify_tag`]) - lowercase, hyphen-joined tokens. Every
//!   tag stored in the mapping cache is in slug form.
//!
//! ```rust
//! use shelfmark_core::normalize::{normalize, slugify_tag};
//!
//! assert_eq!(normalize("  The Hobbit: There & Back!  "), "the hobbit there back");
//! assert_eq!(slugify_tag("Science Fiction"), "science-fiction");
//! ```

use std::collections::HashSet;

/// Words dropped from keyword extraction.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "with", "by", "from", "book",
    "novel", "guide", "edition", "author", "unknown",
];

/// Upper bound on keywords returned by [`keywords`].
pub const MAX_KEYWORDS: usize = 8;

/// Case-fold, replace everything except `[a-z0-9]` and whitespace with a
/// space, collapse whitespace runs and trim.
pub fn normalize(s: &str) -> String {
    let lowered = s.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Canonicalize a tag into slug form: lowercase, `[a-z0-9-]` only, runs of
/// whitespace become a single hyphen, repeated hyphens collapse.
///
/// Returns an empty string for tags with no usable characters.
pub fn slugify_tag(tag: &str) -> String {
    let lowered = tag.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        let mapped = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '-'
        };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Tokens of a slug (or any hyphenated tag) after normalization.
pub fn tag_tokens(tag: &str) -> Vec<String> {
    normalize(&tag.replace('-', " "))
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Distinct whitespace tokens of already-normalized text, in first-seen order.
pub fn distinct_tokens(normalized: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    normalized
        .split_whitespace()
        .filter(|t| seen.insert(*t))
        .collect()
}

/// Alphabetical bucket label for an author, e.g. `"Author M-O"`.
///
/// Expects normalized input; anything not starting with `a`–`z` lands in
/// `"Author Other"`.
pub fn author_bucket(author_norm: &str) -> &'static str {
    match author_norm.chars().next() {
        Some('a'..='c') => "Author A-C",
        Some('d'..='f') => "Author D-F",
        Some('g'..='i') => "Author G-I",
        Some('j'..='l') => "Author J-L",
        Some('m'..='o') => "Author M-O",
        Some('p'..='r') => "Author P-R",
        Some('s'..='u') => "Author S-U",
        Some('v'..='z') => "Author V-Z",
        _ => "Author Other",
    }
}

/// Extract ranking keywords from a title and author.
///
/// Tokens shorter than three characters and stop-words are dropped; the
/// result is deduplicated in first-seen order and capped at
/// [`MAX_KEYWORDS`].
pub fn keywords(title: &str, author: &str) -> Vec<String> {
    let text = normalize(&format!("{} {}", title, author));
    let mut out: Vec<String> = Vec::new();
    for word in text.split(' ') {
        if word.len() < 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        if out.iter().any(|w| w == word) {
            continue;
        }
        out.push(word.to_string());
        if out.len() >= MAX_KEYWORDS {
            break;
        }
    }
    out
}

/// Count how many distinct tokens of `candidate` occur as substrings of the
/// normalized query. Hyphens in the candidate act as separators.
pub fn overlap_score(query_norm: &str, candidate: &str) -> usize {
    if query_norm.is_empty() {
        return 0;
    }
    let cand = normalize(&candidate.replace('-', " "));
    distinct_tokens(&cand)
        .into_iter()
        .filter(|t| query_norm.contains(t))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_collapses() {
        assert_eq!(normalize("Hello,   World!!"), "hello world");
        assert_eq!(normalize("  ...  "), "");
        assert_eq!(normalize("Café Society"), "caf society");
    }

    #[test]
    fn test_slugify_tag() {
        assert_eq!(slugify_tag("  New Zealand "), "new-zealand");
        assert_eq!(slugify_tag("sci--fi"), "sci-fi");
        assert_eq!(slugify_tag("Self/Help"), "self-help");
        assert_eq!(slugify_tag("!!!"), "");
    }

    #[test]
    fn test_author_bucket_ranges() {
        assert_eq!(author_bucket("adam brown"), "Author A-C");
        assert_eq!(author_bucket("quinn harper"), "Author P-R");
        assert_eq!(author_bucket("zed"), "Author V-Z");
        assert_eq!(author_bucket(""), "Author Other");
        assert_eq!(author_bucket("9lives"), "Author Other");
    }

    #[test]
    fn test_keywords_filters_and_caps() {
        let kws = keywords("The Great Adventure of the Book", "Jane Doe");
        assert_eq!(kws, vec!["great", "adventure", "jane", "doe"]);

        let many = keywords(
            "alpha bravo charlie delta echo foxtrot golf hotel india juliet",
            "",
        );
        assert_eq!(many.len(), MAX_KEYWORDS);
    }

    #[test]
    fn test_overlap_score_counts_distinct_tokens() {
        let q = normalize("Mystery at Milford Sound");
        assert_eq!(overlap_score(&q, "mystery-thriller"), 1);
        assert_eq!(overlap_score(&q, "sound-sound"), 1);
        assert_eq!(overlap_score("", "mystery"), 0);
    }
}
