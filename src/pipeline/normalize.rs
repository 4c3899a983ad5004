// src/pipeline/normalize.rs

//! Text normalization and content hashing for duplicate detection.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Lowercase, strip punctuation, and collapse whitespace.
///
/// Punctuation goes first so that `"a - b"` becomes `"a b"` and not `"a  b"`.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep the `YYYY-MM-DD` prefix of a date or datetime string.
pub fn normalize_date(date: &str) -> String {
    date.trim().chars().take(10).collect()
}

/// SHA-256 (lowercase hex) over already-normalized title, date, and city.
pub fn content_hash(title: &str, date: &str, city: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{title}|{date}|{city}").as_bytes());
    hex::encode(hasher.finalize())
}
