//! Verdict vocabulary and parsing.
//!
//! Evaluator output is advisory text. It is parsed against a fixed,
//! case-insensitive vocabulary; anything else is treated as unparseable
//! and handled conservatively by the retry policy, never as approval.

use serde::{Deserialize, Serialize};

/// Three-way outcome of a domain evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Result accepted; advance to the next domain
    Approved,

    /// Result rejected; re-run the same domain if budget remains
    Retry,

    /// Result rejected terminally
    Failed,
}

impl Verdict {
    /// Token this verdict is written as in evaluator output
    pub fn token(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Retry => "RETRY",
            Self::Failed => "FAILED",
        }
    }

    /// Parse evaluator text against the fixed vocabulary.
    ///
    /// Evaluators are instructed to answer with the verdict token first,
    /// so when a rationale mentions several tokens the earliest
    /// occurrence wins. Matching is case-insensitive on whole words.
    /// Returns `None` when no token is present.
    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();

        let mut best: Option<(usize, Verdict)> = None;
        for verdict in [Self::Approved, Self::Retry, Self::Failed] {
            if let Some(pos) = find_word(&upper, verdict.token()) {
                if best.map(|(p, _)| pos < p).unwrap_or(true) {
                    best = Some((pos, verdict));
                }
            }
        }

        best.map(|(_, v)| v)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Find `word` in `haystack` at a word boundary (ASCII alphanumerics and
/// `_` count as word characters).
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    let mut from = 0;
    while let Some(rel) = haystack[from..].find(word) {
        let pos = from + rel;
        let end = pos + word.len();

        let left_ok = pos == 0 || !is_word(bytes[pos - 1]);
        let right_ok = end == bytes.len() || !is_word(bytes[end]);

        if left_ok && right_ok {
            return Some(pos);
        }
        from = pos + 1;
    }

    None
}
