//! Pattern-based extraction of phone numbers and email addresses.
//!
//! Both extractors return the literal matched substrings in order of
//! appearance. Duplicates are kept; every occurrence is persisted
//! independently downstream.

use regex::Regex;
use std::sync::LazyLock;

// =============================================================================
// Compiled patterns (compiled once, reused across calls)
// =============================================================================

/// Russian phone number surface forms, tried leftmost-first in this order.
const PHONE_ALTERNATIVES: &[&str] = &[
    r"\+?7[ -]?\(?\d{3}\)?[ -]?\d{3}[ -]?\d{2}[ -]?\d{2}",
    r"\+?7[ -]?\d{10}",
    r"\+?7[ -]?\d{3}[ -]?\d{3}[ -]?\d{4}",
    r"8[ -]?\(?\d{3}\)?[ -]?\d{3}[ -]?\d{2}[ -]?\d{2}",
    r"8[ -]?\d{10}",
    r"8[ -]?\d{3}[ -]?\d{3}[ -]?\d{4}",
];

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&PHONE_ALTERNATIVES.join("|")).expect("Invalid phone regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"\b[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+(?:\.[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+)*"#,
        r"@(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}\b",
    ))
    .expect("Invalid email regex")
});

/// Ordered raw matches from one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionCandidateSet(Vec<String>);

impl ExtractionCandidateSet {
    pub fn new(candidates: Vec<String>) -> Self {
        Self(candidates)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Render as a numbered list, one candidate per line.
    pub fn numbered(&self) -> String {
        self.0
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<String> for ExtractionCandidateSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ExtractionCandidateSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Find Russian-format phone numbers (`+7`, `7` or `8` prefix) in `text`.
pub fn extract_phone_numbers(text: &str) -> ExtractionCandidateSet {
    find_all(&PHONE_RE, text)
}

/// Find email addresses in `text`.
pub fn extract_emails(text: &str) -> ExtractionCandidateSet {
    find_all(&EMAIL_RE, text)
}

fn find_all(re: &Regex, text: &str) -> ExtractionCandidateSet {
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}
