//! Common types for search module

use serde::{Serialize, Serializer};

use super::catalog::Record;
use super::embedder::truncate_chars;

/// Appended to descriptions clipped to the configured length
pub const TRUNCATION_MARKER: &str = "...";

/// Cascade stage that produced a result set
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    /// Exact primary code
    Code,
    /// Exact title, case-insensitive
    Title,
    /// Exact division, subdivision or group code
    Hierarchy,
    /// Nearest neighbors by embedding similarity
    Vector,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Code => "code",
            MatchTier::Title => "title",
            MatchTier::Hierarchy => "hierarchy",
            MatchTier::Vector => "vector",
        }
    }

    pub fn is_exact(&self) -> bool {
        !matches!(self, MatchTier::Vector)
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ranked match
/// Serializes as `{Title_Code, Title, Score: "87%", Description}`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MatchResult {
    #[serde(rename = "Title_Code")]
    pub code: String,
    #[serde(rename = "Title")]
    pub title: String,
    /// Similarity as a rounded integer percent
    #[serde(rename = "Score", serialize_with = "serialize_percent")]
    pub score: i32,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(skip)]
    pub tier: MatchTier,
}

impl MatchResult {
    pub fn from_record(
        record: &Record,
        similarity: f32,
        tier: MatchTier,
        description_limit: usize,
    ) -> Self {
        Self {
            code: record.code().to_string(),
            title: record.title().to_string(),
            score: score_percent(similarity),
            description: truncate_description(record.description(), description_limit),
            tier,
        }
    }

    /// Score rendered the way callers display it, e.g. `"87%"`
    pub fn score_label(&self) -> String {
        format!("{}%", self.score)
    }
}

fn serialize_percent<S: Serializer>(score: &i32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{score}%"))
}

/// `round(similarity * 100)`, not clamped
pub fn score_percent(similarity: f32) -> i32 {
    (similarity * 100.0).round() as i32
}

/// Keep the first `limit` characters, marking the cut when one happens
pub fn truncate_description(text: &str, limit: usize) -> String {
    let clipped = truncate_chars(text, limit);
    if clipped.len() < text.len() {
        format!("{clipped}{TRUNCATION_MARKER}")
    } else {
        text.to_string()
    }
}

/// Results of one query, with the tier that produced them
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// The trimmed query
    pub query: String,
    pub tier: MatchTier,
    pub results: Vec<MatchResult>,
    pub count: usize,
}

impl SearchOutcome {
    pub fn new(query: String, tier: MatchTier, results: Vec<MatchResult>) -> Self {
        Self {
            query,
            tier,
            count: results.len(),
            results,
        }
    }

    pub fn top_code(&self) -> Option<&str> {
        self.results.first().map(|r| r.code.as_str())
    }
}
