//! Document and chunk DTOs for OntoRAG.
//!
//! A DTO is a frozen, serializable record of a document or chunk with
//! identity and provenance. Identity is content-addressed: regenerating the
//! DTOs from identical inputs yields identical ids, which is what makes an
//! extraction run replayable.
//!
//! Output artifacts:
//! - `documents/{document_id}.json`: one `DocumentDto` per document
//! - `chunks/{document_id}.jsonl`: one `ChunkDto` per line (append-only)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod ids;
pub mod loader;
pub mod store;

pub use ids::{chunk_id, document_id};
pub use loader::{load_document, DocumentFormat, LoadedDocument};
pub use store::ChunkStore;

/// Maximum number of whitespace-separated words retained in an evidence
/// quote.
pub const MAX_QUOTE_WORDS: usize = 25;

// ============================================================================
// Provenance
// ============================================================================

/// Where a chunk came from inside its source document.
///
/// `page` is 1-based when present. `char_range` is a `[start, end)` pair of
/// character offsets into the source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_range: Option<(usize, usize)>,
}

// ============================================================================
// DTOs
// ============================================================================

/// One extracted chunk, with identity and provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDto {
    pub chunk_id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
    pub provenance: Provenance,
}

/// One ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDto {
    pub document_id: String,
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub chunk_count: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

// ============================================================================
// Evidence
// ============================================================================

/// A pointer from a proposed element back to its source: the chunk it was
/// extracted from plus a verbatim quote (at most [`MAX_QUOTE_WORDS`] words).
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EvidenceRef {
    pub chunk_id: String,
    pub quote: String,
}

impl EvidenceRef {
    pub fn new(chunk_id: &str, quote: &str) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            quote: clamp_quote(quote),
        }
    }
}

/// Trim a quote and cut it down to [`MAX_QUOTE_WORDS`] words.
pub fn clamp_quote(quote: &str) -> String {
    let words: Vec<&str> = quote.split_whitespace().collect();
    if words.len() <= MAX_QUOTE_WORDS {
        return quote.trim().to_string();
    }
    words[..MAX_QUOTE_WORDS].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_short_quotes_verbatim() {
        assert_eq!(clamp_quote("  Alice is a person  "), "Alice is a person");
    }

    #[test]
    fn clamp_cuts_long_quotes_to_25_words() {
        let long = (0..40).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let clamped = clamp_quote(&long);
        assert_eq!(clamped.split_whitespace().count(), MAX_QUOTE_WORDS);
        assert!(clamped.starts_with("w0 w1"));
        assert!(clamped.ends_with("w24"));
    }

    #[test]
    fn chunk_dto_round_trips_through_json() {
        let chunk = ChunkDto {
            chunk_id: "c".repeat(40),
            document_id: "d".repeat(40),
            index: 3,
            text: "Alice is a person.".to_string(),
            provenance: Provenance {
                source_path: "docs/people.md".to_string(),
                page: None,
                section: Some("People".to_string()),
                char_range: Some((10, 28)),
            },
        };
        let json = serde_json::to_string(&chunk).expect("serialize");
        let back: ChunkDto = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, chunk);
    }
}
