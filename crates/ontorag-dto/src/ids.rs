//! Deterministic content ids for documents and chunks.
//!
//! Both ids are 40 lowercase hex digits: SHA-256 of the identifying bytes,
//! truncated. The functions are pure: identical inputs always produce
//! identical ids, which is the replay guarantee the rest of the pipeline
//! builds on.
//!
//! - `document_id` hashes the source-path bytes.
//! - `chunk_id` hashes `{document_id}{index}{text}` with the index in
//!   decimal.

use sha2::{Digest, Sha256};

/// Width of every persistent id, in hex digits.
pub const ID_HEX_LEN: usize = 40;

fn digest_40_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..ID_HEX_LEN].to_string()
}

/// Id of a document, derived from its source path.
pub fn document_id(source_path: &str) -> String {
    digest_40_hex(source_path.as_bytes())
}

/// Id of a chunk, derived from its document id, position, and text.
pub fn chunk_id(document_id: &str, index: usize, text: &str) -> String {
    digest_40_hex(format!("{document_id}{index}{text}").as_bytes())
}
