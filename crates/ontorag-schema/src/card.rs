//! The Schema Card: a set of named value tables (classes, properties,
//! events, aliases) joined by name keys rather than pointers.
//!
//! Keeping the card as flat tables makes serialization, equality-based
//! deduplication, and byte-deterministic merging straightforward. The
//! uniqueness key everywhere is the lowercased trimmed name.

use anyhow::{Context, Result};
use ontorag_dto::EvidenceRef;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Namespace used to mint class/property URIs when none is configured.
pub const DEFAULT_NAMESPACE: &str = "http://ontorag.local/ns/";

/// Origin tag for elements first introduced by an LLM proposal.
pub const ORIGIN_INDUCED: &str = "induced";

/// Case-insensitive uniqueness key for class/property/event names.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// Datatype ranges
// ============================================================================

/// The closed set of literal ranges a datatype property may declare.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DatatypeRange {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "dateTime")]
    DateTime,
    #[serde(rename = "anyURI")]
    AnyUri,
}

impl DatatypeRange {
    /// Normalize a free-form range string (from a proposal or an imported
    /// ontology). Returns `None` when the range is outside the supported
    /// set; callers coerce to `String` and record a warning.
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "str" | "text" | "string" => Some(Self::String),
            "int" | "integer" => Some(Self::Integer),
            "float" | "number" | "decimal" => Some(Self::Decimal),
            "bool" | "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "datetime" | "timestamp" => Some(Self::DateTime),
            "url" | "uri" | "anyuri" => Some(Self::AnyUri),
            _ => None,
        }
    }

    /// The XSD local name (`string`, `integer`, ..., `anyURI`).
    pub fn xsd_local(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "dateTime",
            Self::AnyUri => "anyURI",
        }
    }
}

impl Default for DatatypeRange {
    fn default() -> Self {
        Self::String
    }
}

// ============================================================================
// Card entries
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatatypePropertyEntry {
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub range: DatatypeRange,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPropertyEntry {
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub name: String,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

/// A merge/alias suggestion over a set of names. Deduplicated by the sorted
/// tuple of names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub rationale: String,
}

impl AliasEntry {
    /// Sorted-name-tuple identity used for deduplication.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names = self.names.clone();
        names.sort();
        names
    }
}

// ============================================================================
// The card
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCard {
    /// ISO-8601 UTC timestamp, strictly increasing across merges. Empty on
    /// a card that has never been merged into.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub classes: Vec<ClassEntry>,
    #[serde(default)]
    pub datatype_properties: Vec<DatatypePropertyEntry>,
    #[serde(default)]
    pub object_properties: Vec<ObjectPropertyEntry>,
    #[serde(default)]
    pub events: Vec<EventEntry>,
    #[serde(default)]
    pub aliases: Vec<AliasEntry>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl SchemaCard {
    pub fn empty(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }

    /// Look up a class by its case-insensitive key.
    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        let key = name_key(name);
        self.classes.iter().find(|c| name_key(&c.name) == key)
    }

    /// Look up a datatype property by its case-insensitive key.
    pub fn datatype_property(&self, name: &str) -> Option<&DatatypePropertyEntry> {
        let key = name_key(name);
        self.datatype_properties
            .iter()
            .find(|p| name_key(&p.name) == key)
    }

    /// Look up an object property by its case-insensitive key.
    pub fn object_property(&self, name: &str) -> Option<&ObjectPropertyEntry> {
        let key = name_key(name);
        self.object_properties
            .iter()
            .find(|p| name_key(&p.name) == key)
    }

    /// Canonical JSON encoding: pretty-printed with sorted object keys.
    /// Two equal cards serialize to byte-identical text.
    pub fn to_canonical_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema card {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("failed to parse schema card {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut text = self.to_canonical_json()?;
        text.push('\n');
        std::fs::write(path, text)
            .with_context(|| format!("failed to write schema card {}", path.display()))
    }
}

// ============================================================================
// Merge helpers shared by the aggregator and the merger
// ============================================================================

/// Union evidence lists, deduplicating by `(chunk_id, quote)`. The result
/// is sorted so evidence order never depends on arrival order.
pub fn union_evidence(existing: &mut Vec<EvidenceRef>, incoming: &[EvidenceRef]) {
    existing.extend(incoming.iter().cloned());
    existing.sort();
    existing.dedup();
}

/// Longer-wins description merge; ties keep the current text.
pub fn merge_description(current: &mut String, candidate: &str) {
    if candidate.chars().count() > current.chars().count() {
        *current = candidate.to_string();
    }
}

/// Append the members of `incoming` that are not yet present, preserving
/// first-seen order.
pub fn union_ordered(existing: &mut Vec<String>, incoming: &[String]) {
    for item in incoming {
        if !existing.contains(item) {
            existing.push(item.clone());
        }
    }
}

/// Append a warning unless an identical one is already recorded.
pub fn push_warning(warnings: &mut Vec<String>, warning: String) {
    if !warnings.iter().any(|w| w == &warning) {
        warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_normalization_table() {
        for (raw, expected) in [
            ("str", DatatypeRange::String),
            ("text", DatatypeRange::String),
            ("string", DatatypeRange::String),
            ("int", DatatypeRange::Integer),
            ("integer", DatatypeRange::Integer),
            ("float", DatatypeRange::Decimal),
            ("number", DatatypeRange::Decimal),
            ("bool", DatatypeRange::Boolean),
            ("date", DatatypeRange::Date),
            ("datetime", DatatypeRange::DateTime),
            ("timestamp", DatatypeRange::DateTime),
            ("dateTime", DatatypeRange::DateTime),
            ("url", DatatypeRange::AnyUri),
            ("uri", DatatypeRange::AnyUri),
            ("anyURI", DatatypeRange::AnyUri),
        ] {
            assert_eq!(DatatypeRange::normalize(raw), Some(expected), "raw={raw}");
        }
        assert_eq!(DatatypeRange::normalize("xyz"), None);
        assert_eq!(DatatypeRange::normalize(""), None);
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let card = SchemaCard::empty(DEFAULT_NAMESPACE);
        let json = card.to_canonical_json().expect("canonical json");
        let aliases = json.find("\"aliases\"").expect("aliases key");
        let version = json.find("\"version\"").expect("version key");
        assert!(aliases < version);
    }

    #[test]
    fn union_evidence_sorts_and_dedups() {
        let mut evidence = vec![EvidenceRef::new("c2", "beta")];
        union_evidence(
            &mut evidence,
            &[EvidenceRef::new("c1", "alpha"), EvidenceRef::new("c2", "beta")],
        );
        assert_eq!(
            evidence,
            vec![EvidenceRef::new("c1", "alpha"), EvidenceRef::new("c2", "beta")]
        );
    }

    #[test]
    fn description_merge_is_longer_wins_with_prior_ties() {
        let mut desc = "short".to_string();
        merge_description(&mut desc, "other"); // same length, prior wins
        assert_eq!(desc, "short");
        merge_description(&mut desc, "much longer text");
        assert_eq!(desc, "much longer text");
        merge_description(&mut desc, "tiny");
        assert_eq!(desc, "much longer text");
    }
}
