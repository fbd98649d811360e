//! Typed records for the per-chunk LLM output contract.
//!
//! The model returns free-form JSON; these types validate it at the
//! boundary so downstream code never sees untyped maps. Missing keys
//! default to empty collections, unknown keys are tolerated and ignored,
//! and evidence quotes are clamped to the 25-word bound on entry.

use crate::card::AliasEntry;
use anyhow::{bail, Result};
use ontorag_dto::{clamp_quote, EvidenceRef};
use serde::{Deserialize, Serialize};

// ============================================================================
// Per-chunk proposal (LLM output, §"proposal JSON schema")
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkProposal {
    #[serde(default)]
    pub chunk_id: String,
    #[serde(default)]
    pub proposed_additions: ProposedAdditions,
    #[serde(default)]
    pub reuse_instead_of_create: Vec<ReuseHint>,
    #[serde(default)]
    pub alias_or_merge_suggestions: Vec<AliasEntry>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedAdditions {
    #[serde(default)]
    pub classes: Vec<ClassProposal>,
    #[serde(default)]
    pub datatype_properties: Vec<PropertyProposal>,
    #[serde(default)]
    pub object_properties: Vec<PropertyProposal>,
    #[serde(default)]
    pub events: Vec<EventProposal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassProposal {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Set by the baseline importer to the catalog id; absent on LLM
    /// proposals (the merger then tags new entries `induced`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

/// Shared shape for datatype and object property proposals. For datatype
/// properties `range` is a literal-range string normalized at merge time;
/// for object properties it names a class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyProposal {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventProposal {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReuseHint {
    #[serde(default)]
    pub proposed: String,
    #[serde(default)]
    pub reuse: String,
    #[serde(default)]
    pub rationale: String,
}

impl ChunkProposal {
    /// Validate a raw LLM response value and convert it to typed records.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            bail!("proposal must be a JSON object");
        }
        if let Some(additions) = value.get("proposed_additions") {
            if !additions.is_object() && !additions.is_null() {
                bail!("proposed_additions must be a JSON object");
            }
        }
        let mut proposal: ChunkProposal = serde_json::from_value(value)?;
        proposal.sanitize();
        Ok(proposal)
    }

    fn sanitize(&mut self) {
        for class in &mut self.proposed_additions.classes {
            class.name = class.name.trim().to_string();
            clamp_evidence(&mut class.evidence);
        }
        for prop in self
            .proposed_additions
            .datatype_properties
            .iter_mut()
            .chain(self.proposed_additions.object_properties.iter_mut())
        {
            prop.name = prop.name.trim().to_string();
            prop.domain = prop.domain.trim().to_string();
            prop.range = prop.range.trim().to_string();
            clamp_evidence(&mut prop.evidence);
        }
        for event in &mut self.proposed_additions.events {
            event.name = event.name.trim().to_string();
            clamp_evidence(&mut event.evidence);
        }
    }
}

fn clamp_evidence(evidence: &mut [EvidenceRef]) {
    for e in evidence {
        e.quote = clamp_quote(&e.quote);
    }
}

// ============================================================================
// Document-level proposal (aggregator output)
// ============================================================================

/// One document's fused proposal: the same shape as a chunk proposal, minus
/// `chunk_id`, plus the aggregator-added `document_id` and `chunk_count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentProposal {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub proposed_additions: ProposedAdditions,
    #[serde(default)]
    pub reuse_instead_of_create: Vec<ReuseHint>,
    #[serde(default)]
    pub alias_or_merge_suggestions: Vec<AliasEntry>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl DocumentProposal {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}
