//! Fold per-chunk proposals into one document-level proposal.
//!
//! The fold is commutative and associative under these rules, which is what
//! lets a parallel chunk pass produce the same document proposal as a
//! sequential one:
//!
//! - collections are keyed by lowercased name; first sight inserts the
//!   entry, repeats union evidence (deduplicated by `(chunk_id, quote)`,
//!   sorted) and upgrade the description only when strictly longer;
//! - diverging `domain`/`range`/`actors` between occurrences keep the
//!   first-seen values and record a conflict warning;
//! - aliases dedup by sorted name tuple, reuse hints by
//!   `(proposed, reuse)`, warnings as a deduplicated list;
//! - every output collection is sorted (entries by key, aliases by joined
//!   names) so the result is deterministic.

use crate::card::{
    merge_description, name_key, push_warning, union_evidence, AliasEntry,
};
use crate::proposal::{
    ChunkProposal, ClassProposal, DocumentProposal, EventProposal, PropertyProposal,
    ProposedAdditions, ReuseHint,
};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

pub fn aggregate_proposals(document_id: &str, proposals: &[ChunkProposal]) -> DocumentProposal {
    let mut classes: BTreeMap<String, ClassProposal> = BTreeMap::new();
    let mut datatype_properties: BTreeMap<String, PropertyProposal> = BTreeMap::new();
    let mut object_properties: BTreeMap<String, PropertyProposal> = BTreeMap::new();
    let mut events: BTreeMap<String, EventProposal> = BTreeMap::new();
    let mut aliases: BTreeMap<Vec<String>, AliasEntry> = BTreeMap::new();
    let mut hints: BTreeMap<(String, String), ReuseHint> = BTreeMap::new();
    let mut warnings: Vec<String> = Vec::new();

    for proposal in proposals {
        for class in &proposal.proposed_additions.classes {
            if class.name.is_empty() {
                continue;
            }
            match classes.entry(name_key(&class.name)) {
                Entry::Vacant(slot) => {
                    slot.insert(class.clone());
                }
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    union_evidence(&mut existing.evidence, &class.evidence);
                    merge_description(&mut existing.description, &class.description);
                    if existing.origin.is_none() {
                        existing.origin = class.origin.clone();
                    }
                }
            }
        }

        fold_properties(
            &mut datatype_properties,
            &proposal.proposed_additions.datatype_properties,
            "datatype property",
            &mut warnings,
        );
        fold_properties(
            &mut object_properties,
            &proposal.proposed_additions.object_properties,
            "object property",
            &mut warnings,
        );

        for event in &proposal.proposed_additions.events {
            if event.name.is_empty() {
                continue;
            }
            match events.entry(name_key(&event.name)) {
                Entry::Vacant(slot) => {
                    slot.insert(event.clone());
                }
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    if existing.actors != event.actors {
                        push_warning(
                            &mut warnings,
                            format!(
                                "event {}: conflicting actors (kept [{}], saw [{}])",
                                existing.name,
                                existing.actors.join(", "),
                                event.actors.join(", ")
                            ),
                        );
                    }
                    union_evidence(&mut existing.evidence, &event.evidence);
                    if existing.origin.is_none() {
                        existing.origin = event.origin.clone();
                    }
                }
            }
        }

        for alias in &proposal.alias_or_merge_suggestions {
            aliases.entry(alias.sorted_names()).or_insert_with(|| alias.clone());
        }
        for hint in &proposal.reuse_instead_of_create {
            hints
                .entry((hint.proposed.clone(), hint.reuse.clone()))
                .or_insert_with(|| hint.clone());
        }
        for warning in &proposal.warnings {
            push_warning(&mut warnings, warning.clone());
        }
    }

    // Sort evidence on first-seen entries too, so the output never encodes
    // arrival order.
    for class in classes.values_mut() {
        class.evidence.sort();
        class.evidence.dedup();
    }
    for prop in datatype_properties
        .values_mut()
        .chain(object_properties.values_mut())
    {
        prop.evidence.sort();
        prop.evidence.dedup();
    }
    for event in events.values_mut() {
        event.evidence.sort();
        event.evidence.dedup();
    }
    warnings.sort();
    warnings.dedup();

    DocumentProposal {
        document_id: document_id.to_string(),
        chunk_count: proposals.len(),
        proposed_additions: ProposedAdditions {
            classes: classes.into_values().collect(),
            datatype_properties: datatype_properties.into_values().collect(),
            object_properties: object_properties.into_values().collect(),
            events: events.into_values().collect(),
        },
        reuse_instead_of_create: hints.into_values().collect(),
        alias_or_merge_suggestions: aliases.into_values().collect(),
        warnings,
    }
}

fn fold_properties(
    map: &mut BTreeMap<String, PropertyProposal>,
    incoming: &[PropertyProposal],
    kind: &str,
    warnings: &mut Vec<String>,
) {
    for prop in incoming {
        if prop.name.is_empty() {
            continue;
        }
        match map.entry(name_key(&prop.name)) {
            Entry::Vacant(slot) => {
                slot.insert(prop.clone());
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.domain != prop.domain {
                    push_warning(
                        warnings,
                        format!(
                            "{kind} {}: conflicting domain (kept '{}', saw '{}')",
                            existing.name, existing.domain, prop.domain
                        ),
                    );
                }
                if existing.range != prop.range {
                    push_warning(
                        warnings,
                        format!(
                            "{kind} {}: conflicting range (kept '{}', saw '{}')",
                            existing.name, existing.range, prop.range
                        ),
                    );
                }
                union_evidence(&mut existing.evidence, &prop.evidence);
                merge_description(&mut existing.description, &prop.description);
                if existing.origin.is_none() {
                    existing.origin = prop.origin.clone();
                }
            }
        }
    }
}
