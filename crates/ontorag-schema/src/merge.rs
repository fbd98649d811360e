//! Deterministic Schema Card merge.
//!
//! The merger is the governance gate: proposals suggest, this code decides.
//! A prior card plus one document proposal folds into a new card; inputs
//! are never mutated. For a fixed `(prior, proposal, version)` triple the
//! output serializes byte-identically: collections are keyed and sorted,
//! evidence is deduplicated and sorted, and the JSON encoding sorts keys.
//!
//! Rules:
//! - existing entries (matched case-insensitively) absorb evidence and
//!   longer descriptions; their origin never changes once set;
//! - new entries enter with `origin = "induced"` unless the proposal tags
//!   them otherwise (the baseline importer tags its catalog id);
//! - datatype ranges are normalized into the closed range set, coercing
//!   unknowns to `string` with a warning;
//! - object-property domains/ranges (and datatype-property domains) must
//!   resolve against the merged class set at the end of the pass;
//!   unresolved references warn but the property is retained;
//! - `reuse_instead_of_create` hints are never auto-applied; they become
//!   alias suggestions;
//! - structural anomalies are warnings on the card, never auto-repairs.

use crate::card::{
    merge_description, name_key, push_warning, union_evidence, union_ordered, AliasEntry,
    ClassEntry, DatatypePropertyEntry, DatatypeRange, EventEntry, ObjectPropertyEntry,
    SchemaCard, DEFAULT_NAMESPACE, ORIGIN_INDUCED,
};
use crate::proposal::DocumentProposal;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Merge with a wall-clock version stamp. The stamp is the one
/// non-deterministic field in the whole pipeline.
pub fn merge_proposal(prior: &SchemaCard, proposal: &DocumentProposal) -> SchemaCard {
    merge_proposal_at(prior, proposal, &next_version(&prior.version))
}

/// The next `version` stamp: now, in ISO-8601 UTC at second precision. If
/// the clock has not advanced past the prior version, the prior version
/// plus one second; `version` must advance strictly on every merge.
pub fn next_version(prior_version: &str) -> String {
    let candidate = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    if candidate.as_str() > prior_version {
        return candidate;
    }
    match DateTime::parse_from_rfc3339(prior_version) {
        Ok(prior) => (prior.with_timezone(&Utc) + Duration::seconds(1))
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        Err(_) => candidate,
    }
}

/// Pure merge core: fold `proposal` into `prior`, stamping `version`.
pub fn merge_proposal_at(
    prior: &SchemaCard,
    proposal: &DocumentProposal,
    version: &str,
) -> SchemaCard {
    let mut warnings = prior.warnings.clone();

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------
    let mut classes: BTreeMap<String, ClassEntry> = prior
        .classes
        .iter()
        .map(|c| (name_key(&c.name), c.clone()))
        .collect();
    for class in &proposal.proposed_additions.classes {
        if class.name.trim().is_empty() {
            push_warning(&mut warnings, "ignored class proposal with empty name".to_string());
            continue;
        }
        match classes.entry(name_key(&class.name)) {
            Entry::Vacant(slot) => {
                slot.insert(ClassEntry {
                    name: class.name.trim().to_string(),
                    description: class.description.clone(),
                    origin: proposed_origin(&class.origin),
                    evidence: class.evidence.clone(),
                });
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                union_evidence(&mut existing.evidence, &class.evidence);
                merge_description(&mut existing.description, &class.description);
                fill_origin(&mut existing.origin, &class.origin);
            }
        }
    }

    // ------------------------------------------------------------------
    // Datatype properties (ranges normalized into the closed set)
    // ------------------------------------------------------------------
    let mut datatype_properties: BTreeMap<String, DatatypePropertyEntry> = prior
        .datatype_properties
        .iter()
        .map(|p| (name_key(&p.name), p.clone()))
        .collect();
    for prop in &proposal.proposed_additions.datatype_properties {
        if prop.name.trim().is_empty() {
            push_warning(
                &mut warnings,
                "ignored datatype property proposal with empty name".to_string(),
            );
            continue;
        }
        let name = prop.name.trim().to_string();
        let range = match DatatypeRange::normalize(&prop.range) {
            Some(range) => range,
            None => {
                push_warning(
                    &mut warnings,
                    format!(
                        "datatype property {name}: unknown range '{}' coerced to string",
                        prop.range
                    ),
                );
                DatatypeRange::String
            }
        };
        match datatype_properties.entry(name_key(&name)) {
            Entry::Vacant(slot) => {
                slot.insert(DatatypePropertyEntry {
                    name,
                    domain: prop.domain.trim().to_string(),
                    range,
                    description: prop.description.clone(),
                    origin: proposed_origin(&prop.origin),
                    evidence: prop.evidence.clone(),
                });
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if name_key(&existing.domain) != name_key(&prop.domain) {
                    push_warning(
                        &mut warnings,
                        format!(
                            "datatype property {}: conflicting domain (kept '{}', proposed '{}')",
                            existing.name, existing.domain, prop.domain
                        ),
                    );
                }
                if existing.range != range {
                    push_warning(
                        &mut warnings,
                        format!(
                            "datatype property {}: conflicting range (kept '{}', proposed '{}')",
                            existing.name,
                            existing.range.xsd_local(),
                            range.xsd_local()
                        ),
                    );
                }
                union_evidence(&mut existing.evidence, &prop.evidence);
                merge_description(&mut existing.description, &prop.description);
                fill_origin(&mut existing.origin, &prop.origin);
            }
        }
    }

    // ------------------------------------------------------------------
    // Object properties
    // ------------------------------------------------------------------
    let mut object_properties: BTreeMap<String, ObjectPropertyEntry> = prior
        .object_properties
        .iter()
        .map(|p| (name_key(&p.name), p.clone()))
        .collect();
    for prop in &proposal.proposed_additions.object_properties {
        if prop.name.trim().is_empty() {
            push_warning(
                &mut warnings,
                "ignored object property proposal with empty name".to_string(),
            );
            continue;
        }
        match object_properties.entry(name_key(&prop.name)) {
            Entry::Vacant(slot) => {
                slot.insert(ObjectPropertyEntry {
                    name: prop.name.trim().to_string(),
                    domain: prop.domain.trim().to_string(),
                    range: prop.range.trim().to_string(),
                    description: prop.description.clone(),
                    origin: proposed_origin(&prop.origin),
                    evidence: prop.evidence.clone(),
                });
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if name_key(&existing.domain) != name_key(&prop.domain) {
                    push_warning(
                        &mut warnings,
                        format!(
                            "object property {}: conflicting domain (kept '{}', proposed '{}')",
                            existing.name, existing.domain, prop.domain
                        ),
                    );
                }
                if name_key(&existing.range) != name_key(&prop.range) {
                    push_warning(
                        &mut warnings,
                        format!(
                            "object property {}: conflicting range (kept '{}', proposed '{}')",
                            existing.name, existing.range, prop.range
                        ),
                    );
                }
                union_evidence(&mut existing.evidence, &prop.evidence);
                merge_description(&mut existing.description, &prop.description);
                fill_origin(&mut existing.origin, &prop.origin);
            }
        }
    }

    // ------------------------------------------------------------------
    // Events (actors/effects union as ordered sets)
    // ------------------------------------------------------------------
    let mut events: BTreeMap<String, EventEntry> = prior
        .events
        .iter()
        .map(|e| (name_key(&e.name), e.clone()))
        .collect();
    for event in &proposal.proposed_additions.events {
        if event.name.trim().is_empty() {
            push_warning(&mut warnings, "ignored event proposal with empty name".to_string());
            continue;
        }
        match events.entry(name_key(&event.name)) {
            Entry::Vacant(slot) => {
                slot.insert(EventEntry {
                    name: event.name.trim().to_string(),
                    actors: event.actors.clone(),
                    effects: event.effects.clone(),
                    origin: proposed_origin(&event.origin),
                    evidence: event.evidence.clone(),
                });
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                union_ordered(&mut existing.actors, &event.actors);
                union_ordered(&mut existing.effects, &event.effects);
                union_evidence(&mut existing.evidence, &event.evidence);
                fill_origin(&mut existing.origin, &event.origin);
            }
        }
    }

    // ------------------------------------------------------------------
    // Aliases: proposal suggestions plus reuse hints (hints are never
    // auto-applied; they only surface as alias suggestions).
    // ------------------------------------------------------------------
    let mut aliases = prior.aliases.clone();
    let mut alias_seen: BTreeSet<Vec<String>> =
        aliases.iter().map(AliasEntry::sorted_names).collect();
    for alias in &proposal.alias_or_merge_suggestions {
        if alias_seen.insert(alias.sorted_names()) {
            aliases.push(alias.clone());
        }
    }
    for hint in &proposal.reuse_instead_of_create {
        let alias = AliasEntry {
            names: vec![hint.proposed.clone(), hint.reuse.clone()],
            rationale: hint.rationale.clone(),
        };
        if alias_seen.insert(alias.sorted_names()) {
            aliases.push(alias);
        }
    }

    for warning in &proposal.warnings {
        push_warning(&mut warnings, warning.clone());
    }

    // ------------------------------------------------------------------
    // End-of-pass reference checks against the merged class set.
    // ------------------------------------------------------------------
    for prop in datatype_properties.values() {
        if prop.domain.is_empty() {
            push_warning(
                &mut warnings,
                format!("datatype property {} has no domain", prop.name),
            );
        } else if !classes.contains_key(&name_key(&prop.domain)) {
            push_warning(
                &mut warnings,
                format!(
                    "datatype property {} references unknown class {}",
                    prop.name, prop.domain
                ),
            );
        }
    }
    for prop in object_properties.values() {
        for (slot, class) in [("domain", &prop.domain), ("range", &prop.range)] {
            if class.is_empty() {
                push_warning(
                    &mut warnings,
                    format!("object property {} has no {slot}", prop.name),
                );
            } else if !classes.contains_key(&name_key(class)) {
                push_warning(
                    &mut warnings,
                    format!(
                        "object property {} references unknown class {}",
                        prop.name, class
                    ),
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Assemble, with every collection in canonical order.
    // ------------------------------------------------------------------
    let mut classes: Vec<ClassEntry> = classes.into_values().collect();
    for class in &mut classes {
        class.evidence.sort();
        class.evidence.dedup();
    }
    let mut datatype_properties: Vec<DatatypePropertyEntry> =
        datatype_properties.into_values().collect();
    let mut object_properties: Vec<ObjectPropertyEntry> =
        object_properties.into_values().collect();
    for prop in &mut datatype_properties {
        prop.evidence.sort();
        prop.evidence.dedup();
    }
    for prop in &mut object_properties {
        prop.evidence.sort();
        prop.evidence.dedup();
    }
    let mut events: Vec<EventEntry> = events.into_values().collect();
    for event in &mut events {
        event.evidence.sort();
        event.evidence.dedup();
    }

    SchemaCard {
        version: version.to_string(),
        namespace: if prior.namespace.is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            prior.namespace.clone()
        },
        classes,
        datatype_properties,
        object_properties,
        events,
        aliases,
        warnings,
    }
}

/// Origin for a newly inserted entry: the proposal's tag when present,
/// `induced` otherwise.
fn proposed_origin(tag: &Option<String>) -> String {
    match tag {
        Some(origin) if !origin.is_empty() => origin.clone(),
        _ => ORIGIN_INDUCED.to_string(),
    }
}

/// Origins are immutable once non-empty; an empty (legacy) origin takes the
/// first explicit tag that arrives.
fn fill_origin(existing: &mut String, tag: &Option<String>) {
    if existing.is_empty() {
        if let Some(origin) = tag {
            *existing = origin.clone();
        }
    }
}
