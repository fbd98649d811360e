//! Materialize per-chunk instance proposals into an RDF graph.
//!
//! Every instance becomes a subject `<{namespace}{Class}/{local_id}>` typed
//! to its class, and every fact is additionally reified by a **mention
//! node**: a blank node typed `prov:Entity`, derived from the chunk IRI and
//! carrying the evidence quote. Mention nodes point only back to chunks;
//! the provenance subgraph is a forest.
//!
//! Output is canonical Turtle: prefixes once at the top, subjects grouped
//! (named subjects in IRI order, mention nodes after), triples within a
//! subject sorted by predicate then object, `rdf:type` first.

use crate::card::{name_key, push_warning, DatatypeRange, SchemaCard};
use crate::ttl::{percent_encode, term_ref, turtle_string};
use chrono::{DateTime, NaiveDate};
use ontorag_dto::EvidenceRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fixed tool vocabulary (`onto:hasMention`), distinct from the per-card
/// namespace which holds user data.
pub const ONTO_NS: &str = "http://ontorag.local/onto#";
pub const PROV_NS: &str = "http://www.w3.org/ns/prov#";

// ============================================================================
// Instance proposals (second LLM pass)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceProposal {
    #[serde(default)]
    pub local_id: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub datatype_values: BTreeMap<String, String>,
    #[serde(default)]
    pub object_values: BTreeMap<String, String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

/// One chunk's worth of instance proposals, as returned by the LLM. Missing
/// keys default to empty and unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkInstances {
    #[serde(default)]
    pub chunk_id: String,
    #[serde(default)]
    pub instances: Vec<InstanceProposal>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ChunkInstances {
    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        if !value.is_object() {
            anyhow::bail!("instance response must be a JSON object");
        }
        let mut parsed: ChunkInstances = serde_json::from_value(value)?;
        for instance in &mut parsed.instances {
            for e in &mut instance.evidence {
                e.quote = ontorag_dto::clamp_quote(&e.quote);
            }
        }
        Ok(parsed)
    }
}

// ============================================================================
// Materialization
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MaterializedGraph {
    pub turtle: String,
    pub warnings: Vec<String>,
    pub instances_emitted: usize,
    pub instances_skipped: usize,
}

pub fn materialize_instances(
    card: &SchemaCard,
    instances: &[InstanceProposal],
) -> MaterializedGraph {
    let classes: BTreeMap<String, &str> = card
        .classes
        .iter()
        .map(|c| (name_key(&c.name), c.name.as_str()))
        .collect();

    let mut warnings: Vec<String> = Vec::new();

    // First pass: resolve classes and mint subject IRIs so object facts can
    // point at instances declared in any chunk.
    let mut subject_by_local: BTreeMap<&str, String> = BTreeMap::new();
    let mut kept: Vec<(&InstanceProposal, &str, String)> = Vec::new();
    let mut skipped = 0usize;
    for instance in instances {
        let Some(class_name) = classes.get(&name_key(&instance.class)).copied() else {
            push_warning(
                &mut warnings,
                format!(
                    "instance {}: unknown class {}; instance skipped",
                    instance.local_id, instance.class
                ),
            );
            skipped += 1;
            continue;
        };
        let iri = subject_iri(&card.namespace, class_name, &instance.local_id);
        match subject_by_local.get(instance.local_id.as_str()) {
            Some(existing) if existing != &iri => {
                push_warning(
                    &mut warnings,
                    format!(
                        "instance {}: conflicting class {} (already minted as {existing}); occurrence skipped",
                        instance.local_id, instance.class
                    ),
                );
                skipped += 1;
                continue;
            }
            Some(_) => {}
            None => {
                subject_by_local.insert(instance.local_id.as_str(), iri.clone());
            }
        }
        kept.push((instance, class_name, iri));
    }

    // Second pass: emit triples. Named subjects collect into a sorted map;
    // mention nodes are appended in creation order.
    let mut named: BTreeMap<String, BTreeSet<(u8, String, String)>> = BTreeMap::new();
    let mut mentions: Vec<(String, Vec<(u8, String, String)>)> = Vec::new();
    let mut emitted: BTreeSet<&str> = BTreeSet::new();

    for (instance, class_name, iri) in &kept {
        let subject = named.entry(format!("<{iri}>")).or_default();
        subject.insert((
            0,
            "a".to_string(),
            term_ref(&card.namespace, class_name),
        ));

        for (prop, raw) in &instance.datatype_values {
            let literal = match card.datatype_property(prop) {
                Some(entry) => {
                    coerce_literal(&instance.local_id, entry.range, raw, &mut warnings)
                }
                None => {
                    push_warning(
                        &mut warnings,
                        format!(
                            "instance {}: unknown datatype property {prop}; value emitted as string",
                            instance.local_id
                        ),
                    );
                    typed_literal(raw, DatatypeRange::String)
                }
            };
            subject.insert((1, term_ref(&card.namespace, prop), literal));
        }

        for (prop, target) in &instance.object_values {
            if card.object_property(prop).is_none() {
                push_warning(
                    &mut warnings,
                    format!(
                        "instance {}: unknown object property {prop}",
                        instance.local_id
                    ),
                );
            }
            match subject_by_local.get(target.as_str()) {
                Some(target_iri) => {
                    subject.insert((
                        1,
                        term_ref(&card.namespace, prop),
                        format!("<{target_iri}>"),
                    ));
                }
                None => {
                    push_warning(
                        &mut warnings,
                        format!(
                            "instance {}: object property {prop} references unknown instance {target}; triple skipped",
                            instance.local_id
                        ),
                    );
                }
            }
        }

        emitted.insert(instance.local_id.as_str());

        for evidence in &instance.evidence {
            let label = format!("_:m{}", mentions.len());
            subject.insert((1, "onto:hasMention".to_string(), label.clone()));
            let mut triples = vec![
                (0, "a".to_string(), "prov:Entity".to_string()),
                (1, "prov:value".to_string(), turtle_string(&evidence.quote)),
                (
                    1,
                    "prov:wasDerivedFrom".to_string(),
                    format!("<chunk:{}>", evidence.chunk_id),
                ),
            ];
            triples.sort();
            mentions.push((label, triples));
        }
    }

    let mut turtle = String::new();
    turtle.push_str(&format!("@prefix ns: <{}> .\n", card.namespace));
    turtle.push_str(&format!("@prefix onto: <{ONTO_NS}> .\n"));
    turtle.push_str(&format!("@prefix prov: <{PROV_NS}> .\n"));
    turtle.push_str(&format!("@prefix xsd: <{}> .\n", crate::ttl::XSD_NS));

    for (subject, triples) in &named {
        push_subject_block(&mut turtle, subject, triples.iter());
    }
    for (label, triples) in &mentions {
        push_subject_block(&mut turtle, label, triples.iter());
    }

    MaterializedGraph {
        turtle,
        warnings,
        instances_emitted: emitted.len(),
        instances_skipped: skipped,
    }
}

fn push_subject_block<'a>(
    out: &mut String,
    subject: &str,
    triples: impl Iterator<Item = &'a (u8, String, String)>,
) {
    let triples: Vec<_> = triples.collect();
    if triples.is_empty() {
        return;
    }
    out.push('\n');
    out.push_str(subject);
    for (i, (_, predicate, object)) in triples.iter().enumerate() {
        if i == 0 {
            out.push(' ');
        } else {
            out.push_str(" ;\n    ");
        }
        out.push_str(predicate);
        out.push(' ');
        out.push_str(object);
    }
    out.push_str(" .\n");
}

fn subject_iri(namespace: &str, class_name: &str, local_id: &str) -> String {
    format!(
        "{namespace}{}/{}",
        percent_encode(class_name),
        percent_encode(local_id)
    )
}

/// Cast a raw literal to the property's declared range. Values that fail
/// the strict parse fall back to `xsd:string` with a warning.
fn coerce_literal(
    local_id: &str,
    range: DatatypeRange,
    raw: &str,
    warnings: &mut Vec<String>,
) -> String {
    let trimmed = raw.trim();
    let parsed = match range {
        DatatypeRange::String | DatatypeRange::AnyUri => return typed_literal(raw, range),
        DatatypeRange::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                Some("true".to_string())
            } else if trimmed.eq_ignore_ascii_case("false") {
                Some("false".to_string())
            } else {
                None
            }
        }
        DatatypeRange::Integer => trimmed.parse::<i64>().ok().map(|_| trimmed.to_string()),
        DatatypeRange::Decimal => trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|_| trimmed.to_string()),
        DatatypeRange::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .map(|_| trimmed.to_string()),
        DatatypeRange::DateTime => DateTime::parse_from_rfc3339(trimmed)
            .ok()
            .map(|_| trimmed.to_string()),
    };
    match parsed {
        Some(lexical) => format!(
            "{}^^xsd:{}",
            turtle_string(&lexical),
            range.xsd_local()
        ),
        None => {
            push_warning(
                warnings,
                format!(
                    "instance {local_id}: value '{raw}' is not a valid {}; emitted as string",
                    range.xsd_local()
                ),
            );
            typed_literal(raw, DatatypeRange::String)
        }
    }
}

fn typed_literal(raw: &str, range: DatatypeRange) -> String {
    format!("{}^^xsd:{}", turtle_string(raw), range.xsd_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{
        ClassEntry, DatatypePropertyEntry, ObjectPropertyEntry, SchemaCard, DEFAULT_NAMESPACE,
    };

    fn person_card() -> SchemaCard {
        let mut card = SchemaCard::empty(DEFAULT_NAMESPACE);
        card.classes.push(ClassEntry {
            name: "Person".to_string(),
            ..ClassEntry::default()
        });
        card.datatype_properties.push(DatatypePropertyEntry {
            name: "email".to_string(),
            domain: "Person".to_string(),
            range: DatatypeRange::String,
            ..DatatypePropertyEntry::default()
        });
        card.datatype_properties.push(DatatypePropertyEntry {
            name: "age".to_string(),
            domain: "Person".to_string(),
            range: DatatypeRange::Integer,
            ..DatatypePropertyEntry::default()
        });
        card.object_properties.push(ObjectPropertyEntry {
            name: "knows".to_string(),
            domain: "Person".to_string(),
            range: "Person".to_string(),
            ..ObjectPropertyEntry::default()
        });
        card
    }

    fn p1() -> InstanceProposal {
        InstanceProposal {
            local_id: "p1".to_string(),
            class: "Person".to_string(),
            datatype_values: BTreeMap::from([("email".to_string(), "a@b.c".to_string())]),
            object_values: BTreeMap::new(),
            evidence: vec![EvidenceRef::new("c1", "Alice's email is a@b.c")],
        }
    }

    #[test]
    fn emits_type_fact_and_mention_triples() {
        let graph = materialize_instances(&person_card(), &[p1()]);
        let ttl = &graph.turtle;

        assert!(ttl.contains("<http://ontorag.local/ns/Person/p1> a ns:Person"));
        assert!(ttl.contains("ns:email \"a@b.c\"^^xsd:string"));
        assert!(ttl.contains("onto:hasMention _:m0"));
        assert!(ttl.contains("_:m0 a prov:Entity"));
        assert!(ttl.contains("prov:wasDerivedFrom <chunk:c1>"));
        assert!(ttl.contains("prov:value \"Alice's email is a@b.c\""));
        assert!(graph.warnings.is_empty());
        assert_eq!(graph.instances_emitted, 1);
    }

    #[test]
    fn unknown_class_skips_instance_with_warning() {
        let alien = InstanceProposal {
            local_id: "x1".to_string(),
            class: "Alien".to_string(),
            ..InstanceProposal::default()
        };
        let graph = materialize_instances(&person_card(), &[alien]);
        assert!(!graph.turtle.contains("x1"));
        assert_eq!(graph.instances_emitted, 0);
        assert_eq!(graph.instances_skipped, 1);
        assert!(graph
            .warnings
            .iter()
            .any(|w| w.contains("unknown class Alien")));
    }

    #[test]
    fn object_facts_resolve_across_instances() {
        let mut p2 = InstanceProposal {
            local_id: "p2".to_string(),
            class: "Person".to_string(),
            ..InstanceProposal::default()
        };
        p2.object_values
            .insert("knows".to_string(), "p1".to_string());
        let graph = materialize_instances(&person_card(), &[p1(), p2]);
        assert!(graph
            .turtle
            .contains("ns:knows <http://ontorag.local/ns/Person/p1>"));
    }

    #[test]
    fn unresolved_object_target_skips_triple() {
        let mut p2 = InstanceProposal {
            local_id: "p2".to_string(),
            class: "Person".to_string(),
            ..InstanceProposal::default()
        };
        p2.object_values
            .insert("knows".to_string(), "ghost".to_string());
        let graph = materialize_instances(&person_card(), &[p2]);
        assert!(!graph.turtle.contains("ns:knows"));
        assert!(graph
            .warnings
            .iter()
            .any(|w| w.contains("unknown instance ghost")));
    }

    #[test]
    fn literal_coercion_falls_back_to_string_with_warning() {
        let mut inst = p1();
        inst.datatype_values
            .insert("age".to_string(), "forty".to_string());
        let graph = materialize_instances(&person_card(), &[inst]);
        assert!(graph.turtle.contains("ns:age \"forty\"^^xsd:string"));
        assert!(graph
            .warnings
            .iter()
            .any(|w| w.contains("not a valid integer")));
    }

    #[test]
    fn valid_typed_literals_keep_their_lexical_form() {
        let mut inst = p1();
        inst.datatype_values
            .insert("age".to_string(), "42".to_string());
        let graph = materialize_instances(&person_card(), &[inst]);
        assert!(graph.turtle.contains("ns:age \"42\"^^xsd:integer"));
    }

    #[test]
    fn unknown_datatype_property_emits_string_with_warning() {
        let mut inst = p1();
        inst.datatype_values
            .insert("shoeSize".to_string(), "9".to_string());
        let graph = materialize_instances(&person_card(), &[inst]);
        assert!(graph.turtle.contains("ns:shoeSize \"9\"^^xsd:string"));
        assert!(graph
            .warnings
            .iter()
            .any(|w| w.contains("unknown datatype property shoeSize")));
    }

    #[test]
    fn prefixes_are_declared_once_at_the_top() {
        let graph = materialize_instances(&person_card(), &[p1()]);
        assert!(graph.turtle.starts_with("@prefix ns: "));
        assert_eq!(graph.turtle.matches("@prefix ns:").count(), 1);
    }
}
