//! OWL/RDFS baseline import (boundary adapter).
//!
//! This crate sits at the interop boundary:
//!
//! - It parses Turtle-serialized ontologies (untrusted input) with Sophia.
//! - It emits a `DocumentProposal` whose entries carry the catalog id as
//!   `origin`, so the regular Schema Card merge path governs what actually
//!   enters the card.
//!
//! Baselines (FOAF, PROV-O, Schema.org, ...) live in a catalog directory
//! managed by [`catalog`].

pub mod catalog;

use anyhow::{anyhow, Result};
use ontorag_schema::{
    ChunkProposal, ClassProposal, DocumentProposal, PropertyProposal, ProposedAdditions,
};
use sophia::api::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub use catalog::{Catalog, CatalogEntry};

pub const RDF_TYPE_IRI: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const OWL_CLASS_IRI: &str = "http://www.w3.org/2002/07/owl#Class";
pub const RDFS_CLASS_IRI: &str = "http://www.w3.org/2000/01/rdf-schema#Class";
pub const OWL_OBJECT_PROPERTY_IRI: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";
pub const OWL_DATATYPE_PROPERTY_IRI: &str = "http://www.w3.org/2002/07/owl#DatatypeProperty";
pub const RDFS_LABEL_IRI: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_COMMENT_IRI: &str = "http://www.w3.org/2000/01/rdf-schema#comment";
pub const RDFS_DOMAIN_IRI: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
pub const RDFS_RANGE_IRI: &str = "http://www.w3.org/2000/01/rdf-schema#range";

// ============================================================================
// RDF term model (sufficient for schema extraction)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum RdfNode {
    Iri(String),
    BlankNode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RdfObject {
    Node(RdfNode),
    Literal(String),
}

#[derive(Debug, Clone)]
struct RdfStatement {
    subject: RdfNode,
    predicate_iri: String,
    object: RdfObject,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct TurtleSinkError {
    message: String,
}

impl From<anyhow::Error> for TurtleSinkError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            message: value.to_string(),
        }
    }
}

fn local_name(iri: &str) -> String {
    iri.rsplit(['#', '/']).next().unwrap_or(iri).to_string()
}

/// Namespace prefix of an IRI: everything up to and including the last `#`
/// or `/`.
fn iri_prefix(iri: &str) -> Option<String> {
    iri.rfind(['#', '/']).map(|pos| iri[..=pos].to_string())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unescape_rdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse a term from its N-Triples-ish display form.
fn parse_term_display(term: &str) -> Result<RdfObject> {
    let s = term.trim();

    if let Some(rest) = s.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Ok(RdfObject::Node(RdfNode::Iri(rest.to_string())));
    }

    if let Some(rest) = s.strip_prefix("_:") {
        return Ok(RdfObject::Node(RdfNode::BlankNode(rest.to_string())));
    }

    if s.starts_with('"') {
        let mut end_quote = None;
        let mut prev_was_escape = false;
        for (i, ch) in s.char_indices().skip(1) {
            if ch == '"' && !prev_was_escape {
                end_quote = Some(i);
                break;
            }
            prev_was_escape = ch == '\\' && !prev_was_escape;
        }
        let Some(end) = end_quote else {
            return Err(anyhow!("invalid literal term (missing closing quote): {s}"));
        };
        return Ok(RdfObject::Literal(unescape_rdf_string(&s[1..end])));
    }

    Err(anyhow!("unsupported RDF term form: {s}"))
}

fn parse_node_term_display(term: &str) -> Result<RdfNode> {
    match parse_term_display(term)? {
        RdfObject::Node(node) => Ok(node),
        RdfObject::Literal(_) => Err(anyhow!("expected IRI/blank node, got literal: {term}")),
    }
}

fn parse_turtle_statements(bytes: &[u8]) -> Result<Vec<RdfStatement>> {
    let cursor = std::io::Cursor::new(bytes);
    let reader = std::io::BufReader::new(cursor);

    let mut out: Vec<RdfStatement> = Vec::new();
    let mut parser = sophia::turtle::parser::turtle::parse_bufread(reader);
    parser
        .try_for_each_triple(|t| -> std::result::Result<(), TurtleSinkError> {
            let subject =
                parse_node_term_display(&t.s().to_string()).map_err(TurtleSinkError::from)?;
            let predicate =
                parse_node_term_display(&t.p().to_string()).map_err(TurtleSinkError::from)?;
            let RdfNode::Iri(predicate_iri) = predicate else {
                return Ok(());
            };
            let object = parse_term_display(&t.o().to_string()).map_err(TurtleSinkError::from)?;
            out.push(RdfStatement {
                subject,
                predicate_iri,
                object,
            });
            Ok(())
        })
        .map_err(|e| anyhow!("failed to parse Turtle: {e}"))?;
    Ok(out)
}

// ============================================================================
// Baseline import
// ============================================================================

#[derive(Debug, Clone)]
pub struct BaselineImport {
    /// Proposal carrying the imported entries, each tagged
    /// `origin = <catalog id>`. Structural anomalies (skipped names) ride
    /// along in `proposal.warnings`.
    pub proposal: DocumentProposal,
    /// Most common IRI prefix among the declared classes/properties.
    pub namespace: Option<String>,
}

pub fn import_turtle_file(path: &Path, origin: &str) -> Result<BaselineImport> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow!("failed to read baseline {}: {e}", path.display()))?;
    import_turtle(&bytes, origin)
}

/// Extract Schema Card entries from a Turtle ontology.
///
/// Extraction rules:
/// - classes: IRI subjects of `a owl:Class` / `a rdfs:Class`;
/// - object properties: subjects of `a owl:ObjectProperty`, with
///   `rdfs:domain`/`rdfs:range` local names;
/// - datatype properties: subjects of `a owl:DatatypeProperty`, with the
///   XSD range local name (normalized downstream by the merger);
/// - `rdfs:comment` (else `rdfs:label`) becomes the description;
/// - local names with non-identifier characters are skipped with a warning.
pub fn import_turtle(bytes: &[u8], origin: &str) -> Result<BaselineImport> {
    let statements = parse_turtle_statements(bytes)?;

    let mut types_by_subject: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut labels: BTreeMap<String, String> = BTreeMap::new();
    let mut comments: BTreeMap<String, String> = BTreeMap::new();
    let mut domains: BTreeMap<String, String> = BTreeMap::new();
    let mut ranges: BTreeMap<String, String> = BTreeMap::new();

    for stmt in &statements {
        let RdfNode::Iri(subject_iri) = &stmt.subject else {
            continue; // blank-node subjects carry no importable schema
        };
        match (stmt.predicate_iri.as_str(), &stmt.object) {
            (RDF_TYPE_IRI, RdfObject::Node(RdfNode::Iri(type_iri))) => {
                types_by_subject
                    .entry(subject_iri.clone())
                    .or_default()
                    .insert(type_iri.clone());
            }
            (RDFS_LABEL_IRI, RdfObject::Literal(text)) => {
                labels.entry(subject_iri.clone()).or_insert_with(|| text.clone());
            }
            (RDFS_COMMENT_IRI, RdfObject::Literal(text)) => {
                comments
                    .entry(subject_iri.clone())
                    .or_insert_with(|| text.clone());
            }
            (RDFS_DOMAIN_IRI, RdfObject::Node(RdfNode::Iri(domain_iri))) => {
                domains
                    .entry(subject_iri.clone())
                    .or_insert_with(|| local_name(domain_iri));
            }
            (RDFS_RANGE_IRI, RdfObject::Node(RdfNode::Iri(range_iri))) => {
                ranges
                    .entry(subject_iri.clone())
                    .or_insert_with(|| local_name(range_iri));
            }
            _ => {}
        }
    }

    let mut classes: Vec<ClassProposal> = Vec::new();
    let mut datatype_properties: Vec<PropertyProposal> = Vec::new();
    let mut object_properties: Vec<PropertyProposal> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut declared_iris: Vec<&str> = Vec::new();

    for (subject_iri, types) in &types_by_subject {
        let is_class =
            types.contains(OWL_CLASS_IRI) || types.contains(RDFS_CLASS_IRI);
        let is_object_property = types.contains(OWL_OBJECT_PROPERTY_IRI);
        let is_datatype_property = types.contains(OWL_DATATYPE_PROPERTY_IRI);
        if !is_class && !is_object_property && !is_datatype_property {
            continue;
        }

        let name = local_name(subject_iri);
        if !is_identifier(&name) {
            warnings.push(format!(
                "skipped baseline term with non-identifier local name '{name}'"
            ));
            continue;
        }
        declared_iris.push(subject_iri);

        let description = comments
            .get(subject_iri)
            .or_else(|| labels.get(subject_iri))
            .cloned()
            .unwrap_or_default();

        if is_class {
            classes.push(ClassProposal {
                name: name.clone(),
                description: description.clone(),
                origin: Some(origin.to_string()),
                evidence: vec![],
            });
        }
        if is_object_property {
            object_properties.push(PropertyProposal {
                name: name.clone(),
                domain: domains.get(subject_iri).cloned().unwrap_or_default(),
                range: ranges.get(subject_iri).cloned().unwrap_or_default(),
                description: description.clone(),
                origin: Some(origin.to_string()),
                evidence: vec![],
            });
        }
        if is_datatype_property {
            datatype_properties.push(PropertyProposal {
                name,
                domain: domains.get(subject_iri).cloned().unwrap_or_default(),
                range: ranges.get(subject_iri).cloned().unwrap_or_default(),
                description,
                origin: Some(origin.to_string()),
                evidence: vec![],
            });
        }
    }

    let namespace = detect_namespace(&declared_iris);

    // Run the entries through the aggregator so the proposal comes out in
    // the same deduplicated, sorted shape every other proposal has.
    let chunk = ChunkProposal {
        chunk_id: format!("baseline:{origin}"),
        proposed_additions: ProposedAdditions {
            classes,
            datatype_properties,
            object_properties,
            events: vec![],
        },
        warnings,
        ..ChunkProposal::default()
    };
    let mut proposal =
        ontorag_schema::aggregate_proposals(&format!("baseline:{origin}"), &[chunk]);
    proposal.chunk_count = 0;

    Ok(BaselineImport {
        proposal,
        namespace,
    })
}

/// Most common IRI prefix among declared terms; ties resolve to the
/// lexicographically smallest prefix.
fn detect_namespace(iris: &[&str]) -> Option<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for iri in iris {
        if let Some(prefix) = iri_prefix(iri) {
            *counts.entry(prefix).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(a_prefix, a_count), (b_prefix, b_count)| {
            Ord::cmp(a_count, b_count).then(b_prefix.cmp(a_prefix))
        })
        .map(|(prefix, _)| prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontorag_schema::{
        merge_proposal_at, schema_card_to_turtle, DatatypeRange, SchemaCard, DEFAULT_NAMESPACE,
    };

    const FOAF_MINI: &str = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
@prefix foaf: <http://xmlns.com/foaf/0.1/> .

foaf:Person a owl:Class ;
    rdfs:label "Person" ;
    rdfs:comment "A person." .

foaf:Organization a owl:Class ;
    rdfs:label "Organization" .

foaf:knows a owl:ObjectProperty ;
    rdfs:domain foaf:Person ;
    rdfs:range foaf:Person ;
    rdfs:comment "A person known by this person." .

foaf:name a owl:DatatypeProperty ;
    rdfs:domain foaf:Person ;
    rdfs:range xsd:string .
"#;

    #[test]
    fn extracts_classes_and_properties_with_origin() {
        let import = import_turtle(FOAF_MINI.as_bytes(), "foaf").expect("import");
        let additions = &import.proposal.proposed_additions;

        let names: Vec<&str> = additions.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Organization", "Person"]);
        assert_eq!(additions.classes[1].description, "A person.");
        assert_eq!(additions.classes[1].origin.as_deref(), Some("foaf"));

        assert_eq!(additions.object_properties.len(), 1);
        let knows = &additions.object_properties[0];
        assert_eq!(knows.domain, "Person");
        assert_eq!(knows.range, "Person");

        assert_eq!(additions.datatype_properties.len(), 1);
        assert_eq!(additions.datatype_properties[0].range, "string");
    }

    #[test]
    fn detects_the_dominant_namespace() {
        let import = import_turtle(FOAF_MINI.as_bytes(), "foaf").expect("import");
        assert_eq!(import.namespace.as_deref(), Some("http://xmlns.com/foaf/0.1/"));
    }

    #[test]
    fn merging_a_baseline_tags_origins_from_the_catalog_id() {
        let import = import_turtle(FOAF_MINI.as_bytes(), "foaf").expect("import");
        let card = merge_proposal_at(
            &SchemaCard::empty(DEFAULT_NAMESPACE),
            &import.proposal,
            "2026-08-01T00:00:00Z",
        );
        let person = card.class("Person").expect("Person imported");
        assert_eq!(person.origin, "foaf");
        let name = card.datatype_property("name").expect("name imported");
        assert_eq!(name.range, DatatypeRange::String);
    }

    #[test]
    fn non_identifier_local_names_are_skipped_with_warning() {
        let ttl = r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
<http://example.org/Weird%20Name> a owl:Class .
<http://example.org/Fine> a owl:Class .
"#;
        let import = import_turtle(ttl.as_bytes(), "ex").expect("import");
        let names: Vec<&str> = import
            .proposal
            .proposed_additions
            .classes
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Fine"]);
        assert!(import
            .proposal
            .warnings
            .iter()
            .any(|w| w.contains("non-identifier local name")));
    }

    #[test]
    fn emitted_cards_round_trip_through_the_importer() {
        let mut card = SchemaCard::empty(DEFAULT_NAMESPACE);
        let seed = import_turtle(FOAF_MINI.as_bytes(), "foaf").expect("import");
        card = merge_proposal_at(&card, &seed.proposal, "2026-08-01T00:00:00Z");

        let ttl = schema_card_to_turtle(&card);
        let back = import_turtle(ttl.as_bytes(), "roundtrip").expect("reimport");
        let reimported = merge_proposal_at(
            &SchemaCard::empty(DEFAULT_NAMESPACE),
            &back.proposal,
            "2026-08-01T00:00:00Z",
        );

        let class_names = |c: &SchemaCard| -> Vec<String> {
            c.classes.iter().map(|e| e.name.clone()).collect()
        };
        assert_eq!(class_names(&card), class_names(&reimported));

        for prop in &card.datatype_properties {
            let other = reimported
                .datatype_property(&prop.name)
                .expect("datatype property survives round-trip");
            assert_eq!(other.range, prop.range);
            assert_eq!(other.domain, prop.domain);
        }
        for prop in &card.object_properties {
            let other = reimported
                .object_property(&prop.name)
                .expect("object property survives round-trip");
            assert_eq!(other.range, prop.range);
        }
    }
}
