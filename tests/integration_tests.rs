//! Integration tests for the complete OntoRAG pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Loader → DTOs → chunk store
//! - Mock LLM → per-chunk proposals → aggregation → Schema Card merge
//! - Schema Card → Turtle → baseline importer (round-trip)
//! - Instance proposals → materialized Turtle with PROV mentions
//!
//! Run with: cargo test --test integration_tests

use ontorag_dto::{load_document, ChunkStore, DocumentFormat};
use ontorag_llm::{
    instances_for_chunk, propose_for_chunk, MockChatClient, INSTANCE_PROMPT_TEMPLATE,
    SCHEMA_PROMPT_TEMPLATE,
};
use ontorag_schema::{
    aggregate_proposals, materialize_instances, merge_proposal, merge_proposal_at,
    schema_card_to_turtle, DatatypeRange, InstanceProposal, SchemaCard, DEFAULT_NAMESPACE,
};
use tempfile::tempdir;

const DOC: &str = "# People\n\nAlice is a person. Her email is a@b.c.\n\n\
## Contacts\n\nBob is a person. Bob knows Alice.\n";

// ============================================================================
// Loader → chunk store
// ============================================================================

#[test]
fn test_ingest_round_trips_through_the_store() {
    let dir = tempdir().expect("tempdir");
    let loaded = load_document("people.md", DOC, DocumentFormat::Markdown);
    assert_eq!(loaded.chunks.len(), 2);

    let store = ChunkStore::open(
        dir.path()
            .join(format!("{}.jsonl", loaded.document.document_id)),
    );
    store.append_many(&loaded.chunks).expect("append");
    assert_eq!(store.count().expect("count"), 2);
    assert_eq!(store.read_all().expect("read_all"), loaded.chunks);
}

// ============================================================================
// Mock LLM → proposals → merge → TTL → reimport
// ============================================================================

fn schema_reply(chunk_id: &str, quote: &str) -> String {
    format!(
        r#"{{
        "chunk_id": "{chunk_id}",
        "proposed_additions": {{
            "classes": [{{
                "name": "Person",
                "description": "A human being",
                "evidence": [{{"chunk_id": "{chunk_id}", "quote": "{quote}"}}]
            }}],
            "datatype_properties": [{{
                "name": "email", "domain": "Person", "range": "str",
                "evidence": [{{"chunk_id": "{chunk_id}", "quote": "{quote}"}}]
            }}],
            "object_properties": [{{
                "name": "knows", "domain": "Person", "range": "Person",
                "evidence": [{{"chunk_id": "{chunk_id}", "quote": "{quote}"}}]
            }}]
        }},
        "warnings": []
    }}"#
    )
}

#[test]
fn test_full_schema_pass_over_mock_llm() {
    let loaded = load_document("people.md", DOC, DocumentFormat::Markdown);
    let card = SchemaCard::empty(DEFAULT_NAMESPACE);

    let replies: Vec<String> = loaded
        .chunks
        .iter()
        .map(|c| schema_reply(&c.chunk_id, "is a person"))
        .collect();
    let client = MockChatClient::new(replies);

    let mut proposals = Vec::new();
    for chunk in &loaded.chunks {
        proposals.push(
            propose_for_chunk(&client, SCHEMA_PROMPT_TEMPLATE, chunk, &card)
                .expect("mock proposal parses"),
        );
    }
    let document = aggregate_proposals(&loaded.document.document_id, &proposals);

    // both chunks proposed Person; evidence from each must survive
    assert_eq!(document.proposed_additions.classes.len(), 1);
    assert_eq!(document.proposed_additions.classes[0].evidence.len(), 2);

    let card = merge_proposal(&card, &document);
    assert!(!card.version.is_empty());
    let person = card.class("Person").expect("Person merged");
    assert_eq!(person.origin, "induced");
    assert_eq!(person.evidence.len(), 2);
    let email = card.datatype_property("email").expect("email merged");
    assert_eq!(email.range, DatatypeRange::String); // "str" normalized
    assert!(card.warnings.is_empty());

    // emitted ontology reimports with identical names and ranges
    let ttl = schema_card_to_turtle(&card);
    let reimport = ontorag_baseline::import_turtle(ttl.as_bytes(), "roundtrip")
        .expect("emitted ttl parses");
    let reimported = merge_proposal_at(
        &SchemaCard::empty(DEFAULT_NAMESPACE),
        &reimport.proposal,
        "2026-08-01T00:00:00Z",
    );
    assert!(reimported.class("Person").is_some());
    assert_eq!(
        reimported.datatype_property("email").expect("email").range,
        DatatypeRange::String
    );
    assert_eq!(
        reimported.object_property("knows").expect("knows").range,
        "Person"
    );
}

// ============================================================================
// Instance pass → materialization
// ============================================================================

#[test]
fn test_instance_pass_emits_prov_mentions() {
    let loaded = load_document("people.md", DOC, DocumentFormat::Markdown);
    let chunk = &loaded.chunks[0];

    let mut card = SchemaCard::empty(DEFAULT_NAMESPACE);
    let seed = aggregate_proposals(
        &loaded.document.document_id,
        &[ontorag_schema::ChunkProposal::from_value(serde_json::json!({
            "chunk_id": chunk.chunk_id,
            "proposed_additions": {
                "classes": [{"name": "Person"}],
                "datatype_properties": [{"name": "email", "domain": "Person", "range": "string"}]
            }
        }))
        .expect("seed proposal")],
    );
    card = merge_proposal_at(&card, &seed, "2026-08-01T00:00:00Z");

    let reply = format!(
        r#"{{"chunk_id": "{id}", "instances": [{{
            "local_id": "p1", "class": "Person",
            "datatype_values": {{"email": "a@b.c"}},
            "object_values": {{}},
            "evidence": [{{"chunk_id": "{id}", "quote": "Her email is a@b.c"}}]
        }}]}}"#,
        id = chunk.chunk_id
    );
    let client = MockChatClient::always(&reply);
    let instances = instances_for_chunk(&client, INSTANCE_PROMPT_TEMPLATE, chunk, &card)
        .expect("instances parse");

    let graph = materialize_instances(&card, &instances.instances);
    assert!(graph
        .turtle
        .contains("<http://ontorag.local/ns/Person/p1> a ns:Person"));
    assert!(graph.turtle.contains("ns:email \"a@b.c\"^^xsd:string"));
    assert!(graph.turtle.contains("_:m0 a prov:Entity"));
    assert!(graph
        .turtle
        .contains(&format!("prov:wasDerivedFrom <chunk:{}>", chunk.chunk_id)));
    assert!(graph.warnings.is_empty());
}

#[test]
fn test_unknown_class_instances_are_skipped_not_fatal() {
    let mut card = SchemaCard::empty(DEFAULT_NAMESPACE);
    card.classes.push(ontorag_schema::ClassEntry {
        name: "Person".to_string(),
        ..Default::default()
    });

    let instances = vec![
        InstanceProposal {
            local_id: "p1".to_string(),
            class: "Person".to_string(),
            ..Default::default()
        },
        InstanceProposal {
            local_id: "x1".to_string(),
            class: "Alien".to_string(),
            ..Default::default()
        },
    ];
    let graph = materialize_instances(&card, &instances);
    assert_eq!(graph.instances_emitted, 1);
    assert_eq!(graph.instances_skipped, 1);
    assert!(graph
        .warnings
        .iter()
        .any(|w| w.contains("unknown class Alien")));
}

// ============================================================================
// Baseline catalog → governed merge
// ============================================================================

#[test]
fn test_baseline_catalog_to_card() {
    let dir = tempdir().expect("tempdir");
    let ttl_path = dir.path().join("foaf.ttl");
    std::fs::write(
        &ttl_path,
        r#"
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix foaf: <http://xmlns.com/foaf/0.1/> .

foaf:Person a owl:Class ;
    rdfs:comment "A person." .
foaf:knows a owl:ObjectProperty ;
    rdfs:domain foaf:Person ;
    rdfs:range foaf:Person .
"#,
    )
    .expect("write ttl");

    let mut catalog = ontorag_baseline::Catalog::open(dir.path().join("catalog")).expect("open");
    catalog
        .register("foaf", &ttl_path, "FOAF", "Friend of a friend", vec![], None)
        .expect("register");

    let import = catalog.import("foaf").expect("import");
    let card = merge_proposal(&SchemaCard::empty(DEFAULT_NAMESPACE), &import.proposal);

    let person = card.class("Person").expect("Person imported");
    assert_eq!(person.origin, "foaf");
    assert_eq!(person.description, "A person.");

    // a later LLM proposal must not overwrite the baseline origin
    let induced = aggregate_proposals(
        "doc",
        &[ontorag_schema::ChunkProposal::from_value(serde_json::json!({
            "chunk_id": "c1",
            "proposed_additions": {"classes": [{"name": "person", "description": "A human being, longer"}]}
        }))
        .expect("proposal")],
    );
    let card = merge_proposal(&card, &induced);
    let person = card.class("Person").expect("still present");
    assert_eq!(person.origin, "foaf");
    assert_eq!(person.description, "A human being, longer");
}
