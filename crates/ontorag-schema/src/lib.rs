//! Ontology governance for OntoRAG.
//!
//! The LLM proposes; this crate decides. It holds:
//!
//! - the **Schema Card**: the canonical, versioned ontology artifact
//!   ([`card`]),
//! - typed records for the per-chunk LLM output contract ([`proposal`]),
//! - the **aggregator** that folds per-chunk proposals into one
//!   document-level proposal ([`aggregate`]),
//! - the deterministic, origin-preserving **merger** ([`merge`]),
//! - the Schema Card → OWL/RDFS Turtle emitter ([`ttl`]), and
//! - the instance **materializer** that emits RDF with PROV mention nodes
//!   ([`materialize`]).
//!
//! Everything here is pure value manipulation: no IO, no network, no
//! environment. The only non-deterministic output in the whole crate is the
//! wall-clock `version` stamp, and the pure core takes it as an argument.

pub mod aggregate;
pub mod card;
pub mod materialize;
pub mod merge;
pub mod proposal;
pub mod ttl;

pub use aggregate::aggregate_proposals;
pub use card::{
    name_key, AliasEntry, ClassEntry, DatatypePropertyEntry, DatatypeRange, EventEntry,
    ObjectPropertyEntry, SchemaCard, DEFAULT_NAMESPACE, ORIGIN_INDUCED,
};
pub use materialize::{materialize_instances, ChunkInstances, InstanceProposal, MaterializedGraph};
pub use merge::{merge_proposal, merge_proposal_at, next_version};
pub use proposal::{
    ChunkProposal, ClassProposal, DocumentProposal, EventProposal, PropertyProposal,
    ProposedAdditions, ReuseHint,
};
pub use ttl::schema_card_to_turtle;
