//! Per-chunk LLM passes over a bounded worker pool.
//!
//! Default execution is sequential (one worker). With more workers, chunk
//! indices are pulled from a shared counter and results land in
//! index-addressed slots, so the aggregated output is identical to a
//! sequential run: the aggregator itself is order-insensitive, and the
//! chunk order fed to it here never depends on completion order.
//!
//! A chunk whose call times out or whose reply stays unparseable after the
//! retry contributes nothing: its proposal is dropped with a warning and
//! the pipeline continues. No partial chunk state is ever persisted.

use ontorag_dto::ChunkDto;
use ontorag_llm::{instances_for_chunk, propose_for_chunk, ChatClient, LlmError};
use ontorag_schema::{
    aggregate_proposals, ChunkProposal, DocumentProposal, InstanceProposal, SchemaCard,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// First pass: one proposal per chunk, folded into a document proposal.
/// Failed chunks surface as warnings on the result.
pub fn propose_document(
    client: &dyn ChatClient,
    template: &str,
    card: &SchemaCard,
    chunks: &[ChunkDto],
    workers: usize,
) -> DocumentProposal {
    let results = run_chunk_calls(chunks, workers, |chunk| {
        propose_for_chunk(client, template, chunk, card)
    });

    let mut proposals: Vec<ChunkProposal> = Vec::new();
    let mut dropped: Vec<String> = Vec::new();
    for (chunk, result) in chunks.iter().zip(results) {
        match result {
            Ok(proposal) => proposals.push(proposal),
            Err(e) => {
                tracing::warn!(chunk_id = %chunk.chunk_id, error = %e, "chunk proposal dropped");
                dropped.push(format!("chunk {}: proposal dropped: {e}", chunk.chunk_id));
            }
        }
    }

    let document_id = chunks
        .first()
        .map(|c| c.document_id.clone())
        .unwrap_or_default();
    let mut document = aggregate_proposals(&document_id, &proposals);
    document.warnings.extend(dropped);
    document.warnings.sort();
    document.warnings.dedup();
    document
}

/// Second pass: instance proposals per chunk, concatenated in chunk order.
pub fn extract_instances(
    client: &dyn ChatClient,
    template: &str,
    card: &SchemaCard,
    chunks: &[ChunkDto],
    workers: usize,
) -> (Vec<InstanceProposal>, Vec<String>) {
    let results = run_chunk_calls(chunks, workers, |chunk| {
        instances_for_chunk(client, template, chunk, card)
    });

    let mut instances: Vec<InstanceProposal> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    for (chunk, result) in chunks.iter().zip(results) {
        match result {
            Ok(chunk_instances) => {
                instances.extend(chunk_instances.instances);
                warnings.extend(chunk_instances.warnings);
            }
            Err(e) => {
                tracing::warn!(chunk_id = %chunk.chunk_id, error = %e, "chunk instances dropped");
                warnings.push(format!("chunk {}: instances dropped: {e}", chunk.chunk_id));
            }
        }
    }
    (instances, warnings)
}

/// Run `call` over every chunk with at most `workers` threads. Results come
/// back in chunk order regardless of completion order.
fn run_chunk_calls<T: Send>(
    chunks: &[ChunkDto],
    workers: usize,
    call: impl Fn(&ChunkDto) -> Result<T, LlmError> + Sync,
) -> Vec<Result<T, LlmError>> {
    if workers <= 1 || chunks.len() <= 1 {
        return chunks.iter().map(|chunk| call(chunk)).collect();
    }

    let next = AtomicUsize::new(0);
    let mut slots: Vec<Option<Result<T, LlmError>>> =
        chunks.iter().map(|_| None).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers.min(chunks.len()))
            .map(|_| {
                scope.spawn(|| {
                    let mut local = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        if index >= chunks.len() {
                            break;
                        }
                        local.push((index, call(&chunks[index])));
                    }
                    local
                })
            })
            .collect();
        for handle in handles {
            for (index, result) in handle.join().expect("chunk worker panicked") {
                slots[index] = Some(result);
            }
        }
    });

    slots
        .into_iter()
        .map(|slot| slot.expect("every chunk index visited"))
        .collect()
}
