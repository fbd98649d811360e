//! Plain-text and markdown loading boundary.
//!
//! Document parsing proper (PDF, HTML, ...) is an external collaborator;
//! this module is the minimal in-tree loader the pipeline needs: split text
//! into chunks, track section labels and character offsets, and mint the
//! deterministic ids.

use crate::{chunk_id, document_id, ChunkDto, DocumentDto, Provenance};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Blank-line-separated paragraphs.
    Text,
    /// `#`-heading sections; the heading becomes the chunk's section label.
    Markdown,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: DocumentDto,
    pub chunks: Vec<ChunkDto>,
}

/// Split `text` into chunk DTOs with deterministic ids and provenance.
pub fn load_document(source_path: &str, text: &str, format: DocumentFormat) -> LoadedDocument {
    let pieces = match format {
        DocumentFormat::Text => split_paragraphs(text),
        DocumentFormat::Markdown => split_markdown(text),
    };

    let doc_id = document_id(source_path);
    let title = match format {
        DocumentFormat::Markdown => first_heading(text),
        DocumentFormat::Text => None,
    };

    let chunks: Vec<ChunkDto> = pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| ChunkDto {
            chunk_id: chunk_id(&doc_id, index, &piece.text),
            document_id: doc_id.clone(),
            index,
            text: piece.text,
            provenance: Provenance {
                source_path: source_path.to_string(),
                page: None,
                section: piece.section,
                char_range: Some(piece.char_range),
            },
        })
        .collect();

    let mut metadata = BTreeMap::new();
    metadata.insert(
        "format".to_string(),
        match format {
            DocumentFormat::Text => "text",
            DocumentFormat::Markdown => "markdown",
        }
        .to_string(),
    );

    LoadedDocument {
        document: DocumentDto {
            document_id: doc_id,
            source_path: source_path.to_string(),
            title,
            chunk_count: chunks.len(),
            metadata,
        },
        chunks,
    }
}

struct Piece {
    text: String,
    section: Option<String>,
    char_range: (usize, usize),
}

fn split_paragraphs(text: &str) -> Vec<Piece> {
    let mut out = Vec::new();
    let mut cursor = 0usize; // char offset into `text`
    for piece in text.split("\n\n") {
        let piece_chars = piece.chars().count();
        let leading = piece.chars().take_while(|c| c.is_whitespace()).count();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            let start = cursor + leading;
            out.push(Piece {
                text: trimmed.to_string(),
                section: None,
                char_range: (start, start + trimmed.chars().count()),
            });
        }
        cursor += piece_chars + 2; // the "\n\n" separator
    }
    out
}

fn split_markdown(text: &str) -> Vec<Piece> {
    let mut out = Vec::new();
    let mut section: Option<String> = None;
    let mut buf = String::new();
    let mut buf_start = 0usize;
    let mut cursor = 0usize; // char offset into `text`

    let mut flush = |buf: &mut String, section: &Option<String>, buf_start: usize| {
        let leading = buf.chars().take_while(|c| c.is_whitespace()).count();
        let trimmed = buf.trim();
        if !trimmed.is_empty() {
            let start = buf_start + leading;
            out.push(Piece {
                text: trimmed.to_string(),
                section: section.clone(),
                char_range: (start, start + trimmed.chars().count()),
            });
        }
        buf.clear();
    };

    for line in text.split('\n') {
        let line_chars = line.chars().count();
        if line.starts_with('#') {
            flush(&mut buf, &section, buf_start);
            section = Some(line.trim_start_matches('#').trim().to_string());
            buf_start = cursor + line_chars + 1;
        } else {
            if buf.is_empty() {
                buf_start = cursor;
            }
            buf.push_str(line);
            buf.push('\n');
        }
        cursor += line_chars + 1;
    }
    flush(&mut buf, &section, buf_start);
    out
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
}
