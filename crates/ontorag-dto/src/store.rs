//! Append-only chunk store.
//!
//! One chunk per line, compact JSON, UTF-8, `\n` delimited. Reads stream
//! from disk and every call to [`ChunkStore::iter`] starts over from the
//! beginning, so a store can be scanned any number of times. Ordering is
//! insertion order within a single writer session; readers must not depend
//! on ordering across sessions.

use crate::ChunkDto;
use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Handle to one `{document_id}.jsonl` chunk file.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    path: PathBuf,
}

impl ChunkStore {
    /// Open a store at `path`. The file is created lazily on first append;
    /// existing content is always preserved.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append chunks, one JSON object per line. Returns the number written.
    pub fn append_many(&self, chunks: &[ChunkDto]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {} for append", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        for chunk in chunks {
            let line = serde_json::to_string(chunk)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(chunks.len())
    }

    /// Stream all chunks from the start of the file. Missing file reads as
    /// an empty store.
    pub fn iter(&self) -> Result<ChunkIter> {
        let reader = match File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(anyhow!("failed to open {}: {e}", self.path.display()));
            }
        };
        Ok(ChunkIter {
            reader,
            line_no: 0,
            path: self.path.clone(),
        })
    }

    /// Read every chunk into memory, in file order.
    pub fn read_all(&self) -> Result<Vec<ChunkDto>> {
        self.iter()?.collect()
    }

    /// Number of chunks currently in the store.
    pub fn count(&self) -> Result<usize> {
        let mut n = 0;
        for chunk in self.iter()? {
            chunk?;
            n += 1;
        }
        Ok(n)
    }
}

/// Streaming reader over a chunk file. Blank lines are skipped; a malformed
/// line surfaces as an error carrying its line number.
pub struct ChunkIter {
    reader: Option<BufReader<File>>,
    line_no: usize,
    path: PathBuf,
}

impl Iterator for ChunkIter {
    type Item = Result<ChunkDto>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        loop {
            let mut line = String::new();
            self.line_no += 1;
            match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    return Some(Err(anyhow!(
                        "failed to read {} line {}: {e}",
                        self.path.display(),
                        self.line_no
                    )))
                }
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(serde_json::from_str(trimmed).map_err(|e| {
                anyhow!(
                    "malformed chunk record at {} line {}: {e}",
                    self.path.display(),
                    self.line_no
                )
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunk_id, document_id, Provenance};

    fn sample_chunk(doc: &str, index: usize, text: &str) -> ChunkDto {
        let document_id = document_id(doc);
        ChunkDto {
            chunk_id: chunk_id(&document_id, index, text),
            document_id,
            index,
            text: text.to_string(),
            provenance: Provenance {
                source_path: doc.to_string(),
                ..Provenance::default()
            },
        }
    }

    #[test]
    fn append_then_iter_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ChunkStore::open(dir.path().join("chunks.jsonl"));

        let chunks = vec![
            sample_chunk("a.md", 0, "Alice is a person."),
            sample_chunk("a.md", 1, "Bob knows Alice."),
        ];
        assert_eq!(store.append_many(&chunks).expect("append"), 2);

        let read: Vec<ChunkDto> = store
            .iter()
            .expect("iter")
            .collect::<Result<_>>()
            .expect("all records parse");
        assert_eq!(read, chunks);
        assert_eq!(store.count().expect("count"), 2);
    }

    #[test]
    fn reopen_preserves_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chunks.jsonl");

        ChunkStore::open(&path)
            .append_many(&[sample_chunk("a.md", 0, "first session")])
            .expect("first append");
        ChunkStore::open(&path)
            .append_many(&[sample_chunk("a.md", 1, "second session")])
            .expect("second append");

        let store = ChunkStore::open(&path);
        assert_eq!(store.count().expect("count"), 2);
        let read = store.read_all().expect("read_all");
        assert_eq!(read[0].text, "first session");
        assert_eq!(read[1].text, "second session");
    }

    #[test]
    fn iter_is_restartable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ChunkStore::open(dir.path().join("chunks.jsonl"));
        store
            .append_many(&[sample_chunk("a.md", 0, "only chunk")])
            .expect("append");

        assert_eq!(store.iter().expect("first pass").count(), 1);
        assert_eq!(store.iter().expect("second pass").count(), 1);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ChunkStore::open(dir.path().join("absent.jsonl"));
        assert_eq!(store.count().expect("count"), 0);
    }
}
