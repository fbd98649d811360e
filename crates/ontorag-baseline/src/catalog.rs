//! Catalog directory: baseline TTL files plus a `catalog.json` manifest.
//!
//! The manifest is an object mapping baseline id → entry, kept sorted by
//! id. Registration copies the TTL into the directory and auto-detects the
//! namespace from the declared terms when none is given.

use crate::{import_turtle_file, BaselineImport};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "catalog.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// TTL file name, relative to the catalog directory.
    pub path: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    dir: PathBuf,
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Open a catalog directory. A missing manifest reads as an empty
    /// catalog; nothing is created until the first registration.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let manifest = dir.join(MANIFEST_FILE);
        let entries = if manifest.exists() {
            let text = std::fs::read_to_string(&manifest)
                .with_context(|| format!("failed to read {}", manifest.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", manifest.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { dir, entries })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &BTreeMap<String, CatalogEntry> {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Copy `source` into the catalog, detect its namespace, and record it
    /// in the manifest under `id` (replacing any previous registration).
    pub fn register(
        &mut self,
        id: &str,
        source: &Path,
        label: &str,
        description: &str,
        tags: Vec<String>,
        namespace: Option<String>,
    ) -> Result<CatalogEntry> {
        if id.is_empty() {
            return Err(anyhow!("baseline id must not be empty"));
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let file_name = format!("{id}.ttl");
        let dest = self.dir.join(&file_name);
        std::fs::copy(source, &dest).with_context(|| {
            format!("failed to copy {} into {}", source.display(), dest.display())
        })?;

        let detected = import_turtle_file(&dest, id)?.namespace;
        let entry = CatalogEntry {
            path: file_name,
            label: label.to_string(),
            description: description.to_string(),
            tags,
            namespace: namespace.or(detected).unwrap_or_default(),
        };
        self.entries.insert(id.to_string(), entry.clone());
        self.save()?;
        Ok(entry)
    }

    /// Parse a registered baseline into an origin-tagged proposal.
    pub fn import(&self, id: &str) -> Result<BaselineImport> {
        let entry = self
            .get(id)
            .ok_or_else(|| anyhow!("unknown baseline id '{id}' in {}", self.dir.display()))?;
        import_turtle_file(&self.dir.join(&entry.path), id)
    }

    fn save(&self) -> Result<()> {
        let manifest = self.dir.join(MANIFEST_FILE);
        let mut text = serde_json::to_string_pretty(&self.entries)?;
        text.push('\n');
        std::fs::write(&manifest, text)
            .with_context(|| format!("failed to write {}", manifest.display()))
    }
}
