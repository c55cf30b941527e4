//! Source catalog and the identifier that maps chunks onto canonical labels.
//!
//! Entries are matched in declaration order against the lowercased basename
//! of a chunk's `file_path`, so the first entry whose keyword is a substring
//! wins.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{basename, Candidate, Chunk, ScoredChunk};

/// Label for chunks whose file path matches no catalog entry.
pub const OTHER_SOURCE: &str = "other";
/// Label for chunks without any `file_path` metadata.
pub const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl SourceEntry {
    pub fn new<I, S>(name: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: name.into(), display_name: None, keywords: keywords.into_iter().map(Into::into).collect() }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceCatalog {
    entries: Vec<SourceEntry>,
}

impl SourceCatalog {
    /// Builds a validated catalog. Keywords are trimmed and blank ones dropped.
    pub fn new(entries: Vec<SourceEntry>) -> Result<Self> {
        let catalog = Self {
            entries: entries
                .into_iter()
                .map(|mut e| {
                    e.keywords = e.keywords.iter().map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect();
                    e
                })
                .collect(),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn entries(&self) -> &[SourceEntry] { &self.entries }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(Error::Config("source catalog entry with empty name".to_string()));
            }
            if name == OTHER_SOURCE || name == UNKNOWN_SOURCE {
                return Err(Error::Config(format!("source name '{name}' is reserved")));
            }
            if !seen.insert(name) {
                return Err(Error::Config(format!("duplicate source name '{name}'")));
            }
        }
        Ok(())
    }

    /// Canonical label for a file path.
    pub fn identify_path(&self, file_path: Option<&str>) -> &str {
        let Some(path) = file_path.filter(|p| !p.trim().is_empty()) else { return UNKNOWN_SOURCE };
        let file_name = basename(path).to_lowercase();
        for entry in &self.entries {
            if entry.keywords.iter().any(|k| file_name.contains(&k.to_lowercase())) {
                return &entry.name;
            }
        }
        OTHER_SOURCE
    }

    pub fn identify(&self, chunk: &Chunk) -> &str { self.identify_path(chunk.file_path()) }

    /// Attach source labels to retriever output, preserving order.
    pub fn label(&self, hits: Vec<ScoredChunk>) -> Vec<Candidate> {
        hits.into_iter()
            .map(|hit| {
                let source_label = self.identify(&hit.chunk).to_string();
                Candidate { chunk: hit.chunk, similarity_score: hit.score, source_label }
            })
            .collect()
    }

    /// Human-readable name for a label, used when assembling answers.
    pub fn display_name<'a>(&'a self, label: &'a str) -> &'a str {
        if let Some(entry) = self.entries.iter().find(|e| e.name == label) {
            return entry.display_name.as_deref().unwrap_or(&entry.name);
        }
        if label == OTHER_SOURCE { "Other sources" } else { label }
    }
}
