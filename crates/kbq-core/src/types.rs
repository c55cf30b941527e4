//! Domain types shared by the store, index, reranker and query service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Error;

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

/// Metadata key holding the original document path.
pub const META_FILE_PATH: &str = "file_path";
/// Metadata key holding the original document file name.
pub const META_FILE_NAME: &str = "file_name";

/// Persisted files an index cannot be loaded without.
pub const REQUIRED_ARTIFACTS: [&str; 3] = ["index_store.json", "default__vector_store.json", "docstore.json"];
/// Persisted files copied alongside the required set when present.
pub const OPTIONAL_ARTIFACTS: [&str; 2] = ["graph_store.json", "image__vector_store.json"];

/// Default number of references returned per query.
pub const DEFAULT_TOP_K: usize = 5;

/// An indexed unit of text.
///
/// - `id`: globally unique chunk identifier (the node id of the index)
/// - `text`: the text payload
/// - `embedding`: vector produced when the index was built
/// - `metadata`: string metadata, normally including `file_path` and `file_name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Meta,
}

impl Chunk {
    pub fn file_path(&self) -> Option<&str> {
        self.metadata.get(META_FILE_PATH).map(String::as_str).filter(|p| !p.is_empty())
    }

    /// `file_name` metadata, falling back to the basename of `file_path`.
    pub fn file_name(&self) -> Option<&str> {
        if let Some(name) = self.metadata.get(META_FILE_NAME).filter(|n| !n.is_empty()) {
            return Some(name.as_str());
        }
        self.file_path().map(basename)
    }
}

/// Last path component, accepting both `/` and `\` separators.
pub fn basename(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path)
}

/// Local directory holding a complete set of index artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIndexPath(PathBuf);

impl LocalIndexPath {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self(dir.into()) }

    pub fn as_path(&self) -> &Path { &self.0 }

    pub fn artifact(&self, file_name: &str) -> PathBuf { self.0.join(file_name) }
}

/// A chunk paired with its similarity to the current query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// A scored chunk after source identification. Lives for one query.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Arc<Chunk>,
    pub similarity_score: f32,
    pub source_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "query")]
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, alias = "diagnostic_mode")]
    pub diagnostic: bool,
}

fn default_top_k() -> usize { DEFAULT_TOP_K }

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), context: None, top_k: DEFAULT_TOP_K, diagnostic: false }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: bool) -> Self {
        self.diagnostic = diagnostic;
        self
    }
}

/// Summary of one selected candidate as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub source_label: String,
    pub file_name: String,
    pub file_path: String,
    pub similarity_score: f64,
    pub text_preview: String,
    pub node_id: String,
}

/// Outcome of a query. `sources_count` always equals `references.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub references: Vec<Reference>,
    pub sources_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn new(answer: String, references: Vec<Reference>) -> Self {
        let sources_count = references.len();
        Self { answer, references, sources_count, error: None }
    }

    pub fn failure(error: &Error) -> Self {
        Self { answer: String::new(), references: Vec::new(), sources_count: 0, error: Some(error.to_string()) }
    }

    pub fn is_error(&self) -> bool { self.error.is_some() }
}

/// Lifecycle of a query service. Set once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Ready,
    Error(Error),
}

impl ServiceState {
    pub fn is_ready(&self) -> bool { matches!(self, ServiceState::Ready) }
}
