use std::path::Path;

use crate::error::Result;
use crate::types::ScoredChunk;

pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `openai:text-embedding-3-small:d1536`).
    fn id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    /// Embed one query text. Failures surface as `Error::Embedding`.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

pub trait Retriever: Send + Sync {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
    /// Return at most `breadth` chunks, best first. Equal scores keep index order.
    fn retrieve(&self, query_vec: &[f32], breadth: usize) -> Result<Vec<ScoredChunk>>;
}

/// Read access to one bucket of an S3-compatible object store.
pub trait ObjectStore: Send + Sync {
    fn bucket_exists(&self) -> Result<bool>;
    /// Size in bytes, or `None` when the key does not exist.
    fn object_size(&self, key: &str) -> Result<Option<u64>>;
    /// Download `key` to `dest`, replacing any existing file. Returns bytes written.
    fn fetch(&self, key: &str, dest: &Path) -> Result<u64>;
}
