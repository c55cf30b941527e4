use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use kbq_core::types::{Chunk, ChunkId, LocalIndexPath};
use kbq_core::{Error, Result};

pub mod schema;
pub mod search;
pub mod writer;

pub use writer::write_artifacts;

use schema::{
    flatten_metadata, node_data, object_at, parse_vector, read_json, DOCSTORE_DATA, DOCSTORE_FILE, EMBEDDING_DICT,
    INDEX_STORE_DATA, INDEX_STORE_FILE, VECTOR_STORE_FILE,
};

/// Read-only in-memory index of embedded chunks, in insertion order.
#[derive(Debug)]
pub struct VectorIndex {
    chunks: Vec<Arc<Chunk>>,
    norms: Vec<f32>,
    by_id: HashMap<ChunkId, usize>,
    dim: usize,
}

impl VectorIndex {
    /// Load the persisted index under `path`.
    pub fn load(path: &LocalIndexPath) -> Result<Self> {
        let index_store = read_json(path, INDEX_STORE_FILE)?;
        let indexes = object_at(&index_store, INDEX_STORE_DATA, INDEX_STORE_FILE)?;
        if indexes.is_empty() {
            return Err(Error::IndexLoad(format!("{INDEX_STORE_FILE} contains no index")));
        }

        let vector_store = read_json(path, VECTOR_STORE_FILE)?;
        let embeddings = object_at(&vector_store, EMBEDDING_DICT, VECTOR_STORE_FILE)?;
        let docstore = read_json(path, DOCSTORE_FILE)?;
        let records = object_at(&docstore, DOCSTORE_DATA, DOCSTORE_FILE)?;

        let mut chunks = Vec::with_capacity(embeddings.len());
        for (id, vector) in embeddings {
            let record = records
                .get(id)
                .ok_or_else(|| Error::IndexLoad(format!("embedding '{id}' has no {DOCSTORE_FILE} record")))?;
            let data = node_data(id, record)?;
            let text = data
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::IndexLoad(format!("docstore record '{id}' has no text")))?;
            chunks.push(Chunk {
                id: id.clone(),
                text: text.to_string(),
                embedding: parse_vector(id, vector)?,
                metadata: flatten_metadata(&data),
            });
        }
        debug!(indexes = indexes.len(), records = records.len(), "parsed index artifacts");

        let index = Self::from_chunks(chunks)?;
        info!(chunks = index.len(), dim = index.dim(), dir = %path.as_path().display(), "vector index loaded");
        Ok(index)
    }

    /// Build from chunks already in memory. Dimensions must agree across chunks.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Result<Self> {
        let dim = chunks.first().map_or(0, |c| c.embedding.len());
        let mut by_id = HashMap::with_capacity(chunks.len());
        let mut norms = Vec::with_capacity(chunks.len());
        for (pos, chunk) in chunks.iter().enumerate() {
            if chunk.embedding.is_empty() {
                return Err(Error::IndexLoad(format!("chunk '{}' has an empty embedding", chunk.id)));
            }
            if chunk.embedding.len() != dim {
                return Err(Error::IndexLoad(format!(
                    "dimension mismatch: chunk '{}' has {} dimensions, expected {dim}",
                    chunk.id,
                    chunk.embedding.len()
                )));
            }
            if by_id.insert(chunk.id.clone(), pos).is_some() {
                return Err(Error::IndexLoad(format!("duplicate chunk id '{}'", chunk.id)));
            }
            norms.push(search::l2_norm(&chunk.embedding));
        }
        Ok(Self { chunks: chunks.into_iter().map(Arc::new).collect(), norms, by_id, dim })
    }

    /// Embedding dimensionality; 0 for an empty index.
    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    pub fn get(&self, id: &str) -> Option<&Chunk> { self.by_id.get(id).map(|&i| self.chunks[i].as_ref()) }

    /// Chunk ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ { self.chunks.iter().map(|c| c.id.as_str()) }
}
