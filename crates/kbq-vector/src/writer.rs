use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::info;

use kbq_core::types::{Chunk, META_FILE_PATH};

use crate::schema::{
    DOCSTORE_DATA, DOCSTORE_FILE, DOCSTORE_METADATA, EMBEDDING_DICT, INDEX_STORE_DATA, INDEX_STORE_FILE,
    METADATA_DICT, TEXT_ID_TO_REF_DOC_ID, VECTOR_STORE_FILE,
};

pub const INDEX_ID: &str = "kbq-vector-index";

/// Persist `chunks` under `dir` in the layout [`crate::VectorIndex::load`] reads.
pub fn write_artifacts(dir: &Path, chunks: &[Chunk]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let mut embeddings = Map::new();
    let mut ref_docs = Map::new();
    let mut meta_dict = Map::new();
    let mut records = Map::new();
    let mut record_meta = Map::new();
    let mut nodes = Map::new();

    for chunk in chunks {
        if embeddings.contains_key(&chunk.id) { bail!("duplicate chunk id '{}'", chunk.id); }
        let ref_doc = chunk.metadata.get(META_FILE_PATH).cloned().unwrap_or_else(|| chunk.id.clone());
        let metadata: Map<String, Value> =
            chunk.metadata.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();

        embeddings.insert(chunk.id.clone(), json!(chunk.embedding));
        ref_docs.insert(chunk.id.clone(), json!(ref_doc));
        meta_dict.insert(chunk.id.clone(), Value::Object(metadata.clone()));
        records.insert(
            chunk.id.clone(),
            json!({
                "__data__": { "id_": chunk.id, "text": chunk.text, "metadata": metadata },
                "__type__": "1",
            }),
        );
        record_meta.insert(
            chunk.id.clone(),
            json!({ "doc_hash": hex::encode(Sha256::digest(chunk.text.as_bytes())), "ref_doc_id": ref_doc }),
        );
        nodes.insert(chunk.id.clone(), json!(chunk.id));
    }

    let index_struct = json!({ "index_id": INDEX_ID, "summary": null, "nodes_dict": nodes, "doc_id_dict": {}, "embeddings_dict": {} });
    write_file(dir, INDEX_STORE_FILE, &json!({
        INDEX_STORE_DATA: { INDEX_ID: { "__type__": "vector_store", "__data__": index_struct.to_string() } }
    }))?;
    write_file(dir, VECTOR_STORE_FILE, &json!({
        EMBEDDING_DICT: embeddings,
        TEXT_ID_TO_REF_DOC_ID: ref_docs,
        METADATA_DICT: meta_dict,
    }))?;
    write_file(dir, DOCSTORE_FILE, &json!({ DOCSTORE_DATA: records, DOCSTORE_METADATA: record_meta }))?;

    info!(chunks = chunks.len(), dir = %dir.display(), "index artifacts written");
    Ok(())
}

fn write_file(dir: &Path, name: &str, value: &Value) -> Result<()> {
    let path = dir.join(name);
    let body = serde_json::to_string(value)?;
    fs::write(&path, body).with_context(|| format!("write {}", path.display()))
}
