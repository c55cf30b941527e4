//! On-disk layout of the persisted index (LlamaIndex "simple" storage).
//!
//! Parsing helpers here turn JSON shape problems into `Error::IndexLoad`
//! messages that name the offending file and key.

use serde_json::{Map, Value};
use std::fs;

use kbq_core::types::{LocalIndexPath, Meta};
use kbq_core::{Error, Result};

pub const INDEX_STORE_FILE: &str = "index_store.json";
pub const VECTOR_STORE_FILE: &str = "default__vector_store.json";
pub const DOCSTORE_FILE: &str = "docstore.json";

pub const INDEX_STORE_DATA: &str = "index_store/data";
pub const DOCSTORE_DATA: &str = "docstore/data";
pub const DOCSTORE_METADATA: &str = "docstore/metadata";
pub const EMBEDDING_DICT: &str = "embedding_dict";
pub const TEXT_ID_TO_REF_DOC_ID: &str = "text_id_to_ref_doc_id";
pub const METADATA_DICT: &str = "metadata_dict";

pub fn read_json(path: &LocalIndexPath, file_name: &str) -> Result<Value> {
    let full = path.artifact(file_name);
    let raw = fs::read_to_string(&full)
        .map_err(|e| Error::IndexLoad(format!("cannot read {}: {e}", full.display())))?;
    serde_json::from_str(&raw).map_err(|e| Error::IndexLoad(format!("{file_name} is not valid JSON: {e}")))
}

pub fn object_at<'a>(value: &'a Value, key: &str, file_name: &str) -> Result<&'a Map<String, Value>> {
    value
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| Error::IndexLoad(format!("{file_name} has no '{key}' object")))
}

pub fn parse_vector(id: &str, value: &Value) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::IndexLoad(format!("embedding for '{id}' is not an array")))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| Error::IndexLoad(format!("embedding for '{id}' contains a non-number")))
        })
        .collect()
}

/// Docstore `__data__` payload. Older stores persist it as a JSON string.
pub fn node_data(id: &str, record: &Value) -> Result<Value> {
    match record.get("__data__") {
        Some(Value::Object(map)) => Ok(Value::Object(map.clone())),
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| Error::IndexLoad(format!("docstore record '{id}' has unparsable __data__: {e}"))),
        _ => Err(Error::IndexLoad(format!("docstore record '{id}' has no __data__"))),
    }
}

/// Flatten node metadata to strings; nulls are dropped.
pub fn flatten_metadata(data: &Value) -> Meta {
    let mut meta = Meta::new();
    if let Some(map) = data.get("metadata").and_then(Value::as_object) {
        for (k, v) in map {
            match v {
                Value::Null => {}
                Value::String(s) => { meta.insert(k.clone(), s.clone()); }
                other => { meta.insert(k.clone(), other.to_string()); }
            }
        }
    }
    meta
}
