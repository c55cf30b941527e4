use std::collections::HashMap;
use std::fs;
use std::path::Path;

use kbq_core::config::{IndexLocator, RemoteLocator};
use kbq_core::types::{Chunk, META_FILE_PATH};
use kbq_core::Error;
use kbq_store::{ArtifactStore, SCRATCH_PREFIX};
use kbq_vector::{write_artifacts, VectorIndex};

mod common;
use common::MemoryObjectStore;

fn chunks() -> Vec<Chunk> {
    ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let mut metadata = HashMap::new();
            metadata.insert(META_FILE_PATH.to_string(), format!("/kb/{id}.txt"));
            let mut embedding = vec![0.0; 4];
            embedding[i] = 1.0;
            Chunk { id: id.to_string(), text: format!("chunk {id}"), embedding, metadata }
        })
        .collect()
}

fn locator(prefix: &str) -> RemoteLocator {
    RemoteLocator {
        bucket: "kb".to_string(),
        account_id: Some("acct".to_string()),
        access_key_id: "key".to_string(),
        secret_access_key: "secret".to_string(),
        prefix: prefix.to_string(),
        ..RemoteLocator::default()
    }
}

fn seeded_bucket(source: &Path, prefix: &str) -> anyhow::Result<MemoryObjectStore> {
    write_artifacts(source, &chunks())?;
    let bucket = MemoryObjectStore::new();
    bucket.put_dir(source, prefix)?;
    Ok(bucket)
}

#[test]
fn remote_round_trip_matches_local_load() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    let bucket = seeded_bucket(source.path(), "/indexes/v1/")?;

    let mut remote = ArtifactStore::remote(Box::new(bucket), locator("indexes/v1"));
    let remote_index = VectorIndex::load(&remote.materialize()?)?;
    let local_index = VectorIndex::load(&ArtifactStore::local(source.path()).materialize()?)?;

    assert_eq!(remote_index.len(), local_index.len());
    assert_eq!(remote_index.ids().collect::<Vec<_>>(), local_index.ids().collect::<Vec<_>>());
    Ok(())
}

#[test]
fn scratch_directory_is_removed_on_drop() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    let bucket = seeded_bucket(source.path(), "")?;
    let mut store = ArtifactStore::remote(Box::new(bucket), locator(""));

    let path = store.materialize()?;
    let scratch = path.as_path().to_path_buf();
    let dir_name = scratch.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    assert!(dir_name.starts_with(SCRATCH_PREFIX), "{dir_name}");
    assert!(scratch.join("docstore.json").is_file());

    drop(store);
    assert!(!scratch.exists());
    Ok(())
}

#[test]
fn scratch_directory_is_removed_after_failed_materialize() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    let bucket = seeded_bucket(source.path(), "")?;
    bucket.remove("docstore.json");
    let mut store = ArtifactStore::remote(Box::new(bucket), locator(""));

    assert!(store.materialize().is_err());
    let scratch = store.scratch_dir().map(Path::to_path_buf).expect("scratch created before failure");
    drop(store);
    assert!(!scratch.exists());
    Ok(())
}

#[test]
fn rematerialize_skips_unchanged_objects() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    let bucket = seeded_bucket(source.path(), "")?;
    let mut store = ArtifactStore::remote(Box::new(bucket.clone()), locator(""));

    let first = store.materialize()?;
    assert_eq!(bucket.fetch_count(), 3);
    let second = store.materialize()?;
    assert_eq!(first, second);
    assert_eq!(bucket.fetch_count(), 3, "same-size objects are not downloaded again");

    bucket.put("docstore.json", r#"{"docstore/data":{}}"#);
    store.materialize()?;
    assert_eq!(bucket.fetch_count(), 4, "changed object is downloaded");
    Ok(())
}

#[test]
fn optional_artifacts_are_copied_when_present() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    let bucket = seeded_bucket(source.path(), "")?;
    bucket.put("graph_store.json", r#"{"graph_dict":{}}"#);
    let mut store = ArtifactStore::remote(Box::new(bucket), locator(""));

    let path = store.materialize()?;
    assert!(path.artifact("graph_store.json").is_file());
    assert!(!path.artifact("image__vector_store.json").exists());
    Ok(())
}

#[test]
fn missing_remote_artifact_is_named() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    let bucket = seeded_bucket(source.path(), "p")?;
    bucket.remove("p/default__vector_store.json");
    let mut store = ArtifactStore::remote(Box::new(bucket), locator("p"));

    let Err(Error::IndexLoad(msg)) = store.materialize() else { panic!("expected index load error") };
    assert!(msg.contains("default__vector_store.json"), "{msg}");
    Ok(())
}

#[test]
fn missing_bucket_is_connection_error() {
    let mut store = ArtifactStore::remote(Box::new(MemoryObjectStore::without_bucket()), locator(""));
    assert!(matches!(store.materialize(), Err(Error::Connection(_))));
}

#[test]
fn local_directory_must_hold_required_artifacts() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    write_artifacts(source.path(), &chunks())?;
    fs::remove_file(source.path().join("index_store.json"))?;

    let Err(Error::IndexLoad(msg)) = ArtifactStore::local(source.path()).materialize() else {
        panic!("expected index load error");
    };
    assert!(msg.contains("index_store.json"), "{msg}");

    let missing = source.path().join("nope");
    assert!(matches!(ArtifactStore::local(missing).materialize(), Err(Error::IndexLoad(_))));
    Ok(())
}

#[test]
fn incomplete_remote_locator_is_config_error() {
    let partial = RemoteLocator { bucket: "kb".to_string(), ..RemoteLocator::default() };
    let Err(Error::Config(msg)) = ArtifactStore::from_locator(&IndexLocator::Remote(partial)) else {
        panic!("expected config error");
    };
    assert!(msg.contains("index.access_key_id"), "{msg}");
}
