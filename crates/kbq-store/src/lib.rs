//! Index artifact store: makes the persisted index files available in a
//! local directory, either in place (local backend) or by downloading them
//! from an S3-compatible bucket into a scoped temporary directory.
//!
//! The temporary directory belongs to the [`ArtifactStore`] and is removed
//! when the store is dropped.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use kbq_core::config::{expand_path, IndexLocator, RemoteLocator};
use kbq_core::traits::ObjectStore;
use kbq_core::types::{LocalIndexPath, OPTIONAL_ARTIFACTS, REQUIRED_ARTIFACTS};
use kbq_core::{Error, Result};

pub mod s3;
pub mod sigv4;

pub use s3::S3Client;

pub const SCRATCH_PREFIX: &str = "kbq-index-";

enum Backend {
    Local(PathBuf),
    Remote { client: Box<dyn ObjectStore>, locator: RemoteLocator, scratch: Option<TempDir> },
}

pub struct ArtifactStore {
    backend: Backend,
}

impl ArtifactStore {
    /// Validate the locator and connect the matching backend.
    pub fn from_locator(locator: &IndexLocator) -> Result<Self> {
        locator.validate()?;
        match locator {
            IndexLocator::Local { dir } => Ok(Self::local(expand_path(dir))),
            IndexLocator::Remote(remote) => {
                let client = S3Client::new(remote)?;
                debug!(endpoint = client.endpoint(), bucket = %remote.bucket, "remote artifact store configured");
                Ok(Self::remote(Box::new(client), remote.clone()))
            }
        }
    }

    pub fn local(dir: impl Into<PathBuf>) -> Self { Self { backend: Backend::Local(dir.into()) } }

    /// Remote store over an arbitrary object store; `locator` supplies the bucket and key prefix.
    pub fn remote(client: Box<dyn ObjectStore>, locator: RemoteLocator) -> Self {
        Self { backend: Backend::Remote { client, locator, scratch: None } }
    }

    /// Directory holding downloaded artifacts, once a remote store has materialized.
    pub fn scratch_dir(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Remote { scratch: Some(dir), .. } => Some(dir.path()),
            _ => None,
        }
    }

    /// Make the artifacts available locally and return their directory.
    pub fn materialize(&mut self) -> Result<LocalIndexPath> {
        match &mut self.backend {
            Backend::Local(dir) => check_local(dir),
            Backend::Remote { client, locator, scratch } => {
                if !client.bucket_exists()? {
                    return Err(Error::Connection(format!("bucket '{}' does not exist", locator.bucket)));
                }
                if scratch.is_none() {
                    let dir = tempfile::Builder::new()
                        .prefix(SCRATCH_PREFIX)
                        .tempdir()
                        .map_err(|e| Error::IndexLoad(format!("cannot create scratch directory: {e}")))?;
                    *scratch = Some(dir);
                }
                let Some(dir) = scratch.as_ref().map(|d| d.path().to_path_buf()) else {
                    return Err(Error::IndexLoad("scratch directory unavailable".to_string()));
                };

                let mut downloaded = 0usize;
                for name in REQUIRED_ARTIFACTS {
                    let key = locator.key_for(name);
                    let size = client
                        .object_size(&key)?
                        .ok_or_else(|| Error::IndexLoad(format!("required artifact {name} not found at '{key}'")))?;
                    downloaded += usize::from(sync_object(&**client, &key, size, &dir.join(name))?);
                }
                for name in OPTIONAL_ARTIFACTS {
                    let key = locator.key_for(name);
                    match client.object_size(&key)? {
                        Some(size) => downloaded += usize::from(sync_object(&**client, &key, size, &dir.join(name))?),
                        None => debug!(artifact = name, "optional artifact absent, skipped"),
                    }
                }
                info!(bucket = %locator.bucket, downloaded, dir = %dir.display(), "index artifacts materialized");
                Ok(LocalIndexPath::new(dir))
            }
        }
    }
}

/// Download `key` unless `dest` already holds an object of the same size.
fn sync_object(client: &dyn ObjectStore, key: &str, size: u64, dest: &Path) -> Result<bool> {
    if fs::metadata(dest).map(|m| m.len() == size).unwrap_or(false) {
        debug!(key, size, "local copy up to date, download skipped");
        return Ok(false);
    }
    let written = client.fetch(key, dest)?;
    debug!(key, written, "artifact downloaded");
    Ok(true)
}

fn check_local(dir: &Path) -> Result<LocalIndexPath> {
    if !dir.is_dir() {
        return Err(Error::IndexLoad(format!("index directory {} does not exist", dir.display())));
    }
    for name in REQUIRED_ARTIFACTS {
        if !dir.join(name).is_file() {
            return Err(Error::IndexLoad(format!("required artifact {name} missing from {}", dir.display())));
        }
    }
    debug!(dir = %dir.display(), "using local index directory");
    Ok(LocalIndexPath::new(dir))
}
