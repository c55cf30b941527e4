//! In-process object store shared by the store tests.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kbq_core::traits::ObjectStore;
use kbq_core::{Error, Result};

#[derive(Default)]
struct Inner {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    missing_bucket: bool,
}

/// In-process object store. Clones share contents, so a test can keep a
/// handle and mutate objects after giving one to an `ArtifactStore`.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self { Self::default() }

    /// A store whose bucket does not exist.
    pub fn without_bucket() -> Self { Self { inner: Arc::new(Inner { missing_bucket: true, ..Inner::default() }) } }

    pub fn put(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects().insert(key.into(), bytes.into());
    }

    /// Upload every regular file in `dir` under `prefix`.
    pub fn put_dir(&self, dir: &Path, prefix: &str) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() { continue; }
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if prefix.is_empty() { name } else { format!("{}/{name}", prefix.trim_matches('/')) };
            self.put(key, fs::read(entry.path())?);
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) { self.objects().remove(key); }

    /// Number of completed `fetch` calls.
    pub fn fetch_count(&self) -> usize { self.inner.fetches.load(Ordering::SeqCst) }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.inner.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn bucket_exists(&self) -> Result<bool> { Ok(!self.inner.missing_bucket) }

    fn object_size(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.objects().get(key).map(|b| b.len() as u64))
    }

    fn fetch(&self, key: &str, dest: &Path) -> Result<u64> {
        let bytes = self.objects().get(key).cloned().ok_or_else(|| Error::IndexLoad(format!("object '{key}' not found")))?;
        fs::write(dest, &bytes).map_err(|e| Error::IndexLoad(format!("cannot write {}: {e}", dest.display())))?;
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(bytes.len() as u64)
    }
}
