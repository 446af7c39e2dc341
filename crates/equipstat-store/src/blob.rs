//! Blob storage for uploaded dataset files
//!
//! Directory layout:
//! ```text
//! {base}/
//! └── datasets/
//!     ├── readings.csv
//!     ├── readings_1a2b3c4d.csv   # same upload name, different bytes
//!     └── 9f3c...-17.tmp          # in-flight write (swept if stale)
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::hash;

/// Subdirectory (and handle prefix) holding dataset blobs.
pub const BLOB_DIR: &str = "datasets";

/// Fallback file name when the upload name has no usable base name.
const DEFAULT_NAME: &str = "upload.csv";

/// Opaque reference to stored bytes: `datasets/<file name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobHandle(String);

impl BlobHandle {
    fn for_file(file_name: &str) -> Self {
        Self(format!("{BLOB_DIR}/{file_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base file name of the stored blob.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable byte storage addressed by [`BlobHandle`].
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a name derived from `name`, never overwriting an existing blob.
    fn put(&self, name: &str, bytes: &[u8]) -> StoreResult<BlobHandle>;

    /// Read back a blob's bytes.
    fn read(&self, handle: &BlobHandle) -> StoreResult<Vec<u8>>;

    /// Resolve a handle to its on-disk path.
    fn path(&self, handle: &BlobHandle) -> StoreResult<PathBuf>;

    /// Delete a blob. Returns `false` when it was already absent.
    fn delete(&self, handle: &BlobHandle) -> StoreResult<bool>;

    /// All committed blobs, sorted by handle.
    fn list(&self) -> StoreResult<Vec<BlobHandle>>;

    /// Remove leftover `.tmp` files from interrupted writes. Returns their names.
    fn cleanup_tmp(&self) -> StoreResult<Vec<String>>;
}

/// Filesystem-backed [`BlobStore`].
#[derive(Debug)]
pub struct FsBlobStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FsBlobStore {
    /// Create a blob store rooted at `base` (blobs live in `base/datasets`).
    pub fn new(base: &Path) -> StoreResult<Self> {
        let dir = base.join(BLOB_DIR);
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::io(format!("failed to create blob dir {}", dir.display()), e)
        })?;
        Ok(Self {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn tmp_path(&self, digest: &str) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("{digest}-{}-{seq}.tmp", std::process::id()))
    }
}

/// Reduce an upload name to a safe base file name.
fn base_name(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." || base.ends_with(".tmp") {
        DEFAULT_NAME
    } else {
        base
    }
}

/// Candidate file names for `base`: as-is, then hash-suffixed, then counted.
fn candidate_name(base: &str, short: &str, attempt: usize) -> String {
    if attempt == 0 {
        return base.to_string();
    }
    let (stem, ext) = match base.rfind('.') {
        Some(i) if i > 0 => (&base[..i], &base[i..]),
        _ => (base, ""),
    };
    if attempt == 1 {
        format!("{stem}_{short}{ext}")
    } else {
        format!("{stem}_{short}_{attempt}{ext}")
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, name: &str, bytes: &[u8]) -> StoreResult<BlobHandle> {
        let base = base_name(name);
        let short = hash::short_hash(&hash::hash_bytes(bytes));

        // hard_link refuses an existing target: a put never replaces another blob
        let tmp = self.tmp_path(&short);
        fs::write(&tmp, bytes)
            .map_err(|e| StoreError::io(format!("failed to write {}", tmp.display()), e))?;

        let mut attempt = 0;
        let result = loop {
            let file_name = candidate_name(base, &short, attempt);
            let target = self.dir.join(&file_name);
            match fs::hard_link(&tmp, &target) {
                Ok(()) => break Ok(BlobHandle::for_file(&file_name)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    break Err(StoreError::io(
                        format!("failed to link {} → {}", tmp.display(), target.display()),
                        e,
                    ))
                }
            }
        };

        if let Err(e) = fs::remove_file(&tmp) {
            log::warn!("blob: failed to remove {}: {e}", tmp.display());
        }
        let handle = result?;
        log::debug!("blob: stored {} ({} bytes)", handle, bytes.len());
        Ok(handle)
    }

    fn read(&self, handle: &BlobHandle) -> StoreResult<Vec<u8>> {
        let path = self.path(handle)?;
        fs::read(&path).map_err(|e| StoreError::io(format!("failed to read {}", path.display()), e))
    }

    fn path(&self, handle: &BlobHandle) -> StoreResult<PathBuf> {
        let file_name = handle
            .as_str()
            .strip_prefix(BLOB_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StoreError::InvalidHandle(handle.to_string()))?;
        if file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name == "."
            || file_name == ".."
        {
            return Err(StoreError::InvalidHandle(handle.to_string()));
        }
        Ok(self.dir.join(file_name))
    }

    fn delete(&self, handle: &BlobHandle) -> StoreResult<bool> {
        let path = self.path(handle)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(
                format!("failed to delete {}", path.display()),
                e,
            )),
        }
    }

    fn list(&self) -> StoreResult<Vec<BlobHandle>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            StoreError::io(format!("failed to list {}", self.dir.display()), e)
        })?;

        let mut handles = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| StoreError::io(format!("failed to list {}", self.dir.display()), e))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // Skip in-flight writes
            if name.ends_with(".tmp") {
                continue;
            }
            handles.push(BlobHandle::for_file(&name));
        }
        handles.sort();
        Ok(handles)
    }

    fn cleanup_tmp(&self) -> StoreResult<Vec<String>> {
        let pattern = self.dir.join("*.tmp");
        let pattern_str = pattern.to_string_lossy();

        let mut removed = Vec::new();
        let paths = glob::glob(&pattern_str)
            .map_err(|e| StoreError::io("invalid glob pattern", std::io::Error::other(e)))?;
        for path in paths.filter_map(|p| p.ok()).filter(|p| p.is_file()) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StoreError::io(
                        format!("failed to remove {}", path.display()),
                        e,
                    ))
                }
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            log::info!("blob: removed stale tmp {name}");
            removed.push(name);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();
        (dir, blobs)
    }

    #[test]
    fn new_creates_blob_dir() {
        let (dir, blobs) = store();
        assert!(dir.path().join(BLOB_DIR).is_dir());
        assert_eq!(blobs.dir(), dir.path().join(BLOB_DIR));
    }

    #[test]
    fn put_and_read() {
        let (_dir, blobs) = store();
        let handle = blobs.put("readings.csv", b"a,b\n1,2\n").unwrap();
        assert_eq!(handle.as_str(), "datasets/readings.csv");
        assert_eq!(handle.file_name(), "readings.csv");
        assert_eq!(blobs.read(&handle).unwrap(), b"a,b\n1,2\n");
        assert!(blobs.path(&handle).unwrap().is_file());
    }

    #[test]
    fn put_strips_directories_from_name() {
        let (_dir, blobs) = store();
        let handle = blobs.put("../../etc/readings.csv", b"x").unwrap();
        assert_eq!(handle.as_str(), "datasets/readings.csv");
        let handle = blobs.put(r"C:\Users\me\plant.csv", b"y").unwrap();
        assert_eq!(handle.file_name(), "plant.csv");
    }

    #[test]
    fn put_empty_name_falls_back() {
        let (_dir, blobs) = store();
        let handle = blobs.put("", b"x").unwrap();
        assert_eq!(handle.file_name(), DEFAULT_NAME);
        let handle = blobs.put("dir/", b"y").unwrap();
        assert_ne!(handle.file_name(), "");
    }

    #[test]
    fn put_same_name_never_overwrites() {
        let (_dir, blobs) = store();
        let h1 = blobs.put("data.csv", b"first").unwrap();
        let h2 = blobs.put("data.csv", b"second").unwrap();
        let h3 = blobs.put("data.csv", b"second").unwrap();

        assert_eq!(h1.file_name(), "data.csv");
        let short = hash::short_hash(&hash::hash_bytes(b"second"));
        assert_eq!(h2.file_name(), format!("data_{short}.csv"));
        assert_eq!(h3.file_name(), format!("data_{short}_2.csv"));

        assert_eq!(blobs.read(&h1).unwrap(), b"first");
        assert_eq!(blobs.read(&h2).unwrap(), b"second");
        assert_eq!(blobs.list().unwrap().len(), 3);
    }

    #[test]
    fn put_leaves_no_tmp_files() {
        let (_dir, blobs) = store();
        blobs.put("a.csv", b"x").unwrap();
        blobs.put("a.csv", b"x").unwrap();
        let leftovers: Vec<_> = fs::read_dir(blobs.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, blobs) = store();
        let handle = blobs.put("a.csv", b"x").unwrap();
        assert!(blobs.delete(&handle).unwrap());
        assert!(!blobs.delete(&handle).unwrap());
        assert!(blobs.read(&handle).unwrap_err().is_not_found());
    }

    #[test]
    fn path_rejects_foreign_handles() {
        let (_dir, blobs) = store();
        for raw in ["other/a.csv", "datasets/../a.csv", "datasets/", "datasets/x/y.csv", "a.csv"] {
            let handle: BlobHandle = serde_json::from_str(&format!("\"{raw}\"")).unwrap();
            assert!(
                matches!(blobs.path(&handle), Err(StoreError::InvalidHandle(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn list_skips_tmp_and_sorts() {
        let (_dir, blobs) = store();
        blobs.put("b.csv", b"b").unwrap();
        blobs.put("a.csv", b"a").unwrap();
        fs::write(blobs.dir().join("deadbeef-1-0.tmp"), b"partial").unwrap();

        let names: Vec<_> = blobs
            .list()
            .unwrap()
            .iter()
            .map(|h| h.file_name().to_string())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn cleanup_tmp_removes_only_tmp() {
        let (_dir, blobs) = store();
        let handle = blobs.put("keep.csv", b"keep").unwrap();
        fs::write(blobs.dir().join("aaa.tmp"), b"x").unwrap();
        fs::write(blobs.dir().join("bbb.tmp"), b"y").unwrap();

        let mut removed = blobs.cleanup_tmp().unwrap();
        removed.sort();
        assert_eq!(removed, vec!["aaa.tmp", "bbb.tmp"]);
        assert!(blobs.path(&handle).unwrap().exists());
        assert!(blobs.cleanup_tmp().unwrap().is_empty());
    }

    #[test]
    fn candidate_names() {
        assert_eq!(candidate_name("data.csv", "abcd1234", 0), "data.csv");
        assert_eq!(candidate_name("data.csv", "abcd1234", 1), "data_abcd1234.csv");
        assert_eq!(candidate_name("data.csv", "abcd1234", 3), "data_abcd1234_3.csv");
        assert_eq!(candidate_name("README", "abcd1234", 1), "README_abcd1234");
        assert_eq!(candidate_name(".hidden", "abcd1234", 1), ".hidden_abcd1234");
    }
}
