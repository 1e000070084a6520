//! Persistence collaborator.
//!
//! The core treats persistence as an opaque, key-indexed durable byte store.
//! [`FileDatastore`] keeps one file per key under a caller-supplied root
//! directory; [`MemoryDatastore`] is for tests and embedding.

use crate::{PsiCashError, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Durable key-indexed byte store.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync).
pub trait Datastore: Send + Sync {
    /// Retrieve a value, or `None` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value. When this returns `Ok`, the value is durable.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a value. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// All stored keys.
    fn keys(&self) -> Result<Vec<String>>;

    /// Delete every stored value.
    fn clear(&self) -> Result<()> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }
}

const LOCK_FILE: &str = ".lock";
const FILE_PREFIX: &str = "psicash.";

/// File-backed datastore rooted at a directory.
///
/// Each key maps to `<root>/psicash.<key><suffix>.json`. Writes go to a
/// temp file that is fsynced and renamed over the target, while holding an
/// exclusive `fs2` lock on `<root>/.lock`.
#[derive(Debug)]
pub struct FileDatastore {
    root: PathBuf,
    suffix: String,
}

impl FileDatastore {
    /// Open a datastore under an existing directory.
    ///
    /// `suffix` keeps separate data sets (e.g. production and test) apart
    /// under the same root.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if `root` is missing, not a directory, or not
    /// writable.
    pub fn open(root: impl Into<PathBuf>, suffix: &str) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(PsiCashError::Storage(format!(
                "file store root is not a directory: {}",
                root.display()
            )));
        }
        if suffix.contains(['/', '\\']) {
            return Err(PsiCashError::invalid_argument(
                "suffix",
                "must not contain path separators",
            ));
        }

        let store = Self {
            root,
            suffix: suffix.to_string(),
        };
        // Fail at initialize if the root is not writable.
        store.lock_file()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(PsiCashError::invalid_argument(
                "key",
                format!("'{}' is not a valid datastore key", key),
            ));
        }
        Ok(self
            .root
            .join(format!("{}{}{}.json", FILE_PREFIX, key, self.suffix)))
    }

    fn key_for(&self, file_name: &str) -> Option<String> {
        let stem = file_name.strip_prefix(FILE_PREFIX)?;
        let stem = stem.strip_suffix(".json")?;
        let key = stem.strip_suffix(self.suffix.as_str())?;
        (!key.is_empty() && !key.contains('.')).then(|| key.to_string())
    }

    fn lock_file(&self) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;
        Ok(file)
    }

    /// Run `f` while holding the exclusive lock.
    fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.lock_file()?;
        FileExt::lock_exclusive(&lock).map_err(|e| {
            PsiCashError::Storage(format!("could not lock {}: {}", self.root.display(), e))
        })?;

        let result = f();

        // Unlocked on every path, including a failed write.
        if let Err(e) = FileExt::unlock(&lock) {
            tracing::warn!(root = %self.root.display(), error = %e, "datastore unlock failed");
        }
        result
    }
}

impl Datastore for FileDatastore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        self.with_lock(|| match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        })
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension(format!("json.tmp{:08x}", rand::random::<u32>()));

        self.with_lock(|| {
            let write = || -> Result<()> {
                let mut file = File::create(&tmp)?;
                file.write_all(value)?;
                file.sync_all()?;
                fs::rename(&tmp, &path)?;
                Ok(())
            };
            let result = write();
            if result.is_err() {
                let _ = fs::remove_file(&tmp);
            }
            result
        })
        .inspect_err(|e| tracing::error!(key, error = %e, "datastore write failed"))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        self.with_lock(|| match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(key) = entry.file_name().to_str().and_then(|n| self.key_for(n)) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory datastore for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = data.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
