use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Everything but `[A-Za-z0-9._-]` is escaped, so distinct keys never share
/// a file and `/` in a key cannot create directories.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'_').remove(b'-');

/// Longest file stem written as-is.  Longer encodings keep a prefix of
/// `HASHED_PREFIX_LEN` bytes followed by `~` and the key's SHA-256.
const MAX_STEM_LEN: usize = 180;
const HASHED_PREFIX_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No content has ever been stored under `key`.  Distinct from stored
    /// empty content, which retrieves as `Ok("")`.
    #[error("no content found for key: {key}")]
    NotFound { key: String },
    #[error("knowledge store io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt knowledge record: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Durable key → content mapping.  `store` overwrites; a `retrieve` right
/// after a `store` on the same key sees the new content.
pub trait KnowledgeStore: Send + Sync {
    fn store(&self, key: &str, content: &str) -> Result<(), StoreError>;
    fn retrieve(&self, key: &str) -> Result<String, StoreError>;
    /// Forget `key`.  Removing a key that was never stored is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    content: String,
}

/// One pretty-printed `<key>.json` file per key under `root`.
#[derive(Debug, Clone)]
pub struct FileKnowledgeStore {
    root: PathBuf,
}

impl FileKnowledgeStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(key)))
    }
}

impl KnowledgeStore for FileKnowledgeStore {
    fn store(&self, key: &str, content: &str) -> Result<(), StoreError> {
        // The root may have been removed since construction.
        fs::create_dir_all(&self.root)?;

        let path = self.path_for(key);
        let record = StoredRecord {
            key: key.to_string(),
            content: content.to_string(),
        };
        let rendered = serde_json::to_string_pretty(&record)?;

        // Write to a sibling `.tmp` and rename so a crash never leaves a
        // half-written record behind.
        let tmp_path = path.with_extension("json.tmp");
        if let Err(err) = fs::write(&tmp_path, rendered) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<String, StoreError> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let record: StoredRecord = serde_json::from_str(&raw)?;
        // A hashed file name only identifies the key together with the record.
        if record.key != key {
            tracing::warn!(key = %key, found = %record.key, "knowledge record key mismatch");
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(record.content)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn file_stem(key: &str) -> String {
    let encoded = utf8_percent_encode(key, KEY_ENCODE_SET).to_string();
    if encoded.len() <= MAX_STEM_LEN {
        return encoded;
    }

    // Never cut through a `%XX` escape.
    let bytes = encoded.as_bytes();
    let mut cut = HASHED_PREFIX_LEN;
    if bytes[cut - 1] == b'%' {
        cut -= 1;
    } else if bytes[cut - 2] == b'%' {
        cut -= 2;
    }
    let digest = Sha256::digest(key.as_bytes());
    format!("{}~{:x}", &encoded[..cut], digest)
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KnowledgeStore for InMemoryKnowledgeStore {
    fn store(&self, key: &str, content: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), content.to_string());
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<String, StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        Ok(())
    }
}
