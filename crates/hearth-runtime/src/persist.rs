//! Persistence of the configuration partition.

#![allow(missing_docs)]

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::store::StateStore;
use crate::value::{Partition, StateValue};

/// How a file region is rewritten on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Truncate and write in place. A crash mid-write can leave a torn file.
    #[default]
    Overwrite,
    /// Write a sibling temp file, sync it, then rename over the target.
    Atomic,
}

impl WriteMode {
    pub fn parse(text: &str) -> Result<Self, RuntimeError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "overwrite" | "direct" => Ok(Self::Overwrite),
            "atomic" | "rename" => Ok(Self::Atomic),
            _ => Err(RuntimeError::InvalidConfig(
                format!("invalid storage.write_mode '{text}'").into(),
            )),
        }
    }
}

/// A named region of non-volatile storage.
pub trait StorageRegion: Send {
    /// Region name for diagnostics.
    fn name(&self) -> &str;

    /// Whole region content, or `None` when the region does not exist.
    fn read(&self) -> Result<Option<Vec<u8>>, RuntimeError>;

    /// Replaces the whole region content.
    fn write(&self, bytes: &[u8]) -> Result<(), RuntimeError>;
}

/// File-backed storage region.
#[derive(Debug, Clone)]
pub struct FileRegion {
    path: PathBuf,
    name: String,
    mode: WriteMode,
}

impl FileRegion {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self {
            path,
            name,
            mode: WriteMode::Overwrite,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_bytes(path: &Path, bytes: &[u8], sync: bool) -> Result<(), RuntimeError> {
        let mut file = fs::File::create(path)
            .map_err(|err| RuntimeError::Storage(format!("create {path:?}: {err}").into()))?;
        file.write_all(bytes)
            .map_err(|err| RuntimeError::Storage(format!("write {path:?}: {err}").into()))?;
        if sync {
            file.sync_all()
                .map_err(|err| RuntimeError::Storage(format!("sync {path:?}: {err}").into()))?;
        }
        Ok(())
    }
}

impl StorageRegion for FileRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<Option<Vec<u8>>, RuntimeError> {
        let mut file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(RuntimeError::Storage(
                    format!("open {:?}: {err}", self.path).into(),
                ))
            }
        };
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|err| RuntimeError::Storage(format!("read {:?}: {err}", self.path).into()))?;
        Ok(Some(buf))
    }

    fn write(&self, bytes: &[u8]) -> Result<(), RuntimeError> {
        match self.mode {
            WriteMode::Overwrite => Self::write_bytes(&self.path, bytes, false),
            WriteMode::Atomic => {
                let temp = self.temp_path();
                Self::write_bytes(&temp, bytes, true)?;
                fs::rename(&temp, &self.path).map_err(|err| {
                    let _ = fs::remove_file(&temp);
                    RuntimeError::Storage(format!("rename {temp:?}: {err}").into())
                })
            }
        }
    }
}

/// In-memory region for simulation and tests.
///
/// Clones share the same backing buffer, so a test can keep a handle while
/// the adapter owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegion {
    data: Arc<Mutex<Option<Vec<u8>>>>,
    read_only: Arc<Mutex<bool>>,
}

impl MemoryRegion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        let region = Self::default();
        *region.data.lock() = Some(bytes.into());
        region
    }

    #[must_use]
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.data.lock().clone()
    }

    /// Makes subsequent writes fail, as a full or write-protected device would.
    pub fn set_read_only(&self, read_only: bool) {
        *self.read_only.lock() = read_only;
    }
}

impl StorageRegion for MemoryRegion {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self) -> Result<Option<Vec<u8>>, RuntimeError> {
        Ok(self.data.lock().clone())
    }

    fn write(&self, bytes: &[u8]) -> Result<(), RuntimeError> {
        if *self.read_only.lock() {
            return Err(RuntimeError::Storage("memory region is read-only".into()));
        }
        *self.data.lock() = Some(bytes.to_vec());
        Ok(())
    }
}

/// Moves the persisted partition to and from a storage region.
pub struct PersistenceAdapter {
    region: Box<dyn StorageRegion>,
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("region", &self.region.name())
            .finish()
    }
}

impl PersistenceAdapter {
    #[must_use]
    pub fn new(region: Box<dyn StorageRegion>) -> Self {
        Self { region }
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>, mode: WriteMode) -> Self {
        Self::new(Box::new(FileRegion::new(path).with_mode(mode)))
    }

    #[must_use]
    pub fn memory(region: MemoryRegion) -> Self {
        Self::new(Box::new(region))
    }

    #[must_use]
    pub fn region_name(&self) -> &str {
        self.region.name()
    }

    /// Rewrites the whole region with the persisted partition.
    ///
    /// Returns the number of entries written. On failure the stored copy may
    /// be stale or torn.
    pub fn save(&self, store: &StateStore) -> Result<usize, RuntimeError> {
        let (document, count) = encode_document(store);
        self.region.write(document.as_bytes()).map_err(|err| {
            warn!(region = self.region.name(), %err, "save failed");
            err
        })?;
        debug!(region = self.region.name(), entries = count, "saved");
        Ok(count)
    }

    /// Loads the region into the persisted partition.
    ///
    /// The document is validated in full before the first write, so a
    /// failure leaves the store untouched. Each applied entry goes through
    /// the normal write path and notifies observers.
    pub fn load(&self, store: &mut StateStore) -> Result<usize, RuntimeError> {
        let bytes = self
            .region
            .read()?
            .ok_or_else(|| RuntimeError::MissingDocument(SmolStr::new(self.region.name())))?;
        let entries = decode_document(&bytes).map_err(|err| {
            if !err.is_missing_document() {
                warn!(region = self.region.name(), %err, "stored document rejected");
            }
            match err {
                RuntimeError::MissingDocument(_) => {
                    RuntimeError::MissingDocument(SmolStr::new(self.region.name()))
                }
                other => other,
            }
        })?;
        let count = entries.len();
        for (key, value) in entries {
            store.write(key, value, Partition::Persisted);
        }
        info!(region = self.region.name(), entries = count, "loaded");
        Ok(count)
    }
}

/// Serializes the persisted partition as a flat JSON object ordered by key.
#[must_use]
pub fn encode_document(store: &StateStore) -> (String, usize) {
    let mut object = serde_json::Map::new();
    for (key, value) in store.persisted() {
        match value.to_json() {
            Some(json) => {
                object.insert(key.to_string(), json);
            }
            None => warn!(key = key.as_str(), "non-finite value not persisted"),
        }
    }
    let count = object.len();
    let text = serde_json::Value::Object(object).to_string();
    (text, count)
}

/// Parses and validates a stored document into key/value pairs.
pub fn decode_document(bytes: &[u8]) -> Result<Vec<(SmolStr, StateValue)>, RuntimeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| RuntimeError::Document("invalid utf-8".into()))?;
    if text.trim().is_empty() {
        return Err(RuntimeError::MissingDocument("empty".into()));
    }
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| RuntimeError::Document(format!("{err}").into()))?;
    let serde_json::Value::Object(object) = json else {
        return Err(RuntimeError::Document("top level is not an object".into()));
    };
    object
        .iter()
        .map(|(key, json)| {
            StateValue::from_json(json)
                .map(|value| (SmolStr::new(key), value))
                .ok_or_else(|| {
                    RuntimeError::Document(format!("unsupported value for '{key}'").into())
                })
        })
        .collect()
}
