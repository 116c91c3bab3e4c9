//! Storage backends for entry attribute documents.
//!
//! The kernel only needs three operations from a backend: read a structured
//! document at a location, write one, and remove one. A missing document is
//! not an error, it is `Ok(None)`. Two backends ship here: JSON files on disk
//! and an in-memory map that also counts reads.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::kernel::normalize;
use crate::value::Value;

pub trait Storage: Send + Sync {
    fn read_structured(&self, location: &Path) -> Result<Option<Value>>;
    fn write_structured(&self, location: &Path, document: &Value) -> Result<()>;
    /// Returns whether something was there to remove.
    fn remove_structured(&self, location: &Path) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    InMemory,
    #[default]
    Files,
}

// ------------- JSON files -------------
#[derive(Debug, Default)]
pub struct JsonFileStorage;

impl JsonFileStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for JsonFileStorage {
    fn read_structured(&self, location: &Path) -> Result<Option<Value>> {
        let text = match fs::read_to_string(location) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let json: serde_json::Value = serde_json::from_str(&text)?;
        debug!(path = %location.display(), "document read");
        Ok(Some(Value::from(json)))
    }
    fn write_structured(&self, location: &Path, document: &Value) -> Result<()> {
        // autovivify the directories in between
        if let Some(directory) = location.parent() {
            if !directory.as_os_str().is_empty() {
                fs::create_dir_all(directory)?;
            }
        }
        let text = serde_json::to_string_pretty(&document.to_json())? + "\n";
        fs::write(location, text)?;
        debug!(path = %location.display(), "document written");
        Ok(())
    }
    fn remove_structured(&self, location: &Path) -> Result<bool> {
        match fs::remove_file(location) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// ------------- In memory -------------
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: Mutex<HashMap<PathBuf, serde_json::Value>>,
    reads: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
    /// Seeds a document, typically from a `serde_json::json!` literal.
    pub fn insert(&self, location: impl AsRef<Path>, document: serde_json::Value) -> Result<()> {
        self.documents.lock()?.insert(normalize(location.as_ref()), document);
        Ok(())
    }
    pub fn document(&self, location: impl AsRef<Path>) -> Result<Option<serde_json::Value>> {
        Ok(self.documents.lock()?.get(&normalize(location.as_ref())).cloned())
    }
    /// Number of `read_structured` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Storage for MemoryStorage {
    fn read_structured(&self, location: &Path) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.documents.lock()?.get(&normalize(location)).cloned().map(Value::from))
    }
    fn write_structured(&self, location: &Path, document: &Value) -> Result<()> {
        self.documents.lock()?.insert(normalize(location), document.to_json());
        Ok(())
    }
    fn remove_structured(&self, location: &Path) -> Result<bool> {
        Ok(self.documents.lock()?.remove(&normalize(location)).is_some())
    }
}
