//! Durable stores for audit entries.
//!
//! A store only persists and reads back; ordering, linking, and signing are
//! the chain's job. The file store is append-only JSONL so a partially
//! written tail line is detectable and nothing earlier is ever rewritten.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::entry::AuditEntry;
use crate::error::AuditError;

/// Persistence for audit entries.
pub trait AuditStore: Send + Sync {
    /// Durably record one entry. Must not return until the entry is
    /// persisted; an error means the entry must be treated as unrecorded.
    fn persist(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Read every persisted entry, in append order.
    fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError>;
}

/// In-memory store, for tests and ephemeral engagements.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryStore {
    fn persist(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.entries.read().clone())
    }
}

/// Append-only JSONL file store.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open (or create) a store at `path`, creating parent directories as
    /// needed. An existing file is continued, not truncated.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditStore for FileStore {
    fn persist(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let json = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}
