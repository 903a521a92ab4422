//! Session-scoped handoff of a Document snapshot between the document view
//! and the entity view.
//!
//! A single slot under a fixed key. When file-backed, the slot is mirrored to a
//! small JSON file (`{"documentData": "<serialized document>"}`) so separate
//! CLI invocations share it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::schema::Document;

pub const HANDOFF_KEY: &str = "documentData";

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("No document data found")]
    NoDocumentData,

    #[error("Invalid document data format")]
    InvalidFormat { raw: String },

    #[error("Failed to persist document data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize document data: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct SessionStore {
    slot: Option<String>,
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store. A missing file is an empty slot; an unreadable
    /// one is treated as empty as well.
    pub fn file_backed(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let slot = read_slot(&path);
        Self {
            slot,
            path: Some(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn raw(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    pub fn store_raw(&mut self, raw: impl Into<String>) -> Result<(), HandoffError> {
        self.slot = Some(raw.into());
        self.flush()
    }

    pub fn store_document(&mut self, document: &Document) -> Result<(), HandoffError> {
        let raw = serde_json::to_string(document)?;
        debug!("Handing off document ({} bytes)", raw.len());
        self.store_raw(raw)
    }

    pub fn load_document(&self) -> Result<Document, HandoffError> {
        let raw = self.slot.as_deref().ok_or(HandoffError::NoDocumentData)?;
        serde_json::from_str(raw).map_err(|e| {
            warn!("Handoff payload is not a document: {}", e);
            HandoffError::InvalidFormat {
                raw: raw.to_string(),
            }
        })
    }

    pub fn clear(&mut self) -> Result<(), HandoffError> {
        self.slot = None;
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), HandoffError> {
        let (Some(path), Some(raw)) = (&self.path, &self.slot) else {
            return Ok(());
        };
        let mut entries = HashMap::new();
        entries.insert(HANDOFF_KEY, raw.as_str());
        std::fs::write(path, serde_json::to_vec_pretty(&entries)?)?;
        Ok(())
    }
}

fn read_slot(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<HashMap<String, String>>(&content) {
        Ok(mut entries) => entries.remove(HANDOFF_KEY),
        Err(e) => {
            warn!("Ignoring unreadable handoff file {:?}: {}", path, e);
            None
        }
    }
}
