//! Document and entity types exchanged with the document service.
//!
//! Field names on the wire are snake_case (`raw_text`, `start_idx`, ...).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// OCR/enhancement result for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_text: Option<String>,
}

impl Document {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            document_type: None,
            enhanced_text: None,
        }
    }

    /// Preferred text for display: the enhanced version once present.
    pub fn display_text(&self) -> &str {
        self.enhanced_text.as_deref().unwrap_or(&self.raw_text)
    }
}

/// Source location of an entity within the document text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "start_idx")]
    pub start_index: i64,
    #[serde(rename = "end_idx")]
    pub end_index: i64,
    pub text_snippet: String,
}

/// One extracted value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl Entity {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            coordinates: None,
        }
    }
}

/// Entities stored under one category. Cardinality is decided per response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityGroup {
    Single(Entity),
    Many(Vec<Entity>),
}

impl EntityGroup {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        let items: &[Entity] = match self {
            Self::Single(entity) => std::slice::from_ref(entity),
            Self::Many(items) => items,
        };
        items.iter()
    }
}

/// Normalized category -> entity mapping.
pub type EntityCollection = BTreeMap<String, EntityGroup>;

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = mime_for(&file_name).to_string();
        Self {
            file_name,
            bytes,
            mime,
        }
    }

    /// Read a file from disk, inferring the MIME type from its extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self::new(file_name, bytes))
    }

    /// Hex SHA-256 of the file contents.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text_prefers_enhanced() {
        let mut doc = Document::new("raw");
        assert_eq!(doc.display_text(), "raw");
        doc.enhanced_text = Some("clean".to_string());
        assert_eq!(doc.display_text(), "clean");
    }

    #[test]
    fn test_document_wire_names() {
        let doc: Document = serde_json::from_str(
            r#"{"raw_text": "abc", "document_type": "lab_report"}"#,
        )
        .unwrap();
        assert_eq!(doc.document_type.as_deref(), Some("lab_report"));
        assert!(doc.enhanced_text.is_none());

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("enhanced_text").is_none());
    }

    #[test]
    fn test_coordinates_wire_names() {
        let entity = Entity {
            value: "Aspirin".to_string(),
            coordinates: Some(Coordinates {
                start_index: 3,
                end_index: 10,
                text_snippet: "an Aspirin".to_string(),
            }),
        };
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["coordinates"]["start_idx"], 3);
        assert_eq!(json["coordinates"]["end_idx"], 10);
    }

    #[test]
    fn test_group_serializes_by_cardinality() {
        let single = EntityGroup::Single(Entity::new("x"));
        let many = EntityGroup::Many(vec![Entity::new("a"), Entity::new("b")]);
        assert!(serde_json::to_value(&single).unwrap().is_object());
        assert!(serde_json::to_value(&many).unwrap().is_array());
        assert_eq!(many.iter().map(|e| e.value.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_upload_mime_and_hash() {
        let upload = Upload::new("Scan.PDF", b"hello".to_vec());
        assert_eq!(upload.mime, "application/pdf");
        assert_eq!(
            upload.content_hash(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(Upload::new("notes", vec![]).mime, "application/octet-stream");
    }
}
