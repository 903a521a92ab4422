//! Downloadable exports of document text and entities.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::schema::EntityCollection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub content: String,
    pub format: ExportFormat,
}

impl ExportFile {
    /// Pretty JSON (2-space indent) when `text` is valid JSON, else plain text.
    pub fn from_text(artifact: &str, text: &str, document_type: Option<&str>) -> Self {
        let pretty = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok());
        match pretty {
            Some(content) => Self::build(artifact, content, ExportFormat::Json, document_type),
            None => Self::build(artifact, text.to_string(), ExportFormat::Text, document_type),
        }
    }

    pub fn from_entities(
        artifact: &str,
        entities: &EntityCollection,
        document_type: Option<&str>,
    ) -> Self {
        let content = serde_json::to_string_pretty(entities).unwrap_or_else(|_| "{}".to_string());
        Self::build(artifact, content, ExportFormat::Json, document_type)
    }

    fn build(
        artifact: &str,
        content: String,
        format: ExportFormat,
        document_type: Option<&str>,
    ) -> Self {
        let label = document_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("document");
        Self {
            file_name: format!("{}-{}.{}", artifact, label, format.extension()),
            content,
            format,
        }
    }

    pub fn write_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.content)?;
        info!("Exported {} ({} bytes)", path.display(), self.content.len());
        Ok(path)
    }
}
