//! Service configuration.
//!
//! Loaded from the environment (after `.env`) or from a JSON file. CLI flags
//! override either source.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    base_url: String,
    /// Client-side request timeout. Unset means the transport default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// File mirroring the session handoff slot.
    #[serde(default)]
    pub handoff_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_URL)
    }
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url.into()),
            timeout_secs: None,
            handoff_path: None,
        }
    }

    /// Read `MEDOC_BACKEND_URL`, `MEDOC_TIMEOUT_SECS`, `MEDOC_HANDOFF_PATH`.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("MEDOC_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());

        let timeout_secs = match std::env::var("MEDOC_TIMEOUT_SECS") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("MEDOC_TIMEOUT_SECS is not a number: {:?}", raw))?,
            ),
            Err(_) => None,
        };

        let handoff_path = std::env::var_os("MEDOC_HANDOFF_PATH").map(PathBuf::from);

        Ok(Self {
            timeout_secs,
            handoff_path,
            ..Self::new(base_url)
        })
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let mut config: ServiceConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        config.base_url = trim_base_url(config.base_url);
        info!("Loaded service config from {:?}", path);
        Ok(config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = trim_base_url(base_url.into());
        self
    }

    pub fn with_handoff_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.handoff_path = Some(path.into());
        self
    }
}

fn trim_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
