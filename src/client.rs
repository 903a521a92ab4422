//! Document service client.
//!
//! [`DocumentService`] is the seam the review state machines talk to;
//! [`HttpDocumentService`] is the reqwest implementation against the remote
//! OCR / enhancement / NER service. No retries and no caching: every failure is
//! handed back to the caller as-is.

use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Operation, Result, ReviewError};
use crate::normalizer::EntityPayload;
use crate::schema::{Document, EntityCollection, Upload};

/// Remote operations used by the review state machines.
#[async_trait::async_trait]
pub trait DocumentService: Send + Sync {
    /// Upload a scanned file; returns its OCR text and detected type.
    async fn process_document(&self, upload: &Upload) -> Result<Document>;

    /// AI-enhanced version of `text`.
    async fn enhance_text(&self, text: &str, document_type: Option<&str>) -> Result<String>;

    /// Named entities found in `text`.
    async fn extract_entities(&self, text: &str, document_type: Option<&str>)
        -> Result<EntityPayload>;

    /// Save manually edited text; returns the text the service stored.
    async fn submit_edited_text(&self, text: &str) -> Result<String>;

    /// Entities the service currently holds for review.
    async fn review_entities(&self) -> Result<EntityPayload>;

    /// Save edited entities; returns the service's final set.
    async fn submit_edited_entities(&self, entities: &EntityCollection) -> Result<EntityPayload>;

    /// Document last processed by the service, for resuming a review.
    async fn review_enhanced_text(&self) -> Result<Document>;
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_type: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct EditedTextRequest<'a> {
    edited_text: &'a str,
}

#[derive(Debug, Serialize)]
struct EditedEntitiesRequest<'a> {
    edited_entities: &'a EntityCollection,
}

#[derive(Debug, Deserialize)]
struct EnhanceResponse {
    enhanced_text: String,
}

#[derive(Debug, Deserialize)]
struct FinalTextResponse {
    final_text: String,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: Value,
}

#[derive(Debug, Deserialize)]
struct FinalEntitiesResponse {
    #[serde(default)]
    final_entities: Value,
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// [`DocumentService`] over HTTP/JSON.
#[derive(Clone)]
pub struct HttpDocumentService {
    client: Client,
    base_url: String,
}

impl HttpDocumentService {
    /// Build a client for `config.base_url()`, with the optional timeout.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ReviewError::Validation(format!("Invalid HTTP client settings: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, operation: Operation) -> String {
        format!("{}{}", self.base_url, operation.path())
    }

    fn post_json<B: Serialize + ?Sized>(&self, operation: Operation, body: &B) -> RequestBuilder {
        self.client.post(self.url(operation)).json(body)
    }

    async fn send<T: DeserializeOwned>(&self, operation: Operation, request: RequestBuilder) -> Result<T> {
        debug!("Sending {} request to {}", operation, self.base_url);

        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("{}: transport error: {}", operation, e);
                ReviewError::network(operation, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned {}: {}", operation, status.as_u16(), body);
            return Err(ReviewError::Service {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ReviewError::network(operation, e))?;
        debug!("{}: {} byte response", operation, text.len());

        serde_json::from_str(&text).map_err(|e| {
            ReviewError::Parse(format!(
                "{}: unexpected response body: {}",
                operation.failure_label(),
                e
            ))
        })
    }
}

#[async_trait::async_trait]
impl DocumentService for HttpDocumentService {
    async fn process_document(&self, upload: &Upload) -> Result<Document> {
        info!(
            "Uploading {} ({} bytes, {})",
            upload.file_name,
            upload.bytes.len(),
            upload.mime
        );

        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime)
            .map_err(|e| ReviewError::Validation(format!("Invalid MIME type {}: {}", upload.mime, e)))?;
        let form = Form::new().part("file", part);

        let request = self
            .client
            .post(self.url(Operation::ProcessDocument))
            .multipart(form);
        let document: Document = self.send(Operation::ProcessDocument, request).await?;

        info!(
            "Processed {}: {} chars, type={:?}",
            upload.file_name,
            document.raw_text.len(),
            document.document_type
        );
        Ok(document)
    }

    async fn enhance_text(&self, text: &str, document_type: Option<&str>) -> Result<String> {
        let body = TextRequest { text, document_type };
        let request = self.post_json(Operation::EnhanceText, &body);
        let response: EnhanceResponse = self.send(Operation::EnhanceText, request).await?;
        Ok(response.enhanced_text)
    }

    async fn extract_entities(
        &self,
        text: &str,
        document_type: Option<&str>,
    ) -> Result<EntityPayload> {
        let body = TextRequest { text, document_type };
        let request = self.post_json(Operation::ExtractEntities, &body);
        let response: EntitiesResponse = self.send(Operation::ExtractEntities, request).await?;
        Ok(EntityPayload::from_value(response.entities))
    }

    async fn submit_edited_text(&self, text: &str) -> Result<String> {
        let body = EditedTextRequest { edited_text: text };
        let request = self.post_json(Operation::SubmitEditedText, &body);
        let response: FinalTextResponse = self.send(Operation::SubmitEditedText, request).await?;
        Ok(response.final_text)
    }

    async fn review_entities(&self) -> Result<EntityPayload> {
        let request = self.client.get(self.url(Operation::ReviewEntities));
        let response: EntitiesResponse = self.send(Operation::ReviewEntities, request).await?;
        Ok(EntityPayload::from_value(response.entities))
    }

    async fn submit_edited_entities(&self, entities: &EntityCollection) -> Result<EntityPayload> {
        let body = EditedEntitiesRequest {
            edited_entities: entities,
        };
        let request = self.post_json(Operation::SubmitEditedEntities, &body);
        let response: FinalEntitiesResponse =
            self.send(Operation::SubmitEditedEntities, request).await?;
        Ok(EntityPayload::from_value(response.final_entities))
    }

    async fn review_enhanced_text(&self) -> Result<Document> {
        let request = self.client.get(self.url(Operation::ReviewEnhancedText));
        self.send(Operation::ReviewEnhancedText, request).await
    }
}
