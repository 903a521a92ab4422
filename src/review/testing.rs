//! In-process document service for state machine tests.

use serde_json::{json, Value};
use std::sync::Mutex;

use crate::client::DocumentService;
use crate::error::{Operation, Result, ReviewError};
use crate::normalizer::EntityPayload;
use crate::schema::{Document, EntityCollection, Upload};

pub(crate) struct FakeService {
    failure: Option<(u16, String)>,
    document: Document,
    final_text: Option<String>,
    entities: EntityPayload,
    final_entities: Option<EntityPayload>,
    edited_text: Mutex<Option<String>>,
    edited_entities: Mutex<Option<EntityCollection>>,
}

impl FakeService {
    pub(crate) fn new() -> Self {
        let mut document = Document::new("raw ocr text");
        document.document_type = Some("lab_report".to_string());
        Self {
            failure: None,
            document,
            final_text: None,
            entities: EntityPayload::Object(json!({
                "patient_name": {"value": "John Doe"},
                "medications": [{"value": "Aspirin"}, {"value": "Metformin"}]
            })),
            final_entities: None,
            edited_text: Mutex::new(None),
            edited_entities: Mutex::new(None),
        }
    }

    /// Every operation answers with `status` and `body`.
    pub(crate) fn failing(status: u16, body: &str) -> Self {
        Self {
            failure: Some((status, body.to_string())),
            ..Self::new()
        }
    }

    pub(crate) fn with_document(mut self, document: Document) -> Self {
        self.document = document;
        self
    }

    pub(crate) fn with_final_text(mut self, text: &str) -> Self {
        self.final_text = Some(text.to_string());
        self
    }

    pub(crate) fn with_entities(mut self, payload: EntityPayload) -> Self {
        self.entities = payload;
        self
    }

    pub(crate) fn with_final_entities(mut self, payload: EntityPayload) -> Self {
        self.final_entities = Some(payload);
        self
    }

    pub(crate) fn last_edited_text(&self) -> Option<String> {
        self.edited_text.lock().unwrap().clone()
    }

    pub(crate) fn last_edited_entities(&self) -> Option<EntityCollection> {
        self.edited_entities.lock().unwrap().clone()
    }

    fn check(&self, operation: Operation) -> Result<()> {
        match &self.failure {
            Some((status, body)) => Err(ReviewError::Service {
                operation,
                status: *status,
                body: body.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl DocumentService for FakeService {
    async fn process_document(&self, _upload: &Upload) -> Result<Document> {
        self.check(Operation::ProcessDocument)?;
        Ok(self.document.clone())
    }

    async fn enhance_text(&self, _text: &str, _document_type: Option<&str>) -> Result<String> {
        self.check(Operation::EnhanceText)?;
        Ok("enhanced text".to_string())
    }

    async fn extract_entities(
        &self,
        _text: &str,
        _document_type: Option<&str>,
    ) -> Result<EntityPayload> {
        self.check(Operation::ExtractEntities)?;
        Ok(self.entities.clone())
    }

    async fn submit_edited_text(&self, text: &str) -> Result<String> {
        self.check(Operation::SubmitEditedText)?;
        *self.edited_text.lock().unwrap() = Some(text.to_string());
        Ok(self.final_text.clone().unwrap_or_else(|| text.to_string()))
    }

    async fn review_entities(&self) -> Result<EntityPayload> {
        self.check(Operation::ReviewEntities)?;
        Ok(self.entities.clone())
    }

    async fn submit_edited_entities(&self, entities: &EntityCollection) -> Result<EntityPayload> {
        self.check(Operation::SubmitEditedEntities)?;
        *self.edited_entities.lock().unwrap() = Some(entities.clone());
        match &self.final_entities {
            Some(payload) => Ok(payload.clone()),
            None => {
                let echoed: Value = serde_json::to_value(entities).unwrap();
                Ok(EntityPayload::RawString(echoed.to_string()))
            }
        }
    }

    async fn review_enhanced_text(&self) -> Result<Document> {
        self.check(Operation::ReviewEnhancedText)?;
        Ok(self.document.clone())
    }
}
