//! Entity review: load, per-field editing, save, and the raw-JSON fallback.
//!
//! ```text
//! Loading -> Ready | Failed
//! Ready -> Editing -> Saving -> Ready
//!             ^          |
//!             +----------+ (save failed, draft kept)
//! ```
//!
//! Two entry flows converge here: extraction from a handed-off document, and
//! fetching the entities the service already holds for review.

use tracing::{debug, info, warn};

use super::sequence::{Sequencer, Slot, Ticket};
use super::Outcome;
use crate::client::DocumentService;
use crate::error::{Result, ReviewError};
use crate::export::ExportFile;
use crate::handoff::{HandoffError, SessionStore};
use crate::normalizer::{normalize, EntityPayload};
use crate::schema::{Coordinates, Document, Entity, EntityCollection, EntityGroup};

/// Where an [`EntityReview`] stands, derived from its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPhase {
    Loading,
    Ready,
    Failed,
    Editing,
    Saving,
}

impl EntityPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Editing => "editing",
            Self::Saving => "saving",
        }
    }
}

/// Where the initial entity set comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySource {
    Extract {
        text: String,
        document_type: Option<String>,
    },
    Review,
}

impl EntitySource {
    /// Extract from the document's preferred text.
    pub fn from_document(document: &Document) -> Self {
        Self::Extract {
            text: document.display_text().to_string(),
            document_type: document.document_type.clone(),
        }
    }
}

/// Editable fields of an [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityField {
    Value,
    TextSnippet,
    StartIndex,
    EndIndex,
}

/// Review state for the entities extracted from one document.
#[derive(Debug, Default)]
pub struct EntityReview {
    source: Option<EntitySource>,
    document_type: Option<String>,
    committed: Option<EntityCollection>,
    draft: Option<EntityCollection>,
    raw_response: Option<String>,
    show_raw: bool,
    load_failed: bool,
    error: Option<String>,
    sequencer: Sequencer,
}

impl EntityReview {
    /// Start a review that will load from `source`.
    pub fn new(source: EntitySource) -> Self {
        let document_type = match &source {
            EntitySource::Extract { document_type, .. } => document_type.clone(),
            EntitySource::Review => None,
        };
        Self {
            source: Some(source),
            document_type,
            ..Self::default()
        }
    }

    /// Build the extraction flow from the document handed over by the
    /// document view. A missing or unreadable snapshot yields a `Failed`
    /// review that still exposes the raw payload.
    pub fn from_handoff(store: &SessionStore) -> Self {
        match store.load_document() {
            Ok(document) => Self::new(EntitySource::from_document(&document)),
            Err(err) => {
                warn!("Entity review has no usable document: {}", err);
                let raw_response = match &err {
                    HandoffError::InvalidFormat { raw } => Some(raw.clone()),
                    _ => None,
                };
                Self {
                    raw_response,
                    load_failed: true,
                    error: Some(err.to_string()),
                    ..Self::default()
                }
            }
        }
    }

    /// Seed a review from a payload already in hand (e.g. an edited file).
    pub fn from_payload(payload: EntityPayload, document_type: Option<String>) -> Self {
        let mut review = Self {
            document_type,
            ..Self::default()
        };
        review.apply_loaded(payload);
        review
    }

    /// Current phase. A save in flight takes precedence over the draft.
    pub fn phase(&self) -> EntityPhase {
        if self.sequencer.in_flight(Slot::SaveEntities) {
            EntityPhase::Saving
        } else if self.draft.is_some() {
            EntityPhase::Editing
        } else if self.sequencer.in_flight(Slot::LoadEntities) {
            EntityPhase::Loading
        } else if self.load_failed {
            EntityPhase::Failed
        } else if self.committed.is_some() {
            EntityPhase::Ready
        } else {
            EntityPhase::Loading
        }
    }

    pub fn committed(&self) -> Option<&EntityCollection> {
        self.committed.as_ref()
    }

    pub fn draft(&self) -> Option<&EntityCollection> {
        self.draft.as_ref()
    }

    /// What the view renders: the draft while editing, else the committed set.
    pub fn entities(&self) -> Option<&EntityCollection> {
        self.draft.as_ref().or(self.committed.as_ref())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Last response text from the service, kept for the raw view.
    pub fn raw_response(&self) -> Option<&str> {
        self.raw_response.as_deref()
    }

    pub fn document_type(&self) -> Option<&str> {
        self.document_type.as_deref()
    }

    /// True when the raw view is on and there is something to show.
    pub fn showing_raw(&self) -> bool {
        self.show_raw && self.raw_response.is_some()
    }

    /// Flip the raw-JSON view. Only available once a raw response exists.
    pub fn toggle_raw(&mut self) -> bool {
        if self.raw_response.is_some() {
            self.show_raw = !self.show_raw;
        }
        self.showing_raw()
    }

    /// Export of the committed set, or of the raw text when nothing parsed.
    pub fn export(&self) -> Option<ExportFile> {
        let document_type = self.document_type.as_deref();
        match (&self.committed, &self.raw_response) {
            (Some(collection), _) => Some(ExportFile::from_entities(
                "extracted-entities",
                collection,
                document_type,
            )),
            (None, Some(raw)) => Some(ExportFile::from_text(
                "extracted-entities",
                raw,
                document_type,
            )),
            (None, None) => None,
        }
    }

    fn require(&self, action: &'static str, allowed: &[EntityPhase]) -> Result<()> {
        let phase = self.phase();
        if allowed.contains(&phase) {
            Ok(())
        } else {
            debug!("Rejected '{}' in phase {}", action, phase.as_str());
            Err(ReviewError::InvalidTransition {
                action,
                phase: phase.as_str(),
            })
        }
    }

    fn accept(&mut self, ticket: Ticket) -> bool {
        if !self.sequencer.is_current(ticket) {
            warn!(
                "Discarding stale {:?} response (seq {})",
                ticket.slot(),
                ticket.seq()
            );
            return false;
        }
        self.sequencer.retire(ticket);
        true
    }

    fn fail(&mut self, err: ReviewError) -> Outcome {
        if let Some(body) = err.body() {
            self.raw_response = Some(body.to_string());
        }
        let message = err.to_string();
        warn!("{}", message);
        self.error = Some(message.clone());
        Outcome::Failed(message)
    }

    fn apply_loaded(&mut self, payload: EntityPayload) -> Outcome {
        self.raw_response = Some(payload.raw_text());
        match normalize(&payload) {
            Ok(collection) => {
                info!("Loaded {} entity categories", collection.len());
                self.committed = Some(collection);
                self.load_failed = false;
                self.show_raw = false;
                self.error = None;
                Outcome::Applied
            }
            Err(err) => {
                self.load_failed = true;
                self.show_raw = true;
                self.fail(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Start fetching entities from the review's source.
    pub fn begin_load(&mut self) -> Result<(Ticket, EntitySource)> {
        self.require(
            "load entities",
            &[EntityPhase::Loading, EntityPhase::Ready, EntityPhase::Failed],
        )?;
        let source = self
            .source
            .clone()
            .ok_or_else(|| ReviewError::Validation("No document data found".to_string()))?;
        self.error = None;
        Ok((self.sequencer.issue(Slot::LoadEntities), source))
    }

    /// Normalize and commit the fetched payload. Failures move to Failed
    /// with the raw text shown.
    pub fn finish_load(&mut self, ticket: Ticket, result: Result<EntityPayload>) -> Outcome {
        if !self.accept(ticket) {
            return Outcome::Stale;
        }
        match result {
            Ok(payload) => self.apply_loaded(payload),
            Err(err) => {
                self.load_failed = true;
                self.fail(err)
            }
        }
    }

    /// Fetch entities in one step.
    pub async fn load(&mut self, service: &dyn DocumentService) -> Result<Outcome> {
        let (ticket, source) = self.begin_load()?;
        let result = match &source {
            EntitySource::Extract {
                text,
                document_type,
            } => service.extract_entities(text, document_type.as_deref()).await,
            EntitySource::Review => service.review_entities().await,
        };
        Ok(self.finish_load(ticket, result))
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    /// Snapshot the committed set into an independent draft.
    pub fn begin_edit(&mut self) -> Result<()> {
        self.require("edit entities", &[EntityPhase::Ready])?;
        self.draft = self.committed.clone();
        Ok(())
    }

    /// Change one field of one entity in the draft.
    ///
    /// `index` addresses an element when the category holds a sequence and is
    /// ignored for a single entity. Returns `Ok(false)` when nothing matched
    /// (unknown category, missing or out-of-range index).
    pub fn edit_field(
        &mut self,
        category: &str,
        index: Option<usize>,
        field: EntityField,
        value: &str,
    ) -> Result<bool> {
        self.require("edit an entity", &[EntityPhase::Editing])?;
        let Some(draft) = self.draft.as_mut() else {
            return Ok(false);
        };
        let entity = match draft.get_mut(category) {
            Some(EntityGroup::Single(entity)) => entity,
            Some(EntityGroup::Many(items)) => match index.and_then(|i| items.get_mut(i)) {
                Some(entity) => entity,
                None => {
                    debug!("No entity at {:?} in '{}'", index, category);
                    return Ok(false);
                }
            },
            None => {
                debug!("Unknown entity category '{}'", category);
                return Ok(false);
            }
        };
        set_field(entity, field, value)?;
        Ok(true)
    }

    /// Discard the draft; the committed set is untouched.
    pub fn cancel_edit(&mut self) -> Result<()> {
        self.require("cancel editing", &[EntityPhase::Editing])?;
        self.draft = None;
        Ok(())
    }

    /// Start saving the draft.
    pub fn begin_commit(&mut self) -> Result<(Ticket, EntityCollection)> {
        self.require("save entities", &[EntityPhase::Editing])?;
        let draft = self.draft.clone().unwrap_or_default();
        self.error = None;
        Ok((self.sequencer.issue(Slot::SaveEntities), draft))
    }

    /// Apply the save response. The server's entities replace the committed
    /// set after normalization; on any failure the draft is kept.
    pub fn finish_commit(&mut self, ticket: Ticket, result: Result<EntityPayload>) -> Outcome {
        if !self.accept(ticket) {
            return Outcome::Stale;
        }
        let payload = match result {
            Ok(payload) => payload,
            Err(err) => return self.fail(err),
        };
        self.raw_response = Some(payload.raw_text());
        match normalize(&payload) {
            Ok(collection) => {
                info!("Saved entities ({} categories)", collection.len());
                self.committed = Some(collection);
                self.draft = None;
                self.show_raw = false;
                Outcome::Applied
            }
            Err(err) => {
                self.show_raw = true;
                self.fail(err)
            }
        }
    }

    /// Save the draft in one step.
    pub async fn commit_edit(&mut self, service: &dyn DocumentService) -> Result<Outcome> {
        let (ticket, draft) = self.begin_commit()?;
        let result = service.submit_edited_entities(&draft).await;
        Ok(self.finish_commit(ticket, result))
    }
}

fn set_field(entity: &mut Entity, field: EntityField, value: &str) -> Result<()> {
    match field {
        EntityField::Value => entity.value = value.to_string(),
        EntityField::TextSnippet => {
            entity
                .coordinates
                .get_or_insert_with(Coordinates::default)
                .text_snippet = value.to_string();
        }
        EntityField::StartIndex | EntityField::EndIndex => {
            let index: i64 = value.trim().parse().map_err(|_| {
                ReviewError::Validation(format!("Position must be an integer, got {:?}", value))
            })?;
            let coordinates = entity.coordinates.get_or_insert_with(Coordinates::default);
            if field == EntityField::StartIndex {
                coordinates.start_index = index;
            } else {
                coordinates.end_index = index;
            }
        }
    }
    Ok(())
}
