//! Document review: upload, enhancement, and manual text editing.
//!
//! ```text
//! Empty -> Processing -> Ready -> Enhancing -> Ready
//!                          |
//!                          +-> Editing -> Saving -> Ready
//!                                 ^          |
//!                                 +----------+ (save failed, draft kept)
//! ```
//!
//! Enhancing and Editing exclude each other: neither can be entered while the
//! other is active, so a background enhancement can never land on top of a
//! manual edit.

use tracing::{debug, info, warn};

use super::sequence::{Sequencer, Slot, Ticket};
use super::Outcome;
use crate::client::DocumentService;
use crate::error::{Result, ReviewError};
use crate::export::ExportFile;
use crate::schema::{Document, Upload};

/// Where a [`DocumentReview`] stands, derived from its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentPhase {
    Empty,
    Processing,
    Ready,
    Enhancing,
    Editing,
    Saving,
}

impl DocumentPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Enhancing => "enhancing",
            Self::Editing => "editing",
            Self::Saving => "saving",
        }
    }
}

/// Inputs for an enhancement call, captured when it is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhanceRequest {
    pub text: String,
    pub document_type: Option<String>,
}

/// Review state for one uploaded document and its text.
#[derive(Debug, Default)]
pub struct DocumentReview {
    file: Option<Upload>,
    pending_file: Option<Upload>,
    document: Option<Document>,
    draft: Option<String>,
    error: Option<String>,
    sequencer: Sequencer,
}

impl DocumentReview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase. In-flight calls take precedence over the draft.
    pub fn phase(&self) -> DocumentPhase {
        if self.sequencer.in_flight(Slot::Process) {
            DocumentPhase::Processing
        } else if self.document.is_none() {
            DocumentPhase::Empty
        } else if self.sequencer.in_flight(Slot::SaveText) {
            DocumentPhase::Saving
        } else if self.draft.is_some() {
            DocumentPhase::Editing
        } else if self.sequencer.in_flight(Slot::Enhance) {
            DocumentPhase::Enhancing
        } else {
            DocumentPhase::Ready
        }
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// The file behind the current document. A submit still in flight does
    /// not change it.
    pub fn file(&self) -> Option<&Upload> {
        self.file.as_ref()
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Clear the last error message.
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Text shown in view mode: enhanced text when present, else the OCR output.
    pub fn display_text(&self) -> Option<&str> {
        self.document.as_ref().map(Document::display_text)
    }

    /// True when Ready with non-empty OCR text.
    pub fn can_enhance(&self) -> bool {
        self.phase() == DocumentPhase::Ready
            && self
                .document
                .as_ref()
                .is_some_and(|doc| !doc.raw_text.is_empty())
    }

    /// Export of the displayed text, named after the document type.
    pub fn export_text(&self) -> Option<ExportFile> {
        let document = self.document.as_ref()?;
        Some(ExportFile::from_text(
            "extracted-text",
            document.display_text(),
            document.document_type.as_deref(),
        ))
    }

    fn require(&self, action: &'static str, allowed: &[DocumentPhase]) -> Result<()> {
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
        let message = err.to_string();
        warn!("{}", message);
        self.error = Some(message.clone());
        Outcome::Failed(message)
    }

    // ------------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------------

    /// Start processing `upload`. The current document stays in place until the
    /// service answers.
    pub fn begin_submit(&mut self, upload: Upload) -> Result<Ticket> {
        self.require("submit a document", &[DocumentPhase::Empty, DocumentPhase::Ready])?;
        info!(
            "Submitting {} (sha256 {})",
            upload.file_name,
            upload.content_hash()
        );
        self.pending_file = Some(upload);
        self.error = None;
        Ok(self.sequencer.issue(Slot::Process))
    }

    /// Apply the processing result. On failure the prior document and file
    /// stay in place.
    pub fn finish_submit(&mut self, ticket: Ticket, result: Result<Document>) -> Outcome {
        if !self.accept(ticket) {
            return Outcome::Stale;
        }
        match result {
            Ok(document) => {
                info!(
                    "Document ready: {} chars, type={:?}",
                    document.raw_text.len(),
                    document.document_type
                );
                if let Some(upload) = self.pending_file.take() {
                    self.file = Some(upload);
                }
                self.document = Some(document);
                self.draft = None;
                self.sequencer.invalidate(Slot::Enhance);
                self.sequencer.invalidate(Slot::SaveText);
                Outcome::Applied
            }
            Err(err) => {
                self.pending_file = None;
                self.fail(err)
            }
        }
    }

    /// Upload and process `upload` in one step.
    pub async fn submit(&mut self, service: &dyn DocumentService, upload: Upload) -> Result<Outcome> {
        let ticket = self.begin_submit(upload.clone())?;
        let result = service.process_document(&upload).await;
        Ok(self.finish_submit(ticket, result))
    }

    /// Adopt a document obtained elsewhere (handoff slot, review fetch).
    pub fn restore(&mut self, document: Document) -> Result<()> {
        self.require("restore a document", &[DocumentPhase::Empty, DocumentPhase::Ready])?;
        self.document = Some(document);
        self.draft = None;
        self.error = None;
        Ok(())
    }

    /// Drop the active file and everything derived from it. Valid in any phase;
    /// responses still in flight become stale.
    pub fn remove_file(&mut self) {
        if let Some(file) = &self.file {
            info!("Removing {}", file.file_name);
        }
        self.file = None;
        self.pending_file = None;
        self.document = None;
        self.draft = None;
        self.error = None;
        self.sequencer.invalidate_all();
    }

    // ------------------------------------------------------------------------
    // Enhancement
    // ------------------------------------------------------------------------

    /// Start enhancing the OCR text. Only valid while Ready.
    pub fn begin_enhancement(&mut self) -> Result<(Ticket, EnhanceRequest)> {
        self.require("enhance text", &[DocumentPhase::Ready])?;
        let request = match &self.document {
            Some(doc) if !doc.raw_text.is_empty() => EnhanceRequest {
                text: doc.raw_text.clone(),
                document_type: doc.document_type.clone(),
            },
            _ => return Err(ReviewError::Validation("No text to enhance".to_string())),
        };
        self.error = None;
        Ok((self.sequencer.issue(Slot::Enhance), request))
    }

    /// Store the enhanced text on the document.
    pub fn finish_enhancement(&mut self, ticket: Ticket, result: Result<String>) -> Outcome {
        if !self.accept(ticket) {
            return Outcome::Stale;
        }
        match result {
            Ok(text) => match self.document.as_mut() {
                Some(document) => {
                    info!("Enhanced text received ({} chars)", text.len());
                    document.enhanced_text = Some(text);
                    Outcome::Applied
                }
                None => Outcome::Stale,
            },
            Err(err) => self.fail(err),
        }
    }

    /// Enhance the OCR text in one step.
    pub async fn request_enhancement(&mut self, service: &dyn DocumentService) -> Result<Outcome> {
        let (ticket, request) = self.begin_enhancement()?;
        let result = service
            .enhance_text(&request.text, request.document_type.as_deref())
            .await;
        Ok(self.finish_enhancement(ticket, result))
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    /// Open a draft seeded with the displayed text.
    pub fn begin_edit(&mut self) -> Result<()> {
        self.require("edit text", &[DocumentPhase::Ready])?;
        self.draft = self.display_text().map(str::to_string);
        Ok(())
    }

    /// Replace the draft text.
    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<()> {
        self.require("change the draft", &[DocumentPhase::Editing])?;
        self.draft = Some(text.into());
        Ok(())
    }

    /// Discard the draft.
    pub fn cancel_edit(&mut self) -> Result<()> {
        self.require("cancel editing", &[DocumentPhase::Editing])?;
        self.draft = None;
        Ok(())
    }

    /// Start saving the draft. An empty or whitespace-only draft is rejected.
    pub fn begin_commit(&mut self) -> Result<(Ticket, String)> {
        self.require("save text", &[DocumentPhase::Editing])?;
        let draft = match &self.draft {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => return Err(ReviewError::Validation("Edited text is empty".to_string())),
        };
        self.error = None;
        Ok((self.sequencer.issue(Slot::SaveText), draft))
    }

    /// Apply the save response. The server's text is authoritative; on failure
    /// the draft is kept so no input is lost.
    pub fn finish_commit(&mut self, ticket: Ticket, result: Result<String>) -> Outcome {
        if !self.accept(ticket) {
            return Outcome::Stale;
        }
        match result {
            Ok(final_text) => match self.document.as_mut() {
                Some(document) => {
                    info!("Edited text saved ({} chars)", final_text.len());
                    document.enhanced_text = Some(final_text);
                    self.draft = None;
                    Outcome::Applied
                }
                None => Outcome::Stale,
            },
            Err(err) => self.fail(err),
        }
    }

    /// Save the draft in one step.
    pub async fn commit_edit(&mut self, service: &dyn DocumentService) -> Result<Outcome> {
        let (ticket, draft) = self.begin_commit()?;
        let result = service.submit_edited_text(&draft).await;
        Ok(self.finish_commit(ticket, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::testing::FakeService;

    fn upload(name: &str) -> Upload {
        Upload::new(name, b"%PDF-1.4".to_vec())
    }

    async fn ready(service: &FakeService) -> DocumentReview {
        let mut review = DocumentReview::new();
        let outcome = review.submit(service, upload("scan.pdf")).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
        review
    }

    #[tokio::test]
    async fn test_submit_reaches_ready() {
        let service = FakeService::new();
        let review = ready(&service).await;
        assert_eq!(review.phase(), DocumentPhase::Ready);
        assert_eq!(review.display_text(), Some("raw ocr text"));
        assert_eq!(review.file().map(|f| f.file_name.as_str()), Some("scan.pdf"));
    }

    #[test]
    fn test_processing_phase_while_in_flight() {
        let mut review = DocumentReview::new();
        assert_eq!(review.phase(), DocumentPhase::Empty);
        let ticket = review.begin_submit(upload("a.png")).unwrap();
        assert_eq!(review.phase(), DocumentPhase::Processing);
        assert!(review.begin_edit().is_err());

        let outcome = review.finish_submit(ticket, Ok(Document::new("text")));
        assert!(outcome.is_applied());
        assert_eq!(review.phase(), DocumentPhase::Ready);
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_prior_document() {
        let service = FakeService::new();
        let mut review = ready(&service).await;

        let failing = FakeService::failing(500, "internal error");
        let outcome = review.submit(&failing, upload("other.pdf")).await.unwrap();
        match outcome {
            Outcome::Failed(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("internal error"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(review.phase(), DocumentPhase::Ready);
        assert_eq!(review.display_text(), Some("raw ocr text"));
        assert!(review.error().unwrap().contains("500 - internal error"));
    }

    #[tokio::test]
    async fn test_failed_resubmit_keeps_prior_file() {
        let first = FakeService::new().with_document(Document::new("first text"));
        let mut review = DocumentReview::new();
        review.submit(&first, upload("first.pdf")).await.unwrap();

        let failing = FakeService::failing(500, "boom");
        let outcome = review.submit(&failing, upload("second.pdf")).await.unwrap();
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(review.file().map(|f| f.file_name.as_str()), Some("first.pdf"));
        assert_eq!(review.document().unwrap().raw_text, "first text");
    }

    #[test]
    fn test_file_changes_only_when_submit_succeeds() {
        let mut review = DocumentReview::new();
        let ticket = review.begin_submit(upload("a.pdf")).unwrap();
        assert!(review.file().is_none());

        review.finish_submit(ticket, Ok(Document::new("text")));
        assert_eq!(review.file().map(|f| f.file_name.as_str()), Some("a.pdf"));
    }

    #[tokio::test]
    async fn test_new_upload_replaces_document_wholesale() {
        let service = FakeService::new();
        let mut review = ready(&service).await;
        review.request_enhancement(&service).await.unwrap();
        assert!(review.document().unwrap().enhanced_text.is_some());

        let replacement = FakeService::new().with_document(Document::new("second file"));
        review.submit(&replacement, upload("second.pdf")).await.unwrap();

        let doc = review.document().unwrap();
        assert_eq!(doc.raw_text, "second file");
        assert!(doc.enhanced_text.is_none());
        assert!(review.draft().is_none());
    }

    #[tokio::test]
    async fn test_enhancement_sets_enhanced_text() {
        let service = FakeService::new();
        let mut review = ready(&service).await;
        assert!(review.can_enhance());

        let outcome = review.request_enhancement(&service).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(review.display_text(), Some("enhanced text"));
        assert_eq!(review.document().unwrap().raw_text, "raw ocr text");
    }

    #[tokio::test]
    async fn test_enhancement_failure_leaves_document() {
        let service = FakeService::new();
        let mut review = ready(&service).await;
        let failing = FakeService::failing(502, "bad gateway");
        let outcome = review.request_enhancement(&failing).await.unwrap();
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert!(review.document().unwrap().enhanced_text.is_none());
        assert_eq!(review.phase(), DocumentPhase::Ready);
    }

    #[test]
    fn test_enhancement_requires_text() {
        let mut review = DocumentReview::new();
        assert!(matches!(
            review.begin_enhancement(),
            Err(ReviewError::InvalidTransition { .. })
        ));
        review.restore(Document::new("")).unwrap();
        assert!(!review.can_enhance());
        assert!(matches!(
            review.begin_enhancement(),
            Err(ReviewError::Validation(_))
        ));
    }

    #[test]
    fn test_enhancing_and_editing_exclude_each_other() {
        let mut review = DocumentReview::new();
        review.restore(Document::new("text")).unwrap();

        let (ticket, _) = review.begin_enhancement().unwrap();
        assert_eq!(review.phase(), DocumentPhase::Enhancing);
        assert!(review.begin_edit().is_err());
        review.finish_enhancement(ticket, Ok("better".to_string()));

        review.begin_edit().unwrap();
        assert!(review.begin_enhancement().is_err());
    }

    #[test]
    fn test_begin_edit_uses_display_text() {
        let mut review = DocumentReview::new();
        let mut doc = Document::new("raw");
        doc.enhanced_text = Some("enhanced".to_string());
        review.restore(doc).unwrap();

        review.begin_edit().unwrap();
        assert_eq!(review.phase(), DocumentPhase::Editing);
        assert_eq!(review.draft(), Some("enhanced"));
    }

    #[test]
    fn test_cancel_edit_discards_draft() {
        let mut review = DocumentReview::new();
        review.restore(Document::new("raw")).unwrap();
        review.begin_edit().unwrap();
        review.set_draft("changed").unwrap();
        review.cancel_edit().unwrap();

        assert_eq!(review.phase(), DocumentPhase::Ready);
        assert!(review.draft().is_none());
        assert_eq!(review.display_text(), Some("raw"));
    }

    #[tokio::test]
    async fn test_commit_uses_server_text() {
        let service = FakeService::new().with_final_text("Server Text");
        let mut review = ready(&service).await;
        review.begin_edit().unwrap();
        review.set_draft("my text").unwrap();

        let outcome = review.commit_edit(&service).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(review.phase(), DocumentPhase::Ready);
        assert_eq!(review.display_text(), Some("Server Text"));
        assert_eq!(service.last_edited_text().as_deref(), Some("my text"));
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_draft() {
        let service = FakeService::new();
        let mut review = ready(&service).await;
        review.begin_edit().unwrap();
        review.set_draft("precious edits").unwrap();

        let failing = FakeService::failing(500, "internal error");
        let outcome = review.commit_edit(&failing).await.unwrap();
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(review.phase(), DocumentPhase::Editing);
        assert_eq!(review.draft(), Some("precious edits"));
        assert!(review.document().unwrap().enhanced_text.is_none());
    }

    #[test]
    fn test_commit_rejects_empty_draft() {
        let mut review = DocumentReview::new();
        review.restore(Document::new("raw")).unwrap();
        review.begin_edit().unwrap();
        review.set_draft("   ").unwrap();
        assert!(matches!(review.begin_commit(), Err(ReviewError::Validation(_))));
        assert_eq!(review.phase(), DocumentPhase::Editing);
    }

    #[test]
    fn test_saving_phase_blocks_cancel() {
        let mut review = DocumentReview::new();
        review.restore(Document::new("raw")).unwrap();
        review.begin_edit().unwrap();
        let (ticket, draft) = review.begin_commit().unwrap();
        assert_eq!(draft, "raw");
        assert_eq!(review.phase(), DocumentPhase::Saving);
        assert!(review.cancel_edit().is_err());

        review.finish_commit(ticket, Ok("raw".to_string()));
        assert_eq!(review.phase(), DocumentPhase::Ready);
    }

    #[test]
    fn test_remove_file_makes_responses_stale() {
        let mut review = DocumentReview::new();
        let ticket = review.begin_submit(upload("a.pdf")).unwrap();
        review.remove_file();
        assert_eq!(review.phase(), DocumentPhase::Empty);

        let outcome = review.finish_submit(ticket, Ok(Document::new("late")));
        assert_eq!(outcome, Outcome::Stale);
        assert!(review.document().is_none());
        assert!(review.file().is_none());
    }

    #[test]
    fn test_late_enhancement_after_new_document_is_dropped() {
        let mut review = DocumentReview::new();
        review.restore(Document::new("first")).unwrap();
        let (enhance, _) = review.begin_enhancement().unwrap();

        review.remove_file();
        let submit = review.begin_submit(upload("b.pdf")).unwrap();
        review.finish_submit(submit, Ok(Document::new("second")));

        let outcome = review.finish_enhancement(enhance, Ok("first, enhanced".to_string()));
        assert_eq!(outcome, Outcome::Stale);
        assert!(review.document().unwrap().enhanced_text.is_none());
    }

    #[test]
    fn test_export_text_naming() {
        let mut review = DocumentReview::new();
        assert!(review.export_text().is_none());
        let mut doc = Document::new("plain text");
        doc.document_type = Some("prescription".to_string());
        review.restore(doc).unwrap();

        let export = review.export_text().unwrap();
        assert_eq!(export.file_name, "extracted-text-prescription.txt");
        assert_eq!(export.content, "plain text");
    }
}
