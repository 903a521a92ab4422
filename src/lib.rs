//! Medoc Review - review state for OCR'd medical documents.
//!
//! Uploads a scanned document to the remote processing service, then tracks
//! the extracted text, its enhanced version, and the extracted entities
//! through fetch, edit, and save cycles.

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod handoff;
pub mod normalizer;
pub mod review;
pub mod schema;

pub use client::{DocumentService, HttpDocumentService};
pub use config::ServiceConfig;
pub use error::{Operation, ReviewError};
pub use normalizer::{normalize, EntityPayload};
pub use review::{DocumentReview, EntityReview, Outcome};
pub use schema::{Coordinates, Document, Entity, EntityCollection, EntityGroup, Upload};
