//! Review state machines for a document's text and its extracted entities.
//!
//! Each long-running action is split into `begin_*`, which validates the
//! transition and hands back a [`Ticket`], and `finish_*`, which applies the
//! response only if the ticket is still current. The `async` convenience
//! methods run both halves against a [`DocumentService`](crate::client::DocumentService).

pub mod document;
pub mod entities;
pub mod sequence;

#[cfg(test)]
pub(crate) mod testing;

pub use document::{DocumentPhase, DocumentReview};
pub use entities::{EntityField, EntityPhase, EntityReview, EntitySource};
pub use sequence::{Sequencer, Slot, Ticket};

/// What happened to a response handed to a `finish_*` method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The call failed; the message is recorded as the session error.
    Failed(String),
    /// The ticket was superseded; the response was discarded.
    Stale,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}
