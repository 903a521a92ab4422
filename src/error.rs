//! Error taxonomy shared by the service client and the review state machines.

use std::fmt;

/// Remote operations exposed by the document service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ProcessDocument,
    EnhanceText,
    ExtractEntities,
    SubmitEditedText,
    ReviewEntities,
    SubmitEditedEntities,
    ReviewEnhancedText,
}

impl Operation {
    /// Human-readable prefix used in every failure message for this operation.
    pub fn failure_label(self) -> &'static str {
        match self {
            Self::ProcessDocument => "Failed to process document",
            Self::EnhanceText => "Failed to enhance text",
            Self::ExtractEntities => "Failed to extract entities",
            Self::SubmitEditedText => "Failed to save edited text",
            Self::ReviewEntities => "Failed to load entities",
            Self::SubmitEditedEntities => "Failed to save entities",
            Self::ReviewEnhancedText => "Failed to load review data",
        }
    }

    /// Path of the endpoint, relative to the service base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::ProcessDocument => "/process-document",
            Self::EnhanceText => "/enhance-text",
            Self::ExtractEntities => "/extract-entities",
            Self::SubmitEditedText => "/submit-edited-text",
            Self::ReviewEntities => "/review-entities",
            Self::SubmitEditedEntities => "/submit-edited-entities",
            Self::ReviewEnhancedText => "/review-enhanced-text",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path().trim_start_matches('/'))
    }
}

/// Every failure the client and review state machines report.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// Transport failure (DNS, connection refused, timeout). No HTTP status.
    #[error("{}: {message}", .operation.failure_label())]
    Network { operation: Operation, message: String },

    /// The service answered with a non-2xx status.
    #[error("{}: {status} - {body}", .operation.failure_label())]
    Service {
        operation: Operation,
        status: u16,
        body: String,
    },

    /// A response or payload could not be decoded.
    #[error("{0}")]
    Parse(String),

    /// Decoded data or local input had the wrong shape.
    #[error("{0}")]
    Validation(String),

    /// The action is not allowed in the current phase.
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },
}

impl ReviewError {
    /// Transport-level failure of `operation`.
    pub fn network(operation: Operation, err: impl fmt::Display) -> Self {
        Self::Network {
            operation,
            message: err.to_string(),
        }
    }

    /// Raw response body, when the failure carried one.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Service { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }

    /// HTTP status of a service error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_message() {
        let err = ReviewError::Service {
            operation: Operation::ProcessDocument,
            status: 500,
            body: "internal error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to process document: 500 - internal error"
        );
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.body(), Some("internal error"));
    }

    #[test]
    fn test_network_error_has_no_status() {
        let err = ReviewError::network(Operation::EnhanceText, "connection refused");
        assert_eq!(err.to_string(), "Failed to enhance text: connection refused");
        assert_eq!(err.status(), None);
        assert_eq!(err.body(), None);
    }

    #[test]
    fn test_operation_display_uses_path() {
        assert_eq!(Operation::SubmitEditedEntities.to_string(), "submit-edited-entities");
    }
}
