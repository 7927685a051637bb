//! Error types for terminal coordination
//!
//! Denials and user cancellations are outcomes, not errors: they come back
//! as [`shared::payment::OutcomeStatus`] values.

use shared::error::{AppError, ErrorCode};
use shared::payment::{RequestError, Resolution};
use thiserror::Error;

use crate::bridge::BridgeOperation;

/// Terminal coordination errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TerminalError {
    /// A new authorization was attempted while a pendency is outstanding
    #[error("Pending confirmation {blocking_id} must be confirmed or undone first")]
    PendingConfirmationExists { blocking_id: String },

    /// Deadline expired or the reply channel failed
    #[error("{operation} failed: {reason}")]
    Transport {
        operation: BridgeOperation,
        reason: String,
    },

    /// Terminal answered and refused the operation
    #[error("{operation} rejected by terminal: {reason}")]
    Rejected {
        operation: BridgeOperation,
        reason: String,
    },

    /// Resolve called with an empty slot
    #[error("No pending confirmation to resolve")]
    NothingPending,

    /// Hold called while the slot is occupied
    #[error("Pending confirmation {held_id} is already held")]
    AlreadyHeld { held_id: String },

    /// Hold called with an outcome that needs no confirmation
    #[error("Outcome for order {order_id} does not require confirmation")]
    NotConfirmable { order_id: String },

    /// A retry asked for a different resolution than the one in flight
    #[error("{dispatched} already sent for pending confirmation {id}, refusing {requested}")]
    ConflictingResolution {
        id: String,
        dispatched: Resolution,
        requested: Resolution,
    },

    /// Leave-pending with a stranded pendency already parked
    #[error("Stranded pendency {stranded_id} must be resolved first")]
    StrandedPendencyExists { stranded_id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
}

impl TerminalError {
    pub fn transport(operation: BridgeOperation, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            reason: reason.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Result type for terminal operations
pub type TerminalResult<T> = Result<T, TerminalError>;

impl From<TerminalError> for AppError {
    fn from(err: TerminalError) -> Self {
        let message = err.to_string();
        match err {
            TerminalError::PendingConfirmationExists { blocking_id } => {
                AppError::with_message(ErrorCode::PendingConfirmationExists, message)
                    .with_detail("blocking_id", blocking_id)
            }
            TerminalError::Transport { operation, .. } => {
                AppError::with_message(ErrorCode::TerminalTransport, message)
                    .with_detail("operation", operation.as_str())
            }
            TerminalError::Rejected { operation, reason } => {
                AppError::with_message(ErrorCode::TerminalRejected, message)
                    .with_detail("operation", operation.as_str())
                    .with_detail("reason", reason)
            }
            TerminalError::NothingPending => {
                AppError::with_message(ErrorCode::NoPendingConfirmation, message)
            }
            TerminalError::AlreadyHeld { held_id } => {
                AppError::with_message(ErrorCode::PendencyAlreadyHeld, message)
                    .with_detail("held_id", held_id)
            }
            TerminalError::NotConfirmable { .. } => AppError::invalid_request(message),
            TerminalError::ConflictingResolution { id, dispatched, .. } => {
                AppError::with_message(ErrorCode::ConflictingResolution, message)
                    .with_detail("id", id)
                    .with_detail("dispatched", dispatched.to_string())
            }
            TerminalError::StrandedPendencyExists { stranded_id } => {
                AppError::with_message(ErrorCode::StrandedPendencyExists, message)
                    .with_detail("stranded_id", stranded_id)
            }
            TerminalError::InvalidRequest(_) => AppError::validation(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_exists_names_blocking_id() {
        let err = TerminalError::PendingConfirmationExists {
            blocking_id: "X1".to_string(),
        };
        assert!(err.to_string().contains("X1"));

        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::PendingConfirmationExists);
        assert_eq!(app.details.unwrap().get("blocking_id").unwrap(), "X1");
    }

    #[test]
    fn test_transport_carries_operation() {
        let err = TerminalError::transport(BridgeOperation::CancelSettled, "no response within 30000 ms");
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "cancel_settled failed: no response within 30000 ms"
        );

        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::TerminalTransport);
        assert_eq!(app.details.unwrap().get("operation").unwrap(), "cancel_settled");
    }

    #[test]
    fn test_invalid_request_maps_to_validation() {
        let err: TerminalError = RequestError::EmptyOrderId.into();
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::ValidationFailed);
    }
}
