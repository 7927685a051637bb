//! Unified error codes
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 5xxx: Payment / terminal errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility with the POS front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 5xxx: Payment ====================
    /// Payment has already been cancelled
    PaymentAlreadyRefunded = 5004,

    // ==================== 51xx: Terminal ====================
    /// A pending confirmation blocks new authorizations
    PendingConfirmationExists = 5101,
    /// Terminal did not answer within the deadline, or the channel failed
    TerminalTransport = 5102,
    /// Terminal answered but refused the operation
    TerminalRejected = 5103,
    /// No pending confirmation to resolve
    NoPendingConfirmation = 5104,
    /// A different resolution was already dispatched for this pendency
    ConflictingResolution = 5105,
    /// Approved payment not found in history
    PaymentNotFound = 5106,
    /// A stranded pendency is already parked
    StrandedPendencyExists = 5107,
    /// Pendency slot already occupied
    PendencyAlreadyHeld = 5108,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Storage error
    StorageError = 9002,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidRequest => "Invalid request",

            // Payment
            ErrorCode::PaymentAlreadyRefunded => "Payment has already been cancelled",

            // Terminal
            ErrorCode::PendingConfirmationExists => "Terminal has a pending confirmation",
            ErrorCode::TerminalTransport => "Terminal did not respond",
            ErrorCode::TerminalRejected => "Terminal rejected the operation",
            ErrorCode::NoPendingConfirmation => "No pending confirmation",
            ErrorCode::ConflictingResolution => {
                "A different resolution was already sent for this pendency"
            }
            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::StrandedPendencyExists => "A stranded pendency already exists",
            ErrorCode::PendencyAlreadyHeld => "A pendency is already held",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::StorageError => "Storage error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            5 => Ok(ErrorCode::InvalidRequest),

            // Payment
            5004 => Ok(ErrorCode::PaymentAlreadyRefunded),

            // Terminal
            5101 => Ok(ErrorCode::PendingConfirmationExists),
            5102 => Ok(ErrorCode::TerminalTransport),
            5103 => Ok(ErrorCode::TerminalRejected),
            5104 => Ok(ErrorCode::NoPendingConfirmation),
            5105 => Ok(ErrorCode::ConflictingResolution),
            5106 => Ok(ErrorCode::PaymentNotFound),
            5107 => Ok(ErrorCode::StrandedPendencyExists),
            5108 => Ok(ErrorCode::PendencyAlreadyHeld),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::StorageError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
