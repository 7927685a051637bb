//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::PaymentNotFound | Self::NoPendingConfirmation => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::PaymentAlreadyRefunded
            | Self::PendingConfirmationExists
            | Self::ConflictingResolution
            | Self::StrandedPendencyExists
            | Self::PendencyAlreadyHeld => StatusCode::CONFLICT,

            // 502 Bad Gateway (terminal refused)
            Self::TerminalRejected => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::TerminalTransport => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::InternalError | Self::StorageError | Self::Unknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            ErrorCode::PendingConfirmationExists.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::TerminalTransport.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::PaymentNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ValidationFailed.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
