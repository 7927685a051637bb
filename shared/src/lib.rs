//! Shared types for the POS payment-terminal stack
//!
//! Common types used across crates: the payment-terminal data model,
//! the unified error system and small utilities.

pub mod error;
pub mod payment;
pub mod util;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
