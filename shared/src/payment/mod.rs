//! Payment-terminal data model
//!
//! Types exchanged between the POS screen, the terminal coordinator and the
//! terminal driver:
//! - Requests: what the caller asks the terminal to do
//! - Outcomes: what the terminal answered, classified
//! - Pendencies: approvals whose capture still waits for confirm / undo

pub mod types;

// Re-exports
pub use types::*;
