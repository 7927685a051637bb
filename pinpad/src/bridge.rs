//! Terminal bridge adapter
//!
//! The bridge is the asynchronous channel to the terminal driver. Every
//! operation is submitted together with a single-shot [`Reply`] sender; the
//! driver answers through it exactly once, or never (device unplugged,
//! driver crashed). Dropping the sender without answering is treated as a
//! channel failure.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use shared::payment::{AuthorizationRequest, CancellationRequest, PendencyProbe, ReceiptPair, Resolution};

/// Single-shot reply slot for one bridge operation
pub type Reply<T> = oneshot::Sender<T>;

/// Driver-side submission failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// Device is still working on an earlier operation
    #[error("Terminal busy")]
    Busy,

    /// Device not connected
    #[error("Terminal disconnected")]
    Disconnected,

    /// Any other driver failure
    #[error("Driver error: {0}")]
    Driver(String),
}

/// Result type for bridge submissions
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge operations, used for deadlines, logging and error context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeOperation {
    Authorize,
    ResolvePendency,
    QueryPendency,
    CancelSettled,
    ReprintLast,
}

impl BridgeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::ResolvePendency => "resolve_pendency",
            Self::QueryPendency => "query_pendency",
            Self::CancelSettled => "cancel_settled",
            Self::ReprintLast => "reprint_last",
        }
    }
}

impl std::fmt::Display for BridgeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction record produced by the terminal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionData {
    pub approved: bool,
    pub nsu: Option<String>,
    pub authorization_code: Option<String>,
    pub card_brand: Option<String>,
    pub response_code: Option<String>,
    /// Operator-facing text from the host or the terminal
    pub message: Option<String>,
    pub requires_confirmation: bool,
    pub confirmation_id: Option<String>,
    pub customer_receipt: String,
    pub merchant_receipt: String,
}

/// Raw terminal event for an authorization or a cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReply {
    /// The terminal produced a transaction record
    Completed(TransactionData),
    /// The terminal reported an error instead of a record
    Failed {
        code: Option<String>,
        message: String,
    },
}

/// Answer to a confirm / undo decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Accepted,
    Rejected(String),
}

/// Bridge adapter implemented by platform terminal drivers
///
/// Submission methods return as soon as the operation is handed to the
/// device; the result arrives later through `reply`.
#[async_trait]
pub trait TerminalBridge: Send + Sync + std::fmt::Debug {
    /// Start a card / PIX authorization
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        reply: Reply<TerminalReply>,
    ) -> BridgeResult<()>;

    /// Confirm or undo the pending transaction
    ///
    /// `confirmation_id = None` resolves whatever pendency the device holds.
    async fn resolve_pendency(
        &self,
        confirmation_id: Option<&str>,
        resolution: Resolution,
        reply: Reply<Ack>,
    ) -> BridgeResult<()>;

    /// Ask the device whether an unresolved pendency exists right now
    async fn query_pendency(&self) -> BridgeResult<PendencyProbe>;

    /// Reverse a settled transaction
    async fn cancel_settled(
        &self,
        request: &CancellationRequest,
        reply: Reply<TerminalReply>,
    ) -> BridgeResult<()>;

    /// Fetch the receipts of the last transaction (`None`: no record)
    async fn reprint_last(&self, reply: Reply<Option<ReceiptPair>>) -> BridgeResult<()>;

    /// Device presence / connectivity check
    async fn is_device_ready(&self) -> bool;
}
