//! # pinpad
//!
//! Payment-terminal transaction coordination.
//!
//! ## Scope
//!
//! This crate drives ONE physical card / PIX terminal through an
//! asynchronous bridge and enforces the post-authorization protocol:
//! - Authorization with bounded waits ([`TransactionCoordinator`])
//! - Confirm / undo of two-phase approvals, cold-start recovery and
//!   automatic undo of stranded pendencies ([`ConfirmationResolver`])
//! - Reversal of settled transactions ([`CancellationCoordinator`])
//! - Reprint of the last receipts ([`ReceiptReprintService`])
//!
//! Every bridge call goes through a single gate ([`Terminal`]): the device
//! has no concept of concurrent sessions.
//!
//! Platform drivers implement [`TerminalBridge`]. [`SimulatedTerminal`] is a
//! scripted in-process driver for certification runs and tests.
//!
//! ## Example
//!
//! ```ignore
//! use pinpad::{TerminalService, TerminalConfig, SimulatedTerminal, NullSink};
//! use shared::payment::{AuthorizationRequest, PaymentMethod, Resolution};
//!
//! let service = TerminalService::new(
//!     Arc::new(SimulatedTerminal::new()),
//!     TerminalConfig::default(),
//!     Arc::new(NullSink),
//! );
//! service.recover_from_cold_start().await?;
//!
//! let outcome = service
//!     .authorize(&AuthorizationRequest::new("order-1", 500000, PaymentMethod::Credit))
//!     .await?;
//! if outcome.needs_confirmation() {
//!     service.resolve(Resolution::ConfirmedManual).await?;
//! }
//! ```

mod bridge;
mod cancellation;
mod classify;
mod config;
mod coordinator;
mod error;
mod record;
mod reprint;
mod resolver;
mod service;
mod simulator;
mod terminal;

// Re-exports
pub use bridge::{
    Ack, BridgeError, BridgeOperation, BridgeResult, Reply, TerminalBridge, TerminalReply,
    TransactionData,
};
pub use cancellation::CancellationCoordinator;
pub use classify::{classify_authorization, classify_cancellation, is_cancellation_message};
pub use config::{ConfirmationPolicy, Deadlines, TerminalConfig};
pub use coordinator::TransactionCoordinator;
pub use error::{TerminalError, TerminalResult};
pub use record::{MemorySink, NullSink, OperationKind, OperationRecord, OperationSink};
pub use reprint::ReceiptReprintService;
pub use resolver::ConfirmationResolver;
pub use service::TerminalService;
pub use simulator::{CallLog, ResolveScript, Script, SimulatedTerminal};
pub use terminal::{Session, Terminal};
