//! Serialized access to the terminal
//!
//! The device runs one operation at a time. [`Terminal::session`] hands out
//! the single gate; every bridge call is made through a [`Session`], which
//! turns the callback-style bridge into a bounded wait on a single-shot
//! channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, oneshot};
use tracing::{debug, instrument, warn};

use shared::payment::{
    AuthorizationRequest, CancellationRequest, PendencyProbe, ReceiptPair, Resolution,
};

use crate::bridge::{Ack, BridgeOperation, BridgeResult, Reply, TerminalBridge, TerminalReply};
use crate::config::Deadlines;
use crate::error::{TerminalError, TerminalResult};
use crate::record::{OperationRecord, OperationSink};

/// The one physical terminal shared by the process
pub struct Terminal {
    bridge: Arc<dyn TerminalBridge>,
    gate: Mutex<()>,
    deadlines: Deadlines,
    sink: Arc<dyn OperationSink>,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("bridge", &self.bridge)
            .field("deadlines", &self.deadlines)
            .finish_non_exhaustive()
    }
}

impl Terminal {
    pub fn new(
        bridge: Arc<dyn TerminalBridge>,
        deadlines: Deadlines,
        sink: Arc<dyn OperationSink>,
    ) -> Self {
        Self {
            bridge,
            gate: Mutex::new(()),
            deadlines,
            sink,
        }
    }

    /// Wait for exclusive use of the terminal
    pub async fn session(&self) -> Session<'_> {
        let guard = self.gate.lock().await;
        Session {
            terminal: self,
            _guard: guard,
        }
    }

    /// Device presence check, outside the gate
    ///
    /// Polled by the screen; must not queue behind a card dip.
    pub async fn is_device_ready(&self) -> bool {
        self.bridge.is_device_ready().await
    }

    /// Emit one operation record
    pub fn record(&self, record: OperationRecord) {
        tracing::info!(
            target: "audit",
            kind = %record.kind,
            order_id = record.order_id.as_deref().unwrap_or(""),
            nsu = record.nsu.as_deref().unwrap_or(""),
            confirmation = record.confirmation.as_deref().unwrap_or(""),
            "TERMINAL"
        );
        self.sink.record(record);
    }

    pub fn deadlines(&self) -> &Deadlines {
        &self.deadlines
    }
}

/// Exclusive use of the terminal; dropping it releases the gate
pub struct Session<'a> {
    terminal: &'a Terminal,
    _guard: MutexGuard<'a, ()>,
}

impl Session<'_> {
    pub fn terminal(&self) -> &Terminal {
        self.terminal
    }

    #[instrument(skip_all, fields(order_id = %request.order_id, amount = request.amount_minor_units))]
    pub async fn authorize(&self, request: &AuthorizationRequest) -> TerminalResult<TerminalReply> {
        let bridge = &self.terminal.bridge;
        self.exchange(BridgeOperation::Authorize, |reply| {
            bridge.authorize(request, reply)
        })
        .await
    }

    /// Send a confirm / undo decision and wait for the acknowledgement
    #[instrument(skip(self))]
    pub async fn resolve_pendency(
        &self,
        confirmation_id: Option<&str>,
        resolution: Resolution,
    ) -> TerminalResult<()> {
        let bridge = &self.terminal.bridge;
        let ack = self
            .exchange(BridgeOperation::ResolvePendency, |reply| {
                bridge.resolve_pendency(confirmation_id, resolution, reply)
            })
            .await?;
        match ack {
            Ack::Accepted => Ok(()),
            Ack::Rejected(reason) => Err(TerminalError::Rejected {
                operation: BridgeOperation::ResolvePendency,
                reason,
            }),
        }
    }

    #[instrument(skip(self))]
    pub async fn query_pendency(&self) -> TerminalResult<PendencyProbe> {
        let operation = BridgeOperation::QueryPendency;
        let deadline = self.terminal.deadlines.for_operation(operation);
        match tokio::time::timeout(deadline, self.terminal.bridge.query_pendency()).await {
            Ok(Ok(probe)) => Ok(probe),
            Ok(Err(e)) => Err(TerminalError::transport(operation, e.to_string())),
            Err(_) => Err(deadline_expired(operation, deadline)),
        }
    }

    #[instrument(skip_all, fields(order_id = %request.order_id, nsu = %request.nsu))]
    pub async fn cancel_settled(&self, request: &CancellationRequest) -> TerminalResult<TerminalReply> {
        let bridge = &self.terminal.bridge;
        self.exchange(BridgeOperation::CancelSettled, |reply| {
            bridge.cancel_settled(request, reply)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn reprint_last(&self) -> TerminalResult<Option<ReceiptPair>> {
        let bridge = &self.terminal.bridge;
        self.exchange(BridgeOperation::ReprintLast, |reply| bridge.reprint_last(reply))
            .await
    }

    /// Submit one operation and wait for its single reply, bounded by the
    /// operation's deadline (submission included)
    async fn exchange<T, F, Fut>(
        &self,
        operation: BridgeOperation,
        submit: F,
    ) -> TerminalResult<T>
    where
        F: FnOnce(Reply<T>) -> Fut,
        Fut: Future<Output = BridgeResult<()>>,
    {
        let deadline = self.terminal.deadlines.for_operation(operation);
        let (tx, rx) = oneshot::channel();

        let round_trip = async move {
            submit(tx)
                .await
                .map_err(|e| TerminalError::transport(operation, e.to_string()))?;
            debug!(%operation, "Submitted to terminal, waiting for reply");
            rx.await.map_err(|_| {
                TerminalError::transport(operation, "terminal dropped the reply channel")
            })
        };

        match tokio::time::timeout(deadline, round_trip).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%operation, deadline_ms = deadline.as_millis() as u64, "Terminal did not respond");
                Err(deadline_expired(operation, deadline))
            }
        }
    }
}

fn deadline_expired(operation: BridgeOperation, deadline: Duration) -> TerminalError {
    TerminalError::transport(
        operation,
        format!("no response within {} ms", deadline.as_millis()),
    )
}
