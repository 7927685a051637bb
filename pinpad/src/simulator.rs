//! In-process terminal used for certification runs and tests
//!
//! Behaves like a two-phase-capture pinpad: it remembers one open pendency,
//! refuses new authorizations while it exists and accepts confirm / undo
//! decisions addressed to it. Each operation can be scripted to reply with
//! a canned event, hang, drop its reply channel or fail at submission.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use shared::payment::{
    AuthorizationRequest, CancellationRequest, PaymentMethod, PendencyProbe, ReceiptPair,
    Resolution,
};
use shared::util::format_minor_units;

use crate::bridge::{
    Ack, BridgeError, BridgeResult, Reply, TerminalBridge, TerminalReply, TransactionData,
};

/// Canned behavior for the next authorization or cancellation
#[derive(Debug, Clone)]
pub enum Script {
    Reply(TerminalReply),
    /// Accept the submission and never answer
    Hang,
    /// Accept the submission and drop the reply channel
    Drop,
    SubmitError(BridgeError),
}

/// Canned behavior for the next confirm / undo
#[derive(Debug, Clone)]
pub enum ResolveScript {
    Ack(Ack),
    Hang,
    Drop,
}

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallLog {
    pub authorize: usize,
    pub resolve: usize,
    pub query: usize,
    pub cancel: usize,
    pub reprint: usize,
    /// Most operations ever awaiting a reply at the same time
    pub max_in_flight: usize,
}

#[derive(Debug, Default)]
struct DevicePendency {
    confirmation_id: Option<String>,
    nsu: Option<String>,
}

impl DevicePendency {
    fn matches(&self, key: &str) -> bool {
        self.confirmation_id.as_deref() == Some(key) || self.nsu.as_deref() == Some(key)
    }
}

#[derive(Debug, Default)]
struct SimState {
    authorize_scripts: VecDeque<Script>,
    resolve_scripts: VecDeque<ResolveScript>,
    cancel_scripts: VecDeque<Script>,
    query_error: Option<BridgeError>,
    pendency: Option<DevicePendency>,
    last_receipts: Option<ReceiptPair>,
    decisions: Vec<(Option<String>, Resolution)>,
    calls: CallLog,
    next_nsu: u64,
    // Senders of hung operations, kept so the channel stays open
    hung_replies: Vec<Reply<TerminalReply>>,
    hung_acks: Vec<Reply<Ack>>,
    not_ready: bool,
}

/// Simulated pinpad
#[derive(Debug, Default)]
pub struct SimulatedTerminal {
    state: Mutex<SimState>,
    in_flight: Arc<AtomicUsize>,
    latency: Option<Duration>,
    two_phase: bool,
}

impl SimulatedTerminal {
    /// Approves everything in one phase
    pub fn new() -> Self {
        Self::default()
    }

    /// Approvals require confirmation
    pub fn with_two_phase(mut self, two_phase: bool) -> Self {
        self.two_phase = two_phase;
        self
    }

    /// Replies arrive after `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_authorize(&self, script: Script) {
        self.state.lock().authorize_scripts.push_back(script);
    }

    pub fn push_resolve(&self, script: ResolveScript) {
        self.state.lock().resolve_scripts.push_back(script);
    }

    pub fn push_cancel(&self, script: Script) {
        self.state.lock().cancel_scripts.push_back(script);
    }

    /// Make the device hold (or stop holding) a pendency
    pub fn set_device_pendency(&self, confirmation_id: Option<&str>, nsu: Option<&str>) {
        self.state.lock().pendency = Some(DevicePendency {
            confirmation_id: confirmation_id.map(str::to_string),
            nsu: nsu.map(str::to_string),
        });
    }

    pub fn clear_device_pendency(&self) {
        self.state.lock().pendency = None;
    }

    pub fn has_device_pendency(&self) -> bool {
        self.state.lock().pendency.is_some()
    }

    pub fn set_query_error(&self, error: Option<BridgeError>) {
        self.state.lock().query_error = error;
    }

    pub fn set_last_receipts(&self, receipts: Option<ReceiptPair>) {
        self.state.lock().last_receipts = receipts;
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().not_ready = !ready;
    }

    /// Every confirm / undo received, in order
    pub fn decisions(&self) -> Vec<(Option<String>, Resolution)> {
        self.state.lock().decisions.clone()
    }

    pub fn calls(&self) -> CallLog {
        self.state.lock().calls
    }

    pub fn authorize_calls(&self) -> usize {
        self.calls().authorize
    }

    pub fn cancel_calls(&self) -> usize {
        self.calls().cancel
    }

    fn begin(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        state.calls.max_in_flight = state.calls.max_in_flight.max(now);
    }

    /// Deliver a reply, after the configured latency if any
    fn deliver<T: Send + 'static>(&self, reply: Reply<T>, value: T) {
        let in_flight = self.in_flight.clone();
        match self.latency {
            Some(latency) => {
                tokio::spawn(async move {
                    tokio::time::sleep(latency).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    let _ = reply.send(value);
                });
            }
            None => {
                in_flight.fetch_sub(1, Ordering::SeqCst);
                let _ = reply.send(value);
            }
        }
    }

    fn run_script(&self, script: Script, reply: Reply<TerminalReply>) -> BridgeResult<()> {
        match script {
            Script::Reply(event) => {
                self.absorb(&event);
                self.deliver(reply, event);
            }
            Script::Hang => self.state.lock().hung_replies.push(reply),
            Script::Drop => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                drop(reply);
            }
            // Handled before the operation is counted as in flight
            Script::SubmitError(e) => return Err(e),
        }
        Ok(())
    }

    /// Update device state from a scripted event
    fn absorb(&self, event: &TerminalReply) {
        if let TerminalReply::Completed(data) = event {
            let mut state = self.state.lock();
            if data.approved && data.requires_confirmation {
                state.pendency = Some(DevicePendency {
                    confirmation_id: data.confirmation_id.clone(),
                    nsu: data.nsu.clone(),
                });
            }
            state.last_receipts = Some(ReceiptPair {
                customer_receipt: data.customer_receipt.clone(),
                merchant_receipt: data.merchant_receipt.clone(),
            });
        }
    }

    fn approve(&self, order_id: &str, amount: i64, method: PaymentMethod, kind: &str) -> TerminalReply {
        let mut state = self.state.lock();
        state.next_nsu += 1;
        let nsu = format!("{:06}", state.next_nsu);
        let confirmation_id = format!("C{}", state.next_nsu);
        let receipt = |via: &str| {
            format!(
                "{}\n{} {}\nVALOR: {}\nPEDIDO: {}\nNSU: {}\n",
                via,
                kind,
                method,
                format_minor_units(amount),
                order_id,
                nsu
            )
        };
        let data = TransactionData {
            approved: true,
            nsu: Some(nsu.clone()),
            authorization_code: Some(format!("A{}", nsu)),
            card_brand: (method != PaymentMethod::Pix).then(|| "SIMCARD".to_string()),
            response_code: Some("00".to_string()),
            message: Some(format!("{} APROVADA", kind)),
            requires_confirmation: self.two_phase,
            confirmation_id: self.two_phase.then(|| confirmation_id.clone()),
            customer_receipt: receipt("VIA CLIENTE"),
            merchant_receipt: receipt("VIA ESTABELECIMENTO"),
        };
        if self.two_phase {
            state.pendency = Some(DevicePendency {
                confirmation_id: Some(confirmation_id),
                nsu: Some(nsu),
            });
        }
        state.last_receipts = Some(ReceiptPair {
            customer_receipt: data.customer_receipt.clone(),
            merchant_receipt: data.merchant_receipt.clone(),
        });
        TerminalReply::Completed(data)
    }
}

fn pending_refusal() -> TerminalReply {
    TerminalReply::Failed {
        code: Some("PP".to_string()),
        message: "TRANSACAO PENDENTE".to_string(),
    }
}

#[async_trait]
impl TerminalBridge for SimulatedTerminal {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        reply: Reply<TerminalReply>,
    ) -> BridgeResult<()> {
        let script = {
            let mut state = self.state.lock();
            state.calls.authorize += 1;
            state.authorize_scripts.pop_front()
        };
        debug!(order_id = %request.order_id, scripted = script.is_some(), "Simulated authorize");
        if let Some(Script::SubmitError(e)) = script {
            return Err(e);
        }
        self.begin();
        if let Some(script) = script {
            return self.run_script(script, reply);
        }

        let event = if self.has_device_pendency() {
            pending_refusal()
        } else {
            self.approve(
                &request.order_id,
                request.amount_minor_units,
                request.method,
                "VENDA",
            )
        };
        self.deliver(reply, event);
        Ok(())
    }

    async fn resolve_pendency(
        &self,
        confirmation_id: Option<&str>,
        resolution: Resolution,
        reply: Reply<Ack>,
    ) -> BridgeResult<()> {
        let (script, ack) = {
            let mut state = self.state.lock();
            state.calls.resolve += 1;
            state
                .decisions
                .push((confirmation_id.map(str::to_string), resolution));
            let script = state.resolve_scripts.pop_front();
            let ack = match (&state.pendency, confirmation_id) {
                // Nothing open: already resolved
                (None, _) => Ack::Accepted,
                (Some(_), None) => Ack::Accepted,
                (Some(p), Some(key)) if p.matches(key) => Ack::Accepted,
                (Some(_), Some(key)) => Ack::Rejected(format!("PENDENCIA {} NAO ENCONTRADA", key)),
            };
            if script.is_none() && ack == Ack::Accepted {
                state.pendency = None;
            }
            (script, ack)
        };

        self.begin();
        match script {
            None => self.deliver(reply, ack),
            Some(ResolveScript::Ack(ack)) => {
                if ack == Ack::Accepted {
                    self.clear_device_pendency();
                }
                self.deliver(reply, ack);
            }
            Some(ResolveScript::Hang) => self.state.lock().hung_acks.push(reply),
            Some(ResolveScript::Drop) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                drop(reply);
            }
        }
        Ok(())
    }

    async fn query_pendency(&self) -> BridgeResult<PendencyProbe> {
        let mut state = self.state.lock();
        state.calls.query += 1;
        if let Some(e) = state.query_error.clone() {
            return Err(e);
        }
        Ok(match &state.pendency {
            Some(p) => PendencyProbe {
                exists: true,
                confirmation_id: p.confirmation_id.clone(),
                fallback_nsu: p.nsu.clone(),
            },
            None => PendencyProbe::none(),
        })
    }

    async fn cancel_settled(
        &self,
        request: &CancellationRequest,
        reply: Reply<TerminalReply>,
    ) -> BridgeResult<()> {
        let script = {
            let mut state = self.state.lock();
            state.calls.cancel += 1;
            state.cancel_scripts.pop_front()
        };
        if let Some(Script::SubmitError(e)) = script {
            return Err(e);
        }
        self.begin();
        if let Some(script) = script {
            return self.run_script(script, reply);
        }

        let event = if request.method == PaymentMethod::Pix {
            TerminalReply::Failed {
                code: Some("57".to_string()),
                message: "CANCELAMENTO NAO PERMITIDO PARA PIX".to_string(),
            }
        } else if self.has_device_pendency() {
            pending_refusal()
        } else {
            let mut event = self.approve(
                &request.order_id,
                request.amount_minor_units,
                request.method,
                "CANCELAMENTO",
            );
            // reversals are captured in one phase here
            if let TerminalReply::Completed(data) = &mut event {
                data.requires_confirmation = false;
                data.confirmation_id = None;
            }
            self.clear_device_pendency();
            event
        };
        self.deliver(reply, event);
        Ok(())
    }

    async fn reprint_last(&self, reply: Reply<Option<ReceiptPair>>) -> BridgeResult<()> {
        let receipts = {
            let mut state = self.state.lock();
            state.calls.reprint += 1;
            state.last_receipts.clone()
        };
        self.begin();
        self.deliver(reply, receipts);
        Ok(())
    }

    async fn is_device_ready(&self) -> bool {
        !self.state.lock().not_ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_two_phase_approval_opens_pendency() {
        let sim = SimulatedTerminal::new().with_two_phase(true);
        let (tx, rx) = oneshot::channel();
        let request = AuthorizationRequest::new("o1", 1000, PaymentMethod::Credit);
        sim.authorize(&request, tx).await.unwrap();

        let TerminalReply::Completed(data) = rx.await.unwrap() else {
            panic!("expected a transaction record");
        };
        assert!(data.approved && data.requires_confirmation);
        assert_eq!(data.confirmation_id.as_deref(), Some("C1"));
        assert!(data.customer_receipt.contains("10.00"));

        let probe = sim.query_pendency().await.unwrap();
        assert!(probe.exists);
        assert_eq!(probe.fallback_nsu.as_deref(), Some("000001"));

        // the device refuses new work until the pendency is closed
        let (tx, rx) = oneshot::channel();
        sim.authorize(&request, tx).await.unwrap();
        assert_eq!(rx.await.unwrap(), pending_refusal());
    }

    #[tokio::test]
    async fn test_resolve_by_nsu_or_intent() {
        let sim = SimulatedTerminal::new();
        sim.set_device_pendency(Some("X1"), Some("000010"));

        let (tx, rx) = oneshot::channel();
        sim.resolve_pendency(Some("WRONG"), Resolution::UndoneManual, tx)
            .await
            .unwrap();
        assert!(matches!(rx.await.unwrap(), Ack::Rejected(_)));
        assert!(sim.has_device_pendency());

        let (tx, rx) = oneshot::channel();
        sim.resolve_pendency(Some("000010"), Resolution::ConfirmedManual, tx)
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), Ack::Accepted);
        assert!(!sim.has_device_pendency());

        sim.set_device_pendency(None, None);
        let (tx, rx) = oneshot::channel();
        sim.resolve_pendency(None, Resolution::UndoneManual, tx)
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), Ack::Accepted);
        assert!(!sim.has_device_pendency());
        assert_eq!(sim.calls().resolve, 3);
    }

    #[tokio::test]
    async fn test_submit_error_script() {
        let sim = SimulatedTerminal::new();
        sim.push_authorize(Script::SubmitError(BridgeError::Busy));
        let (tx, _rx) = oneshot::channel();
        let request = AuthorizationRequest::new("o1", 1000, PaymentMethod::Debit);
        assert_eq!(sim.authorize(&request, tx).await, Err(BridgeError::Busy));
        assert_eq!(sim.calls().max_in_flight, 0);
    }
}
