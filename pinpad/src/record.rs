//! Operation records
//!
//! One record per coordinator decision point. Storage, date partitioning
//! and retention belong to whatever [`OperationSink`] the host plugs in.

use std::sync::OnceLock;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use shared::payment::{
    AuthorizationOutcome, AuthorizationRequest, CancellationRequest, OutcomeStatus,
    PendingConfirmation, Resolution,
};
use shared::util::now_millis;

// 进程启动基准 (单调时钟)
static PROCESS_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_ms() -> u64 {
    PROCESS_START.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// Decision points recorded by the coordinator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    AuthorizeSubmitted,
    OutcomeReceived,
    PendencyCreated,
    PendencyResolved,
    PendencyResolutionFailed,
    PendencyRecovered,
    PendencyStranded,
    CancellationSubmitted,
    CancellationResult,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structured record of one decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationRecord {
    pub kind: OperationKind,
    /// Milliseconds since process start (monotonic)
    pub monotonic_ms: u64,
    /// Wall clock, Unix millis
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_minor_units: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    /// Confirmation identity as shown to the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OutcomeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OperationRecord {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            monotonic_ms: monotonic_ms(),
            timestamp: now_millis(),
            order_id: None,
            amount_minor_units: None,
            nsu: None,
            authorization_code: None,
            confirmation: None,
            status: None,
            resolution: None,
            detail: None,
        }
    }

    pub fn submitted(request: &AuthorizationRequest) -> Self {
        let mut record = Self::new(OperationKind::AuthorizeSubmitted);
        record.order_id = Some(request.order_id.clone());
        record.amount_minor_units = Some(request.amount_minor_units);
        record.detail = Some(format!(
            "{} {:?} x{}",
            request.method, request.financing, request.installment_count
        ));
        record
    }

    pub fn outcome(kind: OperationKind, outcome: &AuthorizationOutcome) -> Self {
        let mut record = Self::new(kind);
        record.order_id = Some(outcome.order_id.clone());
        record.amount_minor_units = Some(outcome.amount_minor_units);
        record.nsu = outcome.nsu.clone();
        record.authorization_code = outcome.authorization_code.clone();
        record.confirmation = outcome.confirmation_id.clone();
        record.status = Some(outcome.status);
        record.detail = outcome.reason.clone();
        record
    }

    pub fn pendency(kind: OperationKind, pending: &PendingConfirmation) -> Self {
        let mut record = Self::new(kind);
        record.order_id = pending.order_id.clone();
        record.amount_minor_units = pending.amount_minor_units;
        record.nsu = pending.nsu.clone();
        record.confirmation = Some(pending.display_id());
        record
    }

    pub fn cancellation(request: &CancellationRequest) -> Self {
        let mut record = Self::new(OperationKind::CancellationSubmitted);
        record.order_id = Some(request.order_id.clone());
        record.amount_minor_units = Some(request.amount_minor_units);
        record.nsu = Some(request.nsu.clone());
        record.authorization_code = Some(request.authorization_code.clone());
        record
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Receiver of operation records
pub trait OperationSink: Send + Sync {
    fn record(&self, record: OperationRecord);
}

/// Discards records
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OperationSink for NullSink {
    fn record(&self, _record: OperationRecord) {}
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<OperationRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OperationRecord> {
        self.records.lock().clone()
    }

    pub fn kinds(&self) -> Vec<OperationKind> {
        self.records.lock().iter().map(|r| r.kind).collect()
    }
}

impl OperationSink for MemorySink {
    fn record(&self, record: OperationRecord) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::payment::PaymentMethod;

    #[test]
    fn test_monotonic_never_goes_back() {
        let a = OperationRecord::new(OperationKind::OutcomeReceived);
        let b = OperationRecord::new(OperationKind::OutcomeReceived);
        assert!(b.monotonic_ms >= a.monotonic_ms);
    }

    #[test]
    fn test_submitted_record() {
        let request = AuthorizationRequest::new("order-7", 1234, PaymentMethod::Debit);
        let record = OperationRecord::submitted(&request);
        assert_eq!(record.kind, OperationKind::AuthorizeSubmitted);
        assert_eq!(record.order_id.as_deref(), Some("order-7"));
        assert_eq!(record.amount_minor_units, Some(1234));
        assert_eq!(record.detail.as_deref(), Some("debit SinglePayment x1"));
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.record(OperationRecord::new(OperationKind::PendencyCreated));
        sink.record(
            OperationRecord::new(OperationKind::PendencyResolved)
                .with_resolution(Resolution::ConfirmedManual),
        );
        assert_eq!(
            sink.kinds(),
            vec![OperationKind::PendencyCreated, OperationKind::PendencyResolved]
        );
        assert_eq!(
            sink.records()[1].resolution,
            Some(Resolution::ConfirmedManual)
        );
    }

    #[test]
    fn test_record_serializes_snake_case() {
        let record = OperationRecord::new(OperationKind::PendencyRecovered);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"pendency_recovered\""));
        assert!(!json.contains("order_id"));
    }
}
