//! Shared types for payment-terminal transactions

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{format_minor_units, now_millis};

// ============================================================================
// Request Types
// ============================================================================

/// Card / instant-payment method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Debit,
    Credit,
    Pix,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PaymentMethod::Debit => "debit",
            PaymentMethod::Credit => "credit",
            PaymentMethod::Pix => "pix",
        };
        f.write_str(name)
    }
}

/// How a credit transaction is split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Financing {
    /// 一次付清
    #[default]
    SinglePayment,
    /// Installments carried by the merchant
    MerchantInstallments,
    /// Installments carried by the card issuer
    IssuerInstallments,
}

/// Request validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("order id must not be empty")]
    EmptyOrderId,
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),
    #[error("installment count must be at least 1")]
    ZeroInstallments,
    #[error("{0} payments cannot be financed")]
    FinancingNotAllowed(PaymentMethod),
    #[error("{count} installments require an installment financing mode")]
    InstallmentsWithoutFinancing { count: u32 },
}

/// A single authorization attempt sent to the terminal
///
/// Immutable once submitted: the coordinator only ever borrows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Caller-supplied correlation id, unique per attempt
    pub order_id: String,
    /// Amount in minor units (cents)
    pub amount_minor_units: i64,
    pub method: PaymentMethod,
    /// Only meaningful for credit
    #[serde(default)]
    pub financing: Financing,
    #[serde(default = "default_installments")]
    pub installment_count: u32,
    /// Routing hint to a specific acquirer / test authorizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer_hint: Option<String>,
}

fn default_installments() -> u32 {
    1
}

impl AuthorizationRequest {
    pub fn new(order_id: impl Into<String>, amount_minor_units: i64, method: PaymentMethod) -> Self {
        Self {
            order_id: order_id.into(),
            amount_minor_units,
            method,
            financing: Financing::SinglePayment,
            installment_count: 1,
            authorizer_hint: None,
        }
    }

    pub fn with_financing(mut self, financing: Financing, installment_count: u32) -> Self {
        self.financing = financing;
        self.installment_count = installment_count;
        self
    }

    pub fn with_authorizer(mut self, hint: impl Into<String>) -> Self {
        self.authorizer_hint = Some(hint.into());
        self
    }

    /// Check the request before it reaches the terminal
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.order_id.trim().is_empty() {
            return Err(RequestError::EmptyOrderId);
        }
        if self.amount_minor_units <= 0 {
            return Err(RequestError::NonPositiveAmount(self.amount_minor_units));
        }
        if self.installment_count == 0 {
            return Err(RequestError::ZeroInstallments);
        }
        if self.method != PaymentMethod::Credit && self.financing != Financing::SinglePayment {
            return Err(RequestError::FinancingNotAllowed(self.method));
        }
        if self.installment_count > 1 && self.financing == Financing::SinglePayment {
            return Err(RequestError::InstallmentsWithoutFinancing {
                count: self.installment_count,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Outcome Types
// ============================================================================

/// Classified result of a terminal operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Approved,
    /// Processor-level rejection
    Denied,
    /// Operator or device-side abort
    CancelledByUser,
    /// Terminal did not answer within the deadline, or the channel failed
    TransportError,
}

/// Non-fatal conditions attached to an outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeWarning {
    /// Approval required confirmation but the terminal omitted the
    /// confirmation id; the pendency is tracked by NSU (or by intent only).
    DegradedIdentifier,
    /// Automatic confirmation failed; the pendency is still held.
    AutoConfirmationFailed,
    /// A stranded pendency could not be undone after a denial.
    StrandedUndoFailed,
}

/// Result of an authorization or a cancellation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationOutcome {
    pub order_id: String,
    pub amount_minor_units: i64,
    pub method: PaymentMethod,
    pub status: OutcomeStatus,
    /// Terminal-assigned settlement reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_brand: Option<String>,
    /// Processor response code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,
    /// Literal reason text from the processor or the terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Two-phase capture: confirm or undo must follow
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<String>,
    #[serde(default)]
    pub customer_receipt: String,
    #[serde(default)]
    pub merchant_receipt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<OutcomeWarning>,
    /// Automatic confirmation that settled this approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationDecision>,
    /// Stranded pendency undone after this denial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stranded_undo: Option<ConfirmationDecision>,
    /// Unix millis
    pub completed_at: i64,
}

impl AuthorizationOutcome {
    /// Outcome for a terminal that never answered
    pub fn transport_error(
        order_id: impl Into<String>,
        amount_minor_units: i64,
        method: PaymentMethod,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            amount_minor_units,
            method,
            status: OutcomeStatus::TransportError,
            nsu: None,
            authorization_code: None,
            card_brand: None,
            response_code: None,
            reason: Some(reason.into()),
            requires_confirmation: false,
            confirmation_id: None,
            customer_receipt: String::new(),
            merchant_receipt: String::new(),
            warnings: Vec::new(),
            confirmation: None,
            stranded_undo: None,
            completed_at: now_millis(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == OutcomeStatus::Approved
    }

    /// Approved under two-phase capture: confirm or undo must follow
    pub fn needs_confirmation(&self) -> bool {
        self.is_approved() && self.requires_confirmation
    }

    /// Two-phase approval whose confirmation has not gone through yet
    pub fn awaiting_confirmation(&self) -> bool {
        self.needs_confirmation() && self.confirmation.is_none()
    }

    pub fn add_warning(&mut self, warning: OutcomeWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// One-line operator-facing text
    ///
    /// Certification runs compare the reason text literally, so it is
    /// reproduced as received.
    pub fn summary(&self) -> String {
        let status = match self.status {
            OutcomeStatus::Approved => "APPROVED",
            OutcomeStatus::Denied => "DENIED",
            OutcomeStatus::CancelledByUser => "CANCELLED",
            OutcomeStatus::TransportError => "NO RESPONSE",
        };
        let mut text = format!(
            "{} {} {} order={}",
            status,
            self.method,
            format_minor_units(self.amount_minor_units),
            self.order_id
        );
        if let Some(nsu) = &self.nsu {
            text.push_str(&format!(" nsu={}", nsu));
        }
        if let Some(code) = &self.authorization_code {
            text.push_str(&format!(" auth={}", code));
        }
        if let Some(reason) = &self.reason {
            text.push_str(&format!(" reason=\"{}\"", reason));
        }
        text
    }
}

// ============================================================================
// Confirmation Types
// ============================================================================

/// Identity under which a pendency is confirmed or undone
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConfirmationIdentity {
    /// Token supplied by the terminal (normal contract)
    ConfirmationId(String),
    /// NSU fallback when the terminal omitted the confirmation id
    Nsu(String),
    /// Neither was captured: resolve by intent only
    Unknown,
}

impl ConfirmationIdentity {
    /// Pick the identity for an approval: confirmation id, then NSU
    pub fn resolve(confirmation_id: Option<&str>, nsu: Option<&str>) -> Self {
        fn non_empty(s: Option<&str>) -> Option<&str> {
            s.map(str::trim).filter(|s| !s.is_empty())
        }
        match (non_empty(confirmation_id), non_empty(nsu)) {
            (Some(id), _) => Self::ConfirmationId(id.to_string()),
            (None, Some(nsu)) => Self::Nsu(nsu.to_string()),
            (None, None) => Self::Unknown,
        }
    }

    /// Value to hand back to the terminal, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::ConfirmationId(id) | Self::Nsu(id) => Some(id),
            Self::Unknown => None,
        }
    }

    /// Anything other than a real confirmation id
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Self::ConfirmationId(_))
    }
}

impl std::fmt::Display for ConfirmationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfirmationId(id) => write!(f, "{}", id),
            Self::Nsu(nsu) => write!(f, "nsu:{}", nsu),
            Self::Unknown => f.write_str("<unknown>"),
        }
    }
}

/// An approved transaction whose capture is not finalized yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub identity: ConfirmationIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsu: Option<String>,
    /// Known only when the pendency was created in this process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_minor_units: Option<i64>,
    /// Rebuilt from the terminal after a restart
    #[serde(default)]
    pub recovered: bool,
    /// Unix millis
    pub created_at: i64,
}

impl PendingConfirmation {
    pub fn from_outcome(outcome: &AuthorizationOutcome) -> Self {
        Self {
            identity: ConfirmationIdentity::resolve(
                outcome.confirmation_id.as_deref(),
                outcome.nsu.as_deref(),
            ),
            nsu: outcome.nsu.clone(),
            order_id: Some(outcome.order_id.clone()),
            amount_minor_units: Some(outcome.amount_minor_units),
            recovered: false,
            created_at: now_millis(),
        }
    }

    pub fn from_probe(probe: &PendencyProbe) -> Self {
        Self {
            identity: ConfirmationIdentity::resolve(
                probe.confirmation_id.as_deref(),
                probe.fallback_nsu.as_deref(),
            ),
            nsu: probe.fallback_nsu.clone(),
            order_id: None,
            amount_minor_units: None,
            recovered: true,
            created_at: now_millis(),
        }
    }

    /// The confirmation id proper, when the terminal supplied one
    pub fn confirmation_id(&self) -> Option<&str> {
        match &self.identity {
            ConfirmationIdentity::ConfirmationId(id) => Some(id),
            _ => None,
        }
    }

    /// Identifier shown to the operator and carried in errors
    pub fn display_id(&self) -> String {
        self.identity.to_string()
    }
}

/// How a pendency is closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    ConfirmedAutomatic,
    ConfirmedManual,
    UndoneManual,
}

impl Resolution {
    pub fn is_confirmation(&self) -> bool {
        matches!(self, Self::ConfirmedAutomatic | Self::ConfirmedManual)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ConfirmedAutomatic => "confirmed_automatic",
            Self::ConfirmedManual => "confirmed_manual",
            Self::UndoneManual => "undone_manual",
        };
        f.write_str(name)
    }
}

/// Decision sent to the terminal for one pendency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmationDecision {
    pub identity: ConfirmationIdentity,
    pub resolution: Resolution,
    /// Order of the resolved pendency, when it was created in this process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Unix millis
    pub decided_at: i64,
}

/// Terminal answer to "is a pendency open right now?"
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendencyProbe {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_nsu: Option<String>,
}

impl PendencyProbe {
    pub fn none() -> Self {
        Self::default()
    }
}

// ============================================================================
// Cancellation / Reprint Types
// ============================================================================

/// Reversal of a previously approved and settled transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancellationRequest {
    pub order_id: String,
    pub nsu: String,
    pub authorization_code: String,
    pub amount_minor_units: i64,
    pub method: PaymentMethod,
}

impl CancellationRequest {
    /// Build a reversal for an approved outcome that carries an NSU
    pub fn for_outcome(outcome: &AuthorizationOutcome) -> Option<Self> {
        if !outcome.is_approved() {
            return None;
        }
        let nsu = outcome.nsu.clone()?;
        Some(Self {
            order_id: outcome.order_id.clone(),
            nsu,
            authorization_code: outcome.authorization_code.clone().unwrap_or_default(),
            amount_minor_units: outcome.amount_minor_units,
            method: outcome.method,
        })
    }
}

/// Printable receipts of one transaction
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiptPair {
    pub customer_receipt: String,
    pub merchant_receipt: String,
}

/// Result of a reprint request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReprintResult {
    Receipts(ReceiptPair),
    /// Terminal has no last-transaction record
    NothingToReprint,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approved(confirmation_id: Option<&str>, nsu: Option<&str>) -> AuthorizationOutcome {
        AuthorizationOutcome {
            order_id: "order-1".to_string(),
            amount_minor_units: 500000,
            method: PaymentMethod::Credit,
            status: OutcomeStatus::Approved,
            nsu: nsu.map(str::to_string),
            authorization_code: Some("A1B2".to_string()),
            card_brand: Some("VISA".to_string()),
            response_code: Some("00".to_string()),
            reason: None,
            requires_confirmation: true,
            confirmation_id: confirmation_id.map(str::to_string),
            customer_receipt: String::new(),
            merchant_receipt: String::new(),
            warnings: Vec::new(),
            confirmation: None,
            stranded_undo: None,
            completed_at: 0,
        }
    }

    #[test]
    fn test_request_validation() {
        let req = AuthorizationRequest::new("order-1", 500000, PaymentMethod::Credit);
        assert!(req.validate().is_ok());

        let req = AuthorizationRequest::new(" ", 100, PaymentMethod::Debit);
        assert_eq!(req.validate(), Err(RequestError::EmptyOrderId));

        let req = AuthorizationRequest::new("o", 0, PaymentMethod::Debit);
        assert_eq!(req.validate(), Err(RequestError::NonPositiveAmount(0)));

        let req = AuthorizationRequest::new("o", 100, PaymentMethod::Pix)
            .with_financing(Financing::IssuerInstallments, 3);
        assert_eq!(
            req.validate(),
            Err(RequestError::FinancingNotAllowed(PaymentMethod::Pix))
        );

        let req = AuthorizationRequest::new("o", 100, PaymentMethod::Credit)
            .with_financing(Financing::SinglePayment, 3);
        assert_eq!(
            req.validate(),
            Err(RequestError::InstallmentsWithoutFinancing { count: 3 })
        );

        let req = AuthorizationRequest::new("o", 100, PaymentMethod::Credit)
            .with_financing(Financing::MerchantInstallments, 3)
            .with_authorizer("DEMO");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let json = r#"{"order_id":"o-9","amount_minor_units":1500,"method":"debit"}"#;
        let req: AuthorizationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.financing, Financing::SinglePayment);
        assert_eq!(req.installment_count, 1);
        assert!(req.authorizer_hint.is_none());
    }

    #[test]
    fn test_identity_prefers_confirmation_id() {
        let id = ConfirmationIdentity::resolve(Some("X1"), Some("000123"));
        assert_eq!(id, ConfirmationIdentity::ConfirmationId("X1".to_string()));
        assert!(!id.is_degraded());
        assert_eq!(id.key(), Some("X1"));
    }

    #[test]
    fn test_identity_falls_back_to_nsu() {
        let id = ConfirmationIdentity::resolve(Some(""), Some("000123"));
        assert_eq!(id, ConfirmationIdentity::Nsu("000123".to_string()));
        assert!(id.is_degraded());
        assert_eq!(id.key(), Some("000123"));

        let id = ConfirmationIdentity::resolve(None, None);
        assert_eq!(id, ConfirmationIdentity::Unknown);
        assert_eq!(id.key(), None);
    }

    #[test]
    fn test_identity_trims_blank_values() {
        let id = ConfirmationIdentity::resolve(Some("   "), Some(" 000123 "));
        assert_eq!(id, ConfirmationIdentity::Nsu("000123".to_string()));

        let id = ConfirmationIdentity::resolve(Some(" X1 "), None);
        assert_eq!(id.key(), Some("X1"));

        assert_eq!(
            ConfirmationIdentity::resolve(Some("\t"), Some("")),
            ConfirmationIdentity::Unknown
        );
    }

    #[test]
    fn test_pending_from_outcome() {
        let pending = PendingConfirmation::from_outcome(&approved(None, Some("777")));
        assert_eq!(pending.identity, ConfirmationIdentity::Nsu("777".to_string()));
        assert_eq!(pending.confirmation_id(), None);
        assert_eq!(pending.order_id.as_deref(), Some("order-1"));
        assert!(!pending.recovered);
    }

    #[test]
    fn test_pending_from_probe() {
        let probe = PendencyProbe {
            exists: true,
            confirmation_id: Some("R9".to_string()),
            fallback_nsu: Some("42".to_string()),
        };
        let pending = PendingConfirmation::from_probe(&probe);
        assert_eq!(pending.confirmation_id(), Some("R9"));
        assert!(pending.recovered);
        assert!(pending.order_id.is_none());
    }

    #[test]
    fn test_outcome_summary_keeps_reason_literal() {
        let mut outcome = approved(Some("X1"), Some("000123"));
        outcome.status = OutcomeStatus::Denied;
        outcome.reason = Some("TRANSACAO NEGADA PELO EMISSOR".to_string());
        let summary = outcome.summary();
        assert!(summary.starts_with("DENIED credit 5000.00 order=order-1"));
        assert!(summary.contains("nsu=000123"));
        assert!(summary.contains("auth=A1B2"));
        assert!(summary.contains("reason=\"TRANSACAO NEGADA PELO EMISSOR\""));
    }

    #[test]
    fn test_cancellation_request_for_outcome() {
        let outcome = approved(Some("X1"), Some("000123"));
        let req = CancellationRequest::for_outcome(&outcome).unwrap();
        assert_eq!(req.nsu, "000123");
        assert_eq!(req.authorization_code, "A1B2");
        assert_eq!(req.amount_minor_units, 500000);

        let mut denied = outcome.clone();
        denied.status = OutcomeStatus::Denied;
        assert!(CancellationRequest::for_outcome(&denied).is_none());

        let no_nsu = approved(Some("X1"), None);
        assert!(CancellationRequest::for_outcome(&no_nsu).is_none());
    }

    #[test]
    fn test_warning_is_not_duplicated() {
        let mut outcome = approved(None, Some("1"));
        outcome.add_warning(OutcomeWarning::DegradedIdentifier);
        outcome.add_warning(OutcomeWarning::DegradedIdentifier);
        assert_eq!(outcome.warnings, vec![OutcomeWarning::DegradedIdentifier]);
    }

    #[test]
    fn test_reprint_result_serialize() {
        let json = serde_json::to_string(&ReprintResult::NothingToReprint).unwrap();
        assert_eq!(json, r#"{"kind":"nothing_to_reprint"}"#);
    }
}
