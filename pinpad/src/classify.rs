//! Classification of raw terminal replies
//!
//! Denials are logged as processor-level rejections; user cancellations are
//! not. Driver error texts that speak of an operator abort are therefore
//! reported as user cancellations. A transaction record the host declined
//! stays a denial whatever its text says (`CARTAO CANCELADO` is a decline).

use shared::payment::{
    AuthorizationOutcome, AuthorizationRequest, CancellationRequest, OutcomeStatus, PaymentMethod,
};
use shared::util::now_millis;

use crate::bridge::{TerminalReply, TransactionData};

/// Fragments of operator-abort texts (matched case-insensitively)
const CANCELLATION_VOCABULARY: &[&str] = &[
    "operacao cancelada",
    "cancelada pelo usuario",
    "cancelada pelo operador",
    "cancelado pelo usuario",
    "cancelado pelo operador",
    "cancelled by user",
    "canceled by user",
    "cancelled by operator",
    "abort",
    "escape",
    "tecla esc",
    "no acquirer",
    "nenhum adquirente",
    "adquirente nao selecionado",
    "operacao interrompida",
];

/// Whether a terminal message describes an operator / device abort
pub fn is_cancellation_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    CANCELLATION_VOCABULARY
        .iter()
        .any(|fragment| lower.contains(fragment))
}

/// Classify the reply to an authorization
pub fn classify_authorization(
    request: &AuthorizationRequest,
    reply: TerminalReply,
) -> AuthorizationOutcome {
    let aborted = matches!(
        &reply,
        TerminalReply::Failed { message, .. } if is_cancellation_message(message)
    );
    let mut outcome = base_outcome(
        &request.order_id,
        request.amount_minor_units,
        request.method,
        reply,
    );
    if aborted {
        outcome.status = OutcomeStatus::CancelledByUser;
    }
    outcome
}

/// Classify the reply to a cancellation
///
/// A reversal either went through or it did not: the result is approved or
/// denied, never a user cancellation.
pub fn classify_cancellation(
    request: &CancellationRequest,
    reply: TerminalReply,
) -> AuthorizationOutcome {
    let mut outcome = base_outcome(
        &request.order_id,
        request.amount_minor_units,
        request.method,
        reply,
    );
    if outcome.nsu.is_none() {
        outcome.nsu = Some(request.nsu.clone());
    }
    outcome
}

fn base_outcome(
    order_id: &str,
    amount_minor_units: i64,
    method: PaymentMethod,
    reply: TerminalReply,
) -> AuthorizationOutcome {
    match reply {
        TerminalReply::Completed(data) => from_data(order_id, amount_minor_units, method, data),
        TerminalReply::Failed { code, message } => AuthorizationOutcome {
            order_id: order_id.to_string(),
            amount_minor_units,
            method,
            status: OutcomeStatus::Denied,
            nsu: None,
            authorization_code: None,
            card_brand: None,
            response_code: code,
            reason: Some(message),
            requires_confirmation: false,
            confirmation_id: None,
            customer_receipt: String::new(),
            merchant_receipt: String::new(),
            warnings: Vec::new(),
            confirmation: None,
            stranded_undo: None,
            completed_at: now_millis(),
        },
    }
}

fn from_data(
    order_id: &str,
    amount_minor_units: i64,
    method: PaymentMethod,
    data: TransactionData,
) -> AuthorizationOutcome {
    let status = if data.approved {
        OutcomeStatus::Approved
    } else {
        OutcomeStatus::Denied
    };
    AuthorizationOutcome {
        order_id: order_id.to_string(),
        amount_minor_units,
        method,
        status,
        nsu: data.nsu,
        authorization_code: data.authorization_code,
        card_brand: data.card_brand,
        response_code: data.response_code,
        reason: data.message,
        // Only an approval can be waiting for capture
        requires_confirmation: data.approved && data.requires_confirmation,
        confirmation_id: data.confirmation_id.filter(|id| !id.trim().is_empty()),
        customer_receipt: data.customer_receipt,
        merchant_receipt: data.merchant_receipt,
        warnings: Vec::new(),
        confirmation: None,
        stranded_undo: None,
        completed_at: now_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::new("order-1", 100561, PaymentMethod::Credit)
    }

    fn failed(message: &str) -> TerminalReply {
        TerminalReply::Failed {
            code: None,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_cancellation_vocabulary() {
        assert!(is_cancellation_message("OPERACAO CANCELADA PELO OPERADOR"));
        assert!(is_cancellation_message("Transaction aborted"));
        assert!(is_cancellation_message("NENHUM ADQUIRENTE SELECIONADO"));
        assert!(is_cancellation_message("user pressed ESCAPE"));
        assert!(!is_cancellation_message("TRANSACAO NEGADA"));
        assert!(!is_cancellation_message("SALDO INSUFICIENTE"));
        assert!(!is_cancellation_message("CARTAO CANCELADO"));
        assert!(!is_cancellation_message("CANCELAMENTO NAO PERMITIDO PARA PIX"));
    }

    #[test]
    fn test_failed_reply_is_denied_with_literal_reason() {
        let outcome = classify_authorization(&request(), failed("SALDO INSUFICIENTE"));
        assert_eq!(outcome.status, OutcomeStatus::Denied);
        assert_eq!(outcome.reason.as_deref(), Some("SALDO INSUFICIENTE"));
        assert!(!outcome.requires_confirmation);
    }

    #[test]
    fn test_abort_reply_is_cancelled_by_user() {
        let outcome = classify_authorization(&request(), failed("OPERACAO CANCELADA"));
        assert_eq!(outcome.status, OutcomeStatus::CancelledByUser);
        assert_eq!(outcome.reason.as_deref(), Some("OPERACAO CANCELADA"));
    }

    #[test]
    fn test_host_decline_mentioning_cancel_stays_denied() {
        let data = TransactionData {
            approved: false,
            response_code: Some("14".to_string()),
            message: Some("CARTAO CANCELADO".to_string()),
            ..Default::default()
        };
        let outcome = classify_authorization(&request(), TerminalReply::Completed(data));
        assert_eq!(outcome.status, OutcomeStatus::Denied);
        assert_eq!(outcome.response_code.as_deref(), Some("14"));

        // only driver failures are read for abort texts
        let data = TransactionData {
            approved: false,
            message: Some("OPERACAO CANCELADA".to_string()),
            ..Default::default()
        };
        let outcome = classify_authorization(&request(), TerminalReply::Completed(data));
        assert_eq!(outcome.status, OutcomeStatus::Denied);

        let outcome = classify_authorization(&request(), failed("CARTAO CANCELADO"));
        assert_eq!(outcome.status, OutcomeStatus::Denied);
    }

    #[test]
    fn test_approved_record() {
        let data = TransactionData {
            approved: true,
            nsu: Some("000123".to_string()),
            authorization_code: Some("A1".to_string()),
            requires_confirmation: true,
            confirmation_id: Some("  ".to_string()),
            ..Default::default()
        };
        let outcome = classify_authorization(&request(), TerminalReply::Completed(data));
        assert_eq!(outcome.status, OutcomeStatus::Approved);
        assert!(outcome.requires_confirmation);
        // blank ids count as absent
        assert!(outcome.confirmation_id.is_none());
        assert_eq!(outcome.amount_minor_units, 100561);
    }

    #[test]
    fn test_denied_record_never_requires_confirmation() {
        let data = TransactionData {
            approved: false,
            requires_confirmation: true,
            message: Some("NEGADA".to_string()),
            ..Default::default()
        };
        let outcome = classify_authorization(&request(), TerminalReply::Completed(data));
        assert_eq!(outcome.status, OutcomeStatus::Denied);
        assert!(!outcome.requires_confirmation);
    }

    #[test]
    fn test_cancellation_abort_text_stays_denied() {
        let cancel = CancellationRequest {
            order_id: "order-1".to_string(),
            nsu: "000123".to_string(),
            authorization_code: "A1".to_string(),
            amount_minor_units: 100,
            method: PaymentMethod::Pix,
        };
        let outcome = classify_cancellation(&cancel, failed("CANCELAMENTO NAO PERMITIDO"));
        assert_eq!(outcome.status, OutcomeStatus::Denied);
        assert_eq!(outcome.nsu.as_deref(), Some("000123"));
    }
}
