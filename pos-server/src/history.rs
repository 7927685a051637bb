//! 已批准交易历史
//!
//! 冲正 (cancel) 按订单号发起，需要原交易的 NSU 和授权码，
//! 这里保存每笔批准的授权结果。进程内存储，重启后清空。

use dashmap::DashMap;
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::payment::{AuthorizationOutcome, CancellationRequest};

/// 历史条目状态
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    /// 两阶段交易，等待确认 / 撤销
    AwaitingConfirmation,
    /// 已结算
    Settled,
    /// 已冲正
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub outcome: AuthorizationOutcome,
    pub status: HistoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_nsu: Option<String>,
}

#[derive(Debug, Default)]
pub struct TransactionHistory {
    entries: DashMap<String, HistoryEntry>,
}

impl TransactionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录批准的授权 (非批准结果忽略)
    pub fn record_approved(&self, outcome: &AuthorizationOutcome, awaiting_confirmation: bool) {
        if !outcome.is_approved() {
            return;
        }
        let status = if awaiting_confirmation {
            HistoryStatus::AwaitingConfirmation
        } else {
            HistoryStatus::Settled
        };
        self.entries.insert(
            outcome.order_id.clone(),
            HistoryEntry {
                outcome: outcome.clone(),
                status,
                cancelled_at: None,
                cancellation_nsu: None,
            },
        );
    }

    pub fn get(&self, order_id: &str) -> Option<HistoryEntry> {
        self.entries.get(order_id).map(|e| e.clone())
    }

    /// 确认完成
    pub fn mark_settled(&self, order_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(order_id)
            && entry.status == HistoryStatus::AwaitingConfirmation
        {
            entry.status = HistoryStatus::Settled;
        }
    }

    /// 终端确认撤销后调用
    ///
    /// 待确认的批准被删除 (不再可冲正)；冲正被撤销时原交易恢复为已结算。
    pub fn mark_undone(&self, order_id: &str) {
        if self
            .entries
            .remove_if(order_id, |_, e| e.status == HistoryStatus::AwaitingConfirmation)
            .is_some()
        {
            return;
        }
        if let Some(mut entry) = self.entries.get_mut(order_id)
            && entry.status == HistoryStatus::Cancelled
        {
            entry.status = HistoryStatus::Settled;
            entry.cancelled_at = None;
            entry.cancellation_nsu = None;
        }
    }

    pub fn mark_cancelled(&self, order_id: &str, cancellation: &AuthorizationOutcome) {
        if let Some(mut entry) = self.entries.get_mut(order_id) {
            entry.status = HistoryStatus::Cancelled;
            entry.cancelled_at = Some(cancellation.completed_at);
            entry.cancellation_nsu = cancellation.nsu.clone();
        }
    }

    /// 按完成时间倒序
    pub fn list(&self) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| b.outcome.completed_at.cmp(&a.outcome.completed_at));
        entries
    }

    /// 为订单构造冲正请求
    pub fn cancellation_request(&self, order_id: &str) -> Result<CancellationRequest, AppError> {
        let entry = self.get(order_id).ok_or_else(|| {
            AppError::with_message(
                ErrorCode::PaymentNotFound,
                format!("No approved payment for order {}", order_id),
            )
            .with_detail("order_id", order_id)
        })?;

        if entry.status == HistoryStatus::Cancelled {
            return Err(AppError::with_message(
                ErrorCode::PaymentAlreadyRefunded,
                format!("Payment for order {} is already cancelled", order_id),
            )
            .with_detail("order_id", order_id));
        }

        CancellationRequest::for_outcome(&entry.outcome).ok_or_else(|| {
            AppError::validation(format!("Payment for order {} has no NSU", order_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::payment::{OutcomeStatus, PaymentMethod};

    fn approved(order_id: &str, completed_at: i64) -> AuthorizationOutcome {
        let mut outcome =
            AuthorizationOutcome::transport_error(order_id, 4990, PaymentMethod::Pix, "");
        outcome.status = OutcomeStatus::Approved;
        outcome.reason = None;
        outcome.nsu = Some("000123".into());
        outcome.authorization_code = Some("A1B2".into());
        outcome.completed_at = completed_at;
        outcome
    }

    #[test]
    fn test_only_approved_outcomes_are_kept() {
        let history = TransactionHistory::new();
        let mut denied = approved("o1", 1);
        denied.status = OutcomeStatus::Denied;
        history.record_approved(&denied, false);
        assert!(history.get("o1").is_none());

        history.record_approved(&approved("o2", 2), true);
        assert_eq!(
            history.get("o2").unwrap().status,
            HistoryStatus::AwaitingConfirmation
        );
        history.mark_settled("o2");
        assert_eq!(history.get("o2").unwrap().status, HistoryStatus::Settled);
    }

    #[test]
    fn test_cancellation_request_lookup() {
        let history = TransactionHistory::new();
        let err = history.cancellation_request("missing").unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentNotFound);

        history.record_approved(&approved("o1", 1), false);
        let request = history.cancellation_request("o1").unwrap();
        assert_eq!(request.nsu, "000123");
        assert_eq!(request.authorization_code, "A1B2");
        assert_eq!(request.amount_minor_units, 4990);

        let mut reversal = approved("o1", 2);
        reversal.nsu = Some("000124".into());
        history.mark_cancelled("o1", &reversal);
        let err = history.cancellation_request("o1").unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentAlreadyRefunded);
        assert_eq!(
            history.get("o1").unwrap().cancellation_nsu.as_deref(),
            Some("000124")
        );
    }

    #[test]
    fn test_list_newest_first() {
        let history = TransactionHistory::new();
        history.record_approved(&approved("old", 10), false);
        history.record_approved(&approved("new", 20), false);

        let orders: Vec<String> = history
            .list()
            .into_iter()
            .map(|e| e.outcome.order_id)
            .collect();
        assert_eq!(orders, vec!["new", "old"]);
    }

    #[test]
    fn test_undo_depends_on_status() {
        let history = TransactionHistory::new();
        history.record_approved(&approved("pending", 1), true);
        history.record_approved(&approved("settled", 2), false);
        history.record_approved(&approved("reversed", 3), false);
        history.mark_cancelled("reversed", &approved("reversed", 4));

        history.mark_undone("pending");
        assert!(history.get("pending").is_none());

        history.mark_undone("settled");
        assert_eq!(history.get("settled").unwrap().status, HistoryStatus::Settled);

        // undoing the reversal's pendency restores the sale
        history.mark_undone("reversed");
        let entry = history.get("reversed").unwrap();
        assert_eq!(entry.status, HistoryStatus::Settled);
        assert!(entry.cancelled_at.is_none());
        assert!(history.cancellation_request("reversed").is_ok());

        history.mark_undone("missing");
        assert_eq!(history.list().len(), 2);
    }
}
