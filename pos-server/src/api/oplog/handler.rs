//! Operation Log API Handlers

use axum::extract::{Path, State};
use chrono::NaiveDate;

use crate::core::ServerState;
use crate::oplog::{ChainVerification, OpLogEntry};
use shared::error::{ApiResponse, AppError, AppResult};

fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

/// GET /api/oplog/{date} - 导出某天的操作日志
pub async fn export(
    State(state): State<ServerState>,
    Path(date): Path<String>,
) -> AppResult<ApiResponse<Vec<OpLogEntry>>> {
    let date = parse_date(&date)?;
    let entries = state.oplog.export(date)?;
    Ok(ApiResponse::success(entries))
}

/// GET /api/oplog/{date}/verify - 验证某天的哈希链
pub async fn verify_chain(
    State(state): State<ServerState>,
    Path(date): Path<String>,
) -> AppResult<ApiResponse<ChainVerification>> {
    let date = parse_date(&date)?;
    let verification = state.oplog.verify(date)?;
    if !verification.chain_intact {
        tracing::warn!(
            date = %verification.date,
            breaks = verification.breaks.len(),
            "Operation log chain is broken"
        );
    }
    Ok(ApiResponse::success(verification))
}
