//! Terminal API Handlers

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use pinpad::ConfirmationPolicy;
use shared::error::{ApiResponse, AppResult};
use shared::payment::{
    AuthorizationOutcome, AuthorizationRequest, ConfirmationDecision, Financing,
    PaymentMethod, PendingConfirmation, ReprintResult, Resolution,
};

use crate::audit_log;
use crate::core::ServerState;
use crate::history::HistoryEntry;

/// POST /api/terminal/authorize 请求体
///
/// `order_id` 省略时由服务器生成
#[derive(Debug, Deserialize)]
pub struct AuthorizeBody {
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount_minor_units: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub financing: Financing,
    #[serde(default = "default_installments")]
    pub installment_count: u32,
    #[serde(default)]
    pub authorizer_hint: Option<String>,
}

fn default_installments() -> u32 {
    1
}

impl AuthorizeBody {
    fn into_request(self) -> AuthorizationRequest {
        let order_id = self
            .order_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        AuthorizationRequest {
            order_id,
            amount_minor_units: self.amount_minor_units,
            method: self.method,
            financing: self.financing,
            installment_count: self.installment_count,
            authorizer_hint: self.authorizer_hint,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub outcome: AuthorizationOutcome,
    /// 操作员屏幕显示的一行文本
    pub summary: String,
    /// 授权后终端上的待确认交易 (手动策略下需要操作员处理)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingConfirmation>,
}

/// POST /api/terminal/authorize - 发起授权
///
/// 拒绝 / 用户取消 / 终端无响应都是正常返回，只看 `outcome.status`
pub async fn authorize(
    State(state): State<ServerState>,
    Json(body): Json<AuthorizeBody>,
) -> AppResult<ApiResponse<AuthorizeResponse>> {
    let request = body.into_request();

    let outcome = state.terminal.authorize(&request).await?;
    state
        .history
        .record_approved(&outcome, outcome.awaiting_confirmation());

    // 拒绝后搁置的交易被自动撤销
    if let Some(undone) = &outcome.stranded_undo {
        if let Some(order_id) = undone.order_id.as_deref() {
            state.history.mark_undone(order_id);
        }
        audit_log!(
            "stranded_undone",
            order_id = undone.order_id.as_deref(),
            confirmation = undone.identity.to_string()
        );
    }

    audit_log!(
        "authorization",
        order_id = outcome.order_id.as_str(),
        status = outcome.status,
        nsu = outcome.nsu.as_deref()
    );

    Ok(ApiResponse::success(AuthorizeResponse {
        summary: outcome.summary(),
        outcome,
        pending: state.terminal.pending(),
    }))
}

/// 待确认 (阻塞) + 搁置交易
#[derive(Debug, Serialize)]
pub struct PendencyView {
    pub pending: Option<PendingConfirmation>,
    pub stranded: Option<PendingConfirmation>,
}

/// GET /api/terminal/pendency
pub async fn pendency(State(state): State<ServerState>) -> ApiResponse<PendencyView> {
    ApiResponse::success(PendencyView {
        pending: state.terminal.pending(),
        stranded: state.terminal.stranded(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub resolution: Resolution,
}

/// POST /api/terminal/pendency/resolve - 确认或撤销
///
/// 作用于阻塞中的交易，没有时作用于搁置的交易
pub async fn resolve(
    State(state): State<ServerState>,
    Json(body): Json<ResolveBody>,
) -> AppResult<ApiResponse<ConfirmationDecision>> {
    let decision = state.terminal.resolve(body.resolution).await?;

    if let Some(order_id) = decision.order_id.as_deref() {
        if decision.resolution.is_confirmation() {
            state.history.mark_settled(order_id);
        } else {
            state.history.mark_undone(order_id);
        }
    }

    audit_log!(
        "pendency_resolved",
        order_id = decision.order_id.as_deref(),
        confirmation = decision.identity.to_string(),
        resolution = decision.resolution
    );

    Ok(ApiResponse::success(decision))
}

/// POST /api/terminal/pendency/leave - 搁置，允许下一笔授权
pub async fn leave(State(state): State<ServerState>) -> AppResult<ApiResponse<PendingConfirmation>> {
    let stranded = state.terminal.leave_pending()?;
    audit_log!("pendency_stranded", confirmation = stranded.display_id());
    Ok(ApiResponse::success(stranded))
}

/// POST /api/terminal/pendency/recover - 向终端查询遗留的待确认交易
pub async fn recover(
    State(state): State<ServerState>,
) -> AppResult<ApiResponse<Option<PendingConfirmation>>> {
    let recovered = state.terminal.recover_from_cold_start().await?;
    Ok(ApiResponse::success(recovered))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub outcome: AuthorizationOutcome,
    pub summary: String,
}

/// POST /api/terminal/cancel - 按订单号冲正
///
/// 主机拒绝冲正 (例如 PIX) 是正常返回，`outcome.status = denied`
pub async fn cancel(
    State(state): State<ServerState>,
    Json(body): Json<CancelBody>,
) -> AppResult<ApiResponse<CancelResponse>> {
    let request = state.history.cancellation_request(&body.order_id)?;
    let outcome = state.terminal.cancel(&request).await?;

    if outcome.is_approved() {
        state.history.mark_cancelled(&body.order_id, &outcome);
    }

    audit_log!(
        "cancellation",
        order_id = body.order_id.as_str(),
        status = outcome.status,
        nsu = request.nsu.as_str()
    );

    Ok(ApiResponse::success(CancelResponse {
        summary: outcome.summary(),
        outcome,
    }))
}

/// GET /api/terminal/receipts/last - 重打最后一笔凭条
pub async fn reprint_last(State(state): State<ServerState>) -> AppResult<ApiResponse<ReprintResult>> {
    let result = state.terminal.reprint_last().await?;
    Ok(ApiResponse::success(result))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub device_ready: bool,
    pub confirmation_policy: ConfirmationPolicy,
    /// 上一次授权无响应，下一次授权前会先探测终端
    pub suspect: bool,
    pub pending: Option<PendingConfirmation>,
    pub stranded: Option<PendingConfirmation>,
}

/// GET /api/terminal/status
pub async fn status(State(state): State<ServerState>) -> ApiResponse<StatusResponse> {
    ApiResponse::success(StatusResponse {
        device_ready: state.terminal.is_device_ready().await,
        confirmation_policy: state.terminal.coordinator().policy(),
        suspect: state.terminal.coordinator().is_suspect(),
        pending: state.terminal.pending(),
        stranded: state.terminal.stranded(),
    })
}

/// GET /api/terminal/history - 已批准交易 (新的在前)
pub async fn history(State(state): State<ServerState>) -> ApiResponse<Vec<HistoryEntry>> {
    ApiResponse::success(state.history.list())
}
