//! Terminal API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/terminal/authorize | POST | 发起授权 |
//! | /api/terminal/pendency | GET | 当前待确认 / 搁置的交易 |
//! | /api/terminal/pendency/resolve | POST | 确认或撤销 |
//! | /api/terminal/pendency/leave | POST | 搁置待确认交易 |
//! | /api/terminal/pendency/recover | POST | 向终端查询遗留的待确认交易 |
//! | /api/terminal/cancel | POST | 按订单号冲正 |
//! | /api/terminal/receipts/last | GET | 重打最后一笔凭条 |
//! | /api/terminal/status | GET | 终端状态 |
//! | /api/terminal/history | GET | 已批准交易 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub use handler::{AuthorizeBody, AuthorizeResponse, CancelBody, PendencyView, ResolveBody, StatusResponse};

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/terminal", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/authorize", post(handler::authorize))
        .route("/pendency", get(handler::pendency))
        .route("/pendency/resolve", post(handler::resolve))
        .route("/pendency/leave", post(handler::leave))
        .route("/pendency/recover", post(handler::recover))
        .route("/cancel", post(handler::cancel))
        .route("/receipts/last", get(handler::reprint_last))
        .route("/status", get(handler::status))
        .route("/history", get(handler::history))
}
