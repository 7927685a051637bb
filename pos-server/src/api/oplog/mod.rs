//! Operation Log API 模块 (导出、链验证)

mod handler;

use axum::{Router, routing::get};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/oplog", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{date}", get(handler::export))
        .route("/{date}/verify", get(handler::verify_chain))
}
