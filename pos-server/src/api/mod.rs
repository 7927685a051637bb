//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`terminal`] - 终端交易接口 (授权 / 确认 / 冲正 / 重打)
//! - [`oplog`] - 操作日志导出和链验证

pub mod health;
pub mod oplog;
pub mod terminal;

pub use shared::error::{ApiResponse, AppError, AppResult};
