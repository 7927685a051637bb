//! POS Terminal Server - 支付终端交易协调服务
//!
//! # 架构概述
//!
//! 本 crate 把 `pinpad` 的终端协调器挂到 HTTP 上，供收银 / 认证测试界面调用：
//!
//! - **终端服务** (`pinpad::TerminalService`): 授权、确认 / 撤销、冲正、重打
//! - **操作日志** (`oplog`): 按天分文件的 JSONL，SHA256 哈希链
//! - **交易历史** (`history`): 已批准交易，冲正按订单号查找
//! - **HTTP API** (`api`): RESTful 接口
//!
//! # 模块结构
//!
//! ```text
//! pos-server/src/
//! ├── core/          # 配置、状态、错误、服务器
//! ├── common/        # 日志
//! ├── oplog/         # 操作日志
//! ├── history.rs     # 已批准交易
//! └── api/           # HTTP 路由和处理器
//! ```

pub mod api;
pub mod common;
pub mod core;
pub mod history;
pub mod oplog;

// Re-export 公共类型
pub use crate::core::{Config, Server, ServerError, ServerState, build_app};
pub use crate::core::server::build_service;
pub use history::{HistoryEntry, HistoryStatus, TransactionHistory};
pub use oplog::{OpLogEntry, OpLogService};

// Re-export logger functions
pub use common::{cleanup_old_logs, init_logger, init_logger_with_file};

/// 审计日志宏 - 写入 `audit` target (独立的永久日志文件)
///
/// ```ignore
/// audit_log!("cancellation", order_id = "o-1", nsu = "000123");
/// ```
#[macro_export]
macro_rules! audit_log {
    ($event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(
            target: "audit",
            event = %$event,
            $($key = ?$value,)*
            "AUDIT"
        );
    };
}

/// 设置运行环境: 工作目录 + 日志
///
/// 必须在 tokio runtime 内调用 (日志清理任务)
pub fn setup_environment(config: &Config) -> anyhow::Result<()> {
    config.ensure_work_dir_structure()?;

    let log_dir = config.log_dir();
    // 生产环境总是输出 JSON
    init_logger_with_file(
        &config.log_level,
        config.log_json || config.is_production(),
        Some(log_dir.as_path()),
        config.oplog_retention_days,
    )?;

    Ok(())
}
