use std::sync::Arc;

use pinpad::{OperationSink, TerminalBridge, TerminalService};

use crate::core::{Config, Result, ServerError};
use crate::history::TransactionHistory;
use crate::oplog::{OpLogService, OpLogWorker};

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，作为 axum `State` 传给每个处理器。
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | terminal | TerminalService | 终端协调 (授权 / 确认 / 冲正 / 重打) |
/// | history | Arc<TransactionHistory> | 已批准交易 (冲正按订单号查找) |
/// | oplog | Arc<OpLogService> | 操作日志 (哈希链 JSONL) |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub terminal: TerminalService,
    pub history: Arc<TransactionHistory>,
    pub oplog: Arc<OpLogService>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录结构
    /// 2. 操作日志服务 + 后台 worker
    /// 3. 终端服务 (操作日志作为记录接收端)
    ///
    /// 必须在 tokio runtime 内调用。
    pub fn initialize(config: &Config, bridge: Arc<dyn TerminalBridge>) -> Result<Self> {
        config
            .ensure_work_dir_structure()
            .map_err(ServerError::WorkDir)?;

        let (oplog, rx) = OpLogService::new(config.oplog_dir(), config.oplog_buffer_size)
            .map_err(|e| ServerError::Internal(e.into()))?;
        tokio::spawn(OpLogWorker::new(oplog.storage()).run(rx));

        let sink: Arc<dyn OperationSink> = oplog.clone();
        let terminal = TerminalService::new(bridge, config.terminal_config(), sink);

        Ok(Self {
            config: config.clone(),
            terminal,
            history: Arc::new(TransactionHistory::new()),
            oplog,
        })
    }

    /// 启动后台任务
    ///
    /// - 操作日志保留期清理 (每小时)
    pub fn start_background_tasks(&self) {
        let oplog = self.oplog.clone();
        let retention_days = self.config.oplog_retention_days;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match oplog.cleanup(retention_days) {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Expired operation logs removed"),
                    Err(e) => tracing::error!(error = %e, "Operation log cleanup failed"),
                }
            }
        });
    }
}
