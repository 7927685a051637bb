use std::path::PathBuf;

use pinpad::{ConfirmationPolicy, Deadlines, TerminalConfig};

/// 服务器配置 - POS 终端服务的所有配置项
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/pos/terminal | 工作目录 (日志、操作日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 (RUST_LOG 优先) |
/// | LOG_JSON | false | JSON 日志格式 |
/// | TERMINAL_AUTHORIZE_TIMEOUT_MS | 120000 | 授权等待上限 |
/// | TERMINAL_OPERATION_TIMEOUT_MS | 30000 | 确认/撤销、查询、重打等待上限 |
/// | TERMINAL_CONFIRMATION_POLICY | manual | manual \| automatic |
/// | TERMINAL_SIMULATOR_TWO_PHASE | true | 模拟终端是否两阶段确认 |
/// | OPLOG_RETENTION_DAYS | 90 | 操作日志保留天数 |
/// | OPLOG_BUFFER_SIZE | 1024 | 操作日志通道容量 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/tmp/pos HTTP_PORT=8080 TERMINAL_CONFIRMATION_POLICY=automatic cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    /// 授权 (插卡 / PIX 扫码) 等待上限 (毫秒)
    pub authorize_timeout_ms: u64,
    /// 其它终端操作等待上限 (毫秒)
    pub operation_timeout_ms: u64,
    pub confirmation_policy: ConfirmationPolicy,
    pub simulator_two_phase: bool,
    /// 操作日志保留天数
    pub oplog_retention_days: u32,
    /// 操作日志 mpsc 通道容量
    pub oplog_buffer_size: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/pos/terminal".into()),
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            authorize_timeout_ms: env_or("TERMINAL_AUTHORIZE_TIMEOUT_MS", 120_000),
            operation_timeout_ms: env_or("TERMINAL_OPERATION_TIMEOUT_MS", 30_000),
            confirmation_policy: env_or("TERMINAL_CONFIRMATION_POLICY", ConfirmationPolicy::Manual),
            simulator_two_phase: env_or("TERMINAL_SIMULATOR_TWO_PHASE", true),
            oplog_retention_days: env_or("OPLOG_RETENTION_DAYS", 90),
            oplog_buffer_size: env_or("OPLOG_BUFFER_SIZE", 1024),
        }
    }

    /// 使用自定义工作目录 (常用于测试)
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// 终端协调配置 (每个操作的截止时间 + 确认策略)
    pub fn terminal_config(&self) -> TerminalConfig {
        let mut deadlines = Deadlines::uniform(self.operation_timeout_ms);
        deadlines.authorize_ms = self.authorize_timeout_ms;
        // 冲正和授权一样需要刷卡
        deadlines.cancel_ms = self.authorize_timeout_ms;
        TerminalConfig::default()
            .with_deadlines(deadlines)
            .with_policy(self.confirmation_policy)
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn oplog_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("oplog")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.log_dir())?;
        std::fs::create_dir_all(self.oplog_dir())?;
        Ok(())
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
