//! 操作日志模块 - 终端决策的防篡改记录
//!
//! # 架构
//!
//! ```text
//! 协调器决策点
//!   └─ OpLogService (OperationSink) → mpsc → OpLogWorker → oplog-YYYY-MM-DD.jsonl
//!
//! 每天一条 SHA256 哈希链: genesis → entry₁ → entry₂ → ... → entryₙ
//! ```
//!
//! - **Append-only**: 无修改接口，过期文件按天整体删除
//! - **链验证 API**: `GET /api/oplog/{date}/verify`

pub mod service;
pub mod storage;
pub mod types;
pub mod worker;

pub use service::OpLogService;
pub use storage::{OpLogError, OpLogResult, OpLogStorage, local_date};
pub use types::{ChainBreak, ChainVerification, GENESIS_HASH, OpLogEntry};
pub use worker::OpLogWorker;
