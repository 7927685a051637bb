//! 操作日志类型定义

use pinpad::OperationRecord;
use serde::{Deserialize, Serialize};

/// 每日链的起点
pub const GENESIS_HASH: &str = "genesis";

/// 操作日志条目 (一行 JSON)
///
/// - `prev_hash`: 同一天前一条记录的哈希
/// - `curr_hash`: SHA256(prev_hash + sequence + record)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpLogEntry {
    /// 当天内递增序列号 (从 1 开始)
    pub sequence: u64,
    #[serde(flatten)]
    pub record: OperationRecord,
    pub prev_hash: String,
    pub curr_hash: String,
}

/// 操作日志链验证结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChainVerification {
    /// YYYY-MM-DD
    pub date: String,
    pub total_entries: u64,
    pub chain_intact: bool,
    pub breaks: Vec<ChainBreak>,
}

/// 链断裂点
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChainBreak {
    /// 文件行号 (从 1 开始)
    pub line: u64,
    pub reason: String,
}
