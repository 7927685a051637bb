//! 操作日志后台 Worker
//!
//! 从 mpsc 通道消费 OperationRecord，追加到当天的 JSONL 文件。
//! 通道关闭时自动退出。

use std::sync::Arc;

use pinpad::OperationRecord;
use tokio::sync::mpsc;

use super::storage::OpLogStorage;

pub struct OpLogWorker {
    storage: Arc<OpLogStorage>,
}

impl OpLogWorker {
    pub fn new(storage: Arc<OpLogStorage>) -> Self {
        Self { storage }
    }

    /// 运行 worker (阻塞直到通道关闭)
    pub async fn run(self, mut rx: mpsc::Receiver<OperationRecord>) {
        tracing::info!("Operation log worker started");

        while let Some(record) = rx.recv().await {
            match self.storage.append(record) {
                Ok(entry) => {
                    tracing::debug!(
                        sequence = entry.sequence,
                        kind = %entry.record.kind,
                        "Operation entry recorded"
                    );
                }
                Err(e) => {
                    tracing::error!("Failed to write operation entry: {:?}", e);
                }
            }
        }

        tracing::info!("Operation log channel closed, worker stopping");
    }
}
