//! 操作日志服务
//!
//! `OpLogService` 是终端协调器的 [`OperationSink`]：
//! - 写入: 通过 mpsc 通道交给 [`OpLogWorker`](super::OpLogWorker)
//! - 通道满或已关闭时直接同步写入，记录不会丢失
//! - 查询 / 验证 / 清理直接读取 storage

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use pinpad::{OperationRecord, OperationSink};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::storage::{OpLogResult, OpLogStorage};
use super::types::{ChainVerification, OpLogEntry};

pub struct OpLogService {
    storage: Arc<OpLogStorage>,
    tx: mpsc::Sender<OperationRecord>,
}

impl std::fmt::Debug for OpLogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpLogService")
            .field("dir", &self.storage.dir())
            .finish_non_exhaustive()
    }
}

impl OpLogService {
    /// 创建操作日志服务
    ///
    /// 返回的 Receiver 需交给 `OpLogWorker::run`
    pub fn new(
        dir: impl Into<PathBuf>,
        buffer_size: usize,
    ) -> OpLogResult<(Arc<Self>, mpsc::Receiver<OperationRecord>)> {
        let storage = Arc::new(OpLogStorage::open(dir)?);
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        Ok((Arc::new(Self { storage, tx }), rx))
    }

    pub fn storage(&self) -> Arc<OpLogStorage> {
        self.storage.clone()
    }

    /// 导出某天的全部条目
    pub fn export(&self, date: NaiveDate) -> OpLogResult<Vec<OpLogEntry>> {
        self.storage.read_day(date)
    }

    pub fn verify(&self, date: NaiveDate) -> OpLogResult<ChainVerification> {
        self.storage.verify_day(date)
    }

    /// 按保留天数清理 (以本地今天为基准)
    pub fn cleanup(&self, retention_days: u32) -> OpLogResult<usize> {
        self.storage
            .cleanup(retention_days, Local::now().date_naive())
    }

    fn append_direct(&self, record: OperationRecord) {
        if let Err(e) = self.storage.append(record) {
            tracing::error!("Failed to write operation entry: {:?}", e);
        }
    }
}

impl OperationSink for OpLogService {
    fn record(&self, record: OperationRecord) {
        crate::audit_log!(
            record.kind,
            order_id = record.order_id,
            confirmation = record.confirmation,
            status = record.status,
            resolution = record.resolution
        );

        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                tracing::warn!(kind = %record.kind, "Operation log channel full, writing directly");
                self.append_direct(record);
            }
            Err(TrySendError::Closed(record)) => self.append_direct(record),
        }
    }
}
