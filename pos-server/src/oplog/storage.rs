//! 操作日志文件存储
//!
//! Append-only，每个本地日期一个 JSONL 文件 (`oplog-YYYY-MM-DD.jsonl`)。
//! 每天独立一条 SHA256 哈希链，保留期清理按整文件删除，不会破坏其它天的链。

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use pinpad::OperationRecord;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::types::{ChainBreak, ChainVerification, GENESIS_HASH, OpLogEntry};

const FILE_PREFIX: &str = "oplog-";
const FILE_SUFFIX: &str = ".jsonl";

/// 存储错误
#[derive(Debug, Error)]
pub enum OpLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt entry in {date} at line {line}")]
    Corrupt { date: NaiveDate, line: u64 },
}

pub type OpLogResult<T> = Result<T, OpLogError>;

impl From<OpLogError> for shared::error::AppError {
    fn from(err: OpLogError) -> Self {
        shared::error::AppError::storage(err.to_string())
    }
}

/// 当前链头 (内存缓存，跨天时重新加载)
#[derive(Debug, Clone)]
struct ChainHead {
    date: NaiveDate,
    sequence: u64,
    last_hash: String,
}

/// 操作日志存储
///
/// 仅提供 `append` / 读取 / 验证 / 过期清理，没有修改接口。
#[derive(Debug)]
pub struct OpLogStorage {
    dir: PathBuf,
    /// 序列化所有 append，防止序列号竞争
    head: Mutex<Option<ChainHead>>,
}

impl OpLogStorage {
    pub fn open(dir: impl Into<PathBuf>) -> OpLogResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            head: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, date.format("%Y-%m-%d"), FILE_SUFFIX))
    }

    /// 追加一条记录
    ///
    /// 1. 按记录时间确定本地日期 (文件)
    /// 2. 取链头 (跨天或首次时从文件恢复)
    /// 3. 计算哈希并写入一行
    pub fn append(&self, record: OperationRecord) -> OpLogResult<OpLogEntry> {
        let date = local_date(record.timestamp);
        let mut head = self.head.lock();

        let current = match head.take() {
            Some(h) if h.date == date => h,
            _ => self.load_head(date)?,
        };

        let sequence = current.sequence + 1;
        let record_json = serde_json::to_string(&record)?;
        let curr_hash = compute_hash(&current.last_hash, sequence, &record_json);
        let entry = OpLogEntry {
            sequence,
            record,
            prev_hash: current.last_hash.clone(),
            curr_hash,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(date))
            .and_then(|mut file| file.write_all(line.as_bytes()));

        match written {
            Ok(()) => {
                *head = Some(ChainHead {
                    date,
                    sequence,
                    last_hash: entry.curr_hash.clone(),
                });
                Ok(entry)
            }
            Err(e) => {
                *head = Some(current);
                Err(e.into())
            }
        }
    }

    /// 读取某天的全部条目 (导出)
    pub fn read_day(&self, date: NaiveDate) -> OpLogResult<Vec<OpLogEntry>> {
        let Some(content) = self.read_file(date)? else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(line).map_err(|_| OpLogError::Corrupt {
                date,
                line: idx as u64 + 1,
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// 验证某天的哈希链
    pub fn verify_day(&self, date: NaiveDate) -> OpLogResult<ChainVerification> {
        let content = self.read_file(date)?.unwrap_or_default();

        let mut total_entries = 0;
        let mut breaks = Vec::new();
        let mut expected_prev = GENESIS_HASH.to_string();
        let mut expected_sequence = 1;
        // 不可解析的行之后，以下一条的 prev_hash 重新同步
        let mut resync = false;

        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            total_entries += 1;
            let line_no = idx as u64 + 1;

            let entry: OpLogEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    breaks.push(ChainBreak {
                        line: line_no,
                        reason: format!("unparseable entry: {}", e),
                    });
                    resync = true;
                    continue;
                }
            };

            if !resync {
                if entry.prev_hash != expected_prev {
                    breaks.push(ChainBreak {
                        line: line_no,
                        reason: format!(
                            "prev_hash mismatch: expected {}, found {}",
                            expected_prev, entry.prev_hash
                        ),
                    });
                }
                if entry.sequence != expected_sequence {
                    breaks.push(ChainBreak {
                        line: line_no,
                        reason: format!(
                            "sequence gap: expected {}, found {}",
                            expected_sequence, entry.sequence
                        ),
                    });
                }
            }

            let record_json = serde_json::to_string(&entry.record)?;
            let recomputed = compute_hash(&entry.prev_hash, entry.sequence, &record_json);
            if recomputed != entry.curr_hash {
                breaks.push(ChainBreak {
                    line: line_no,
                    reason: "curr_hash does not match content".to_string(),
                });
            }

            expected_prev = entry.curr_hash;
            expected_sequence = entry.sequence + 1;
            resync = false;
        }

        Ok(ChainVerification {
            date: date.format("%Y-%m-%d").to_string(),
            total_entries,
            chain_intact: breaks.is_empty(),
            breaks,
        })
    }

    /// 删除早于 `today - retention_days` 的日志文件，返回删除数量
    pub fn cleanup(&self, retention_days: u32, today: NaiveDate) -> OpLogResult<usize> {
        let cutoff = today - chrono::Duration::days(i64::from(retention_days));
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(date) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_file_date)
            else {
                continue;
            };
            if date < cutoff {
                fs::remove_file(&path)?;
                removed += 1;
                tracing::info!(file = %path.display(), "Deleted expired operation log");
            }
        }
        Ok(removed)
    }

    fn read_file(&self, date: NaiveDate) -> OpLogResult<Option<String>> {
        match fs::read_to_string(self.file_for(date)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 从文件恢复链头 (最后一条可解析记录)
    fn load_head(&self, date: NaiveDate) -> OpLogResult<ChainHead> {
        let last = self
            .read_file(date)?
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str::<OpLogEntry>(line).ok())
            .last();

        Ok(match last {
            Some(entry) => ChainHead {
                date,
                sequence: entry.sequence,
                last_hash: entry.curr_hash,
            },
            None => ChainHead {
                date,
                sequence: 0,
                last_hash: GENESIS_HASH.to_string(),
            },
        })
    }
}

/// 记录时间对应的本地日期
pub fn local_date(timestamp_ms: i64) -> NaiveDate {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.with_timezone(&Local).date_naive())
        .unwrap_or_else(|| Local::now().date_naive())
}

fn parse_file_date(name: &str) -> Option<NaiveDate> {
    let date_part = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn compute_hash(prev_hash: &str, sequence: u64, record_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(sequence.to_be_bytes());
    hasher.update(record_json.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use pinpad::OperationKind;

    fn record_on(date: NaiveDate, kind: OperationKind, order_id: &str) -> OperationRecord {
        let ts = Local
            .from_local_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
            .single()
            .unwrap()
            .timestamp_millis();
        let mut record = OperationRecord::new(kind);
        record.timestamp = ts;
        record.order_id = Some(order_id.to_string());
        record
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_append_builds_chain() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OpLogStorage::open(dir.path()).unwrap();
        let date = day(2026, 3, 14);

        let first = storage
            .append(record_on(date, OperationKind::AuthorizeSubmitted, "o1"))
            .unwrap();
        let second = storage
            .append(record_on(date, OperationKind::OutcomeReceived, "o1"))
            .unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.prev_hash, first.curr_hash);
        assert!(storage.file_for(date).ends_with("oplog-2026-03-14.jsonl"));

        let entries = storage.read_day(date).unwrap();
        assert_eq!(entries, vec![first, second]);

        let verification = storage.verify_day(date).unwrap();
        assert!(verification.chain_intact);
        assert_eq!(verification.total_entries, 2);
    }

    #[test]
    fn test_days_are_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OpLogStorage::open(dir.path()).unwrap();

        storage
            .append(record_on(day(2026, 3, 14), OperationKind::PendencyCreated, "a"))
            .unwrap();
        let next_day = storage
            .append(record_on(day(2026, 3, 15), OperationKind::PendencyResolved, "a"))
            .unwrap();

        assert_eq!(next_day.sequence, 1);
        assert_eq!(next_day.prev_hash, GENESIS_HASH);
        assert_eq!(storage.read_day(day(2026, 3, 14)).unwrap().len(), 1);
        assert_eq!(storage.read_day(day(2026, 3, 15)).unwrap().len(), 1);
        assert!(storage.read_day(day(2026, 3, 16)).unwrap().is_empty());
    }

    #[test]
    fn test_chain_resumes_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let date = day(2026, 4, 1);
        let last = {
            let storage = OpLogStorage::open(dir.path()).unwrap();
            storage
                .append(record_on(date, OperationKind::AuthorizeSubmitted, "o1"))
                .unwrap()
        };

        let storage = OpLogStorage::open(dir.path()).unwrap();
        let resumed = storage
            .append(record_on(date, OperationKind::OutcomeReceived, "o1"))
            .unwrap();
        assert_eq!(resumed.sequence, 2);
        assert_eq!(resumed.prev_hash, last.curr_hash);
        assert!(storage.verify_day(date).unwrap().chain_intact);
    }

    #[test]
    fn test_tampering_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OpLogStorage::open(dir.path()).unwrap();
        let date = day(2026, 5, 2);
        for order in ["o1", "o2", "o3"] {
            storage
                .append(record_on(date, OperationKind::CancellationResult, order))
                .unwrap();
        }

        // rewrite the order id of the middle entry
        let path = storage.file_for(date);
        let content = fs::read_to_string(&path).unwrap();
        let tampered: Vec<String> = content
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if i == 1 {
                    line.replace("\"o2\"", "\"o9\"")
                } else {
                    line.to_string()
                }
            })
            .collect();
        fs::write(&path, tampered.join("\n")).unwrap();

        let verification = storage.verify_day(date).unwrap();
        assert!(!verification.chain_intact);
        assert_eq!(verification.breaks.len(), 1);
        assert_eq!(verification.breaks[0].line, 2);
    }

    #[test]
    fn test_deleted_entry_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OpLogStorage::open(dir.path()).unwrap();
        let date = day(2026, 5, 3);
        for order in ["o1", "o2", "o3"] {
            storage
                .append(record_on(date, OperationKind::OutcomeReceived, order))
                .unwrap();
        }

        let path = storage.file_for(date);
        let content = fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        fs::write(&path, kept.join("\n")).unwrap();

        let verification = storage.verify_day(date).unwrap();
        assert!(!verification.chain_intact);
        assert!(
            verification
                .breaks
                .iter()
                .any(|b| b.reason.starts_with("prev_hash mismatch"))
        );
    }

    #[test]
    fn test_missing_day_verifies_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OpLogStorage::open(dir.path()).unwrap();
        let verification = storage.verify_day(day(2020, 1, 1)).unwrap();
        assert!(verification.chain_intact);
        assert_eq!(verification.total_entries, 0);
    }

    #[test]
    fn test_cleanup_respects_retention() {
        let dir = tempfile::tempdir().unwrap();
        let storage = OpLogStorage::open(dir.path()).unwrap();
        for d in [1, 10, 20] {
            storage
                .append(record_on(day(2026, 6, d), OperationKind::OutcomeReceived, "o"))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        // cutoff = 2026-06-11
        let removed = storage.cleanup(10, day(2026, 6, 21)).unwrap();
        assert_eq!(removed, 2);
        assert!(!storage.file_for(day(2026, 6, 1)).exists());
        assert!(!storage.file_for(day(2026, 6, 10)).exists());
        assert!(storage.file_for(day(2026, 6, 20)).exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
