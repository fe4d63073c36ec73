//! 测量日志内存实现
//!
//! 用于测试与无持久化运行。

use crate::error::StorageError;
use crate::traits::{CleanupReport, LogQuery, LogStore, RetentionPolicy};
use domain::LogEntry;
use std::sync::RwLock;

#[derive(Default)]
struct LogTable {
    next_seq: u64,
    /// (写入序号, 记录)
    rows: Vec<(u64, LogEntry)>,
}

/// 测量日志内存存储
pub struct InMemoryLogStore {
    table: RwLock<LogTable>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(LogTable::default()),
        }
    }

    /// 当前累计的记录数量（用于测试）
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LogStore for InMemoryLogStore {
    async fn append_entries(&self, entries: &[LogEntry]) -> Result<usize, StorageError> {
        let mut table = self
            .table
            .write()
            .map_err(|_| StorageError::LockPoisoned("log"))?;
        for entry in entries {
            let seq = table.next_seq;
            table.next_seq += 1;
            table.rows.push((seq, entry.clone()));
        }
        Ok(entries.len())
    }

    async fn query_entries(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StorageError> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let table = self
            .table
            .read()
            .map_err(|_| StorageError::LockPoisoned("log"))?;
        let mut selected: Vec<&(u64, LogEntry)> = table
            .rows
            .iter()
            .filter(|(_, entry)| query.matches(entry))
            .collect();
        selected.sort_by_key(|(seq, entry)| (entry.ts_ms, *seq));
        selected.reverse();

        Ok(selected
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn count_entries(&self) -> Result<u64, StorageError> {
        let table = self
            .table
            .read()
            .map_err(|_| StorageError::LockPoisoned("log"))?;
        Ok(table.rows.len() as u64)
    }

    async fn cleanup(
        &self,
        policy: &RetentionPolicy,
        now_ms: i64,
    ) -> Result<CleanupReport, StorageError> {
        let mut table = self
            .table
            .write()
            .map_err(|_| StorageError::LockPoisoned("log"))?;
        let mut report = CleanupReport::default();

        if let Some(max_age_ms) = policy.max_age_ms {
            let cutoff = now_ms.saturating_sub(max_age_ms);
            let before = table.rows.len();
            table.rows.retain(|(_, entry)| entry.ts_ms >= cutoff);
            report.deleted_by_age = (before - table.rows.len()) as u64;
        }

        if let Some(max_entries) = policy.max_entries {
            let max_entries = usize::try_from(max_entries).unwrap_or(usize::MAX);
            if table.rows.len() > max_entries {
                let excess = table.rows.len() - max_entries;
                table.rows.sort_by_key(|(seq, entry)| (entry.ts_ms, *seq));
                table.rows.drain(..excess);
                report.deleted_by_count = excess as u64;
            }
        }
        Ok(report)
    }
}
