//! 存储接口 Trait 定义
//!
//! - LogStore：测量日志追加、分页查询与保留清理
//! - StatusStore：设备状态（每台设备一行，原地覆盖）
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{DeviceStatus, LogEntry};

/// 默认分页大小
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// 日志查询条件，结果按时间倒序（同一时间戳按写入顺序倒序）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub device_id: Option<String>,
    pub tag_name: Option<String>,
    /// 含边界
    pub from_ms: Option<i64>,
    /// 含边界
    pub to_ms: Option<i64>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            device_id: None,
            tag_name: None,
            from_ms: None,
            to_ms: None,
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
        }
    }
}

impl LogQuery {
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag_name: impl Into<String>) -> Self {
        self.tag_name = Some(tag_name.into());
        self
    }

    pub fn with_range(mut self, from_ms: Option<i64>, to_ms: Option<i64>) -> Self {
        self.from_ms = from_ms;
        self.to_ms = to_ms;
        self
    }

    pub fn with_page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub(crate) fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(device_id) = &self.device_id {
            if &entry.device_id != device_id {
                return false;
            }
        }
        if let Some(tag_name) = &self.tag_name {
            if &entry.tag_name != tag_name {
                return false;
            }
        }
        if let Some(from) = self.from_ms {
            if entry.ts_ms < from {
                return false;
            }
        }
        if let Some(to) = self.to_ms {
            if entry.ts_ms > to {
                return false;
            }
        }
        true
    }
}

/// 保留策略：条数上限与最大保留时长，任一可为空。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    pub max_entries: Option<u64>,
    pub max_age_ms: Option<i64>,
}

/// 一次清理的删除统计。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub deleted_by_age: u64,
    pub deleted_by_count: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.deleted_by_age + self.deleted_by_count
    }
}

/// 测量日志存储接口
#[async_trait]
pub trait LogStore: Send + Sync {
    /// 批量追加，返回写入条数
    async fn append_entries(&self, entries: &[LogEntry]) -> Result<usize, StorageError>;

    /// 分页查询，最新优先
    async fn query_entries(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StorageError>;

    /// 当前日志总条数
    async fn count_entries(&self) -> Result<u64, StorageError>;

    /// 按保留策略删除：先删过期记录，再删超出上限的最旧记录
    async fn cleanup(
        &self,
        policy: &RetentionPolicy,
        now_ms: i64,
    ) -> Result<CleanupReport, StorageError>;
}

/// 设备状态存储接口
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// 覆盖写入设备状态
    async fn upsert_status(&self, status: &DeviceStatus) -> Result<(), StorageError>;

    async fn get_status(&self, device_id: &str) -> Result<Option<DeviceStatus>, StorageError>;

    /// 全部设备状态，按 device_id 排序
    async fn list_statuses(&self) -> Result<Vec<DeviceStatus>, StorageError>;

    /// 删除设备状态，返回是否存在
    async fn delete_status(&self, device_id: &str) -> Result<bool, StorageError>;
}
