//! 日志写入前端（LogSink）。
//!
//! 轮询器只调用非阻塞的 `append`：条目进入有界队列，由单个写入任务批量落盘；
//! 队列满时丢弃并计数。查询、设备状态与保留清理直接转发到存储后端。

mod sink;

use ems_storage::{RetentionPolicy, StorageError};
use std::time::Duration;

pub use sink::{AppendReport, LogSink, SinkStats};

/// 默认日志条数上限
pub const DEFAULT_MAX_LOG_ENTRIES: u64 = 1_000_000;

/// 写入前端错误。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("sink closed")]
    Closed,
}

/// 写入前端参数。
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// 有界队列容量（条）
    pub queue_capacity: usize,
    /// 单次落盘最大条数
    pub batch_size: usize,
    /// 落盘失败后的重试次数
    pub max_retries: usize,
    pub retention: RetentionPolicy,
    pub cleanup_interval: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 200,
            max_retries: 2,
            retention: RetentionPolicy {
                max_entries: Some(DEFAULT_MAX_LOG_ENTRIES),
                max_age_ms: None,
            },
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SinkConfig {
    fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.queue_capacity == 0 {
            self.queue_capacity = 1;
        }
        if self.cleanup_interval < Duration::from_secs(1) {
            self.cleanup_interval = Duration::from_secs(1);
        }
        self
    }
}
