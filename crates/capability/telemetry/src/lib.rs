//! 追踪初始化与进程级计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub polls: u64,
    pub reads_good: u64,
    pub reads_bad: u64,
    pub entries_appended: u64,
    pub entries_dropped: u64,
    pub entries_written: u64,
    pub sink_write_failure: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub poller_restarts: u64,
    pub cleanup_deleted: u64,
    pub poll_latency_ms_total: u64,
    pub poll_latency_ms_count: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    polls: AtomicU64,
    reads_good: AtomicU64,
    reads_bad: AtomicU64,
    entries_appended: AtomicU64,
    entries_dropped: AtomicU64,
    entries_written: AtomicU64,
    sink_write_failure: AtomicU64,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    poller_restarts: AtomicU64,
    cleanup_deleted: AtomicU64,
    poll_latency_ms_total: AtomicU64,
    poll_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            reads_good: AtomicU64::new(0),
            reads_bad: AtomicU64::new(0),
            entries_appended: AtomicU64::new(0),
            entries_dropped: AtomicU64::new(0),
            entries_written: AtomicU64::new(0),
            sink_write_failure: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            poller_restarts: AtomicU64::new(0),
            cleanup_deleted: AtomicU64::new(0),
            poll_latency_ms_total: AtomicU64::new(0),
            poll_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            reads_good: self.reads_good.load(Ordering::Relaxed),
            reads_bad: self.reads_bad.load(Ordering::Relaxed),
            entries_appended: self.entries_appended.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            entries_written: self.entries_written.load(Ordering::Relaxed),
            sink_write_failure: self.sink_write_failure.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            poller_restarts: self.poller_restarts.load(Ordering::Relaxed),
            cleanup_deleted: self.cleanup_deleted.load(Ordering::Relaxed),
            poll_latency_ms_total: self.poll_latency_ms_total.load(Ordering::Relaxed),
            poll_latency_ms_count: self.poll_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录一次批量轮询。
pub fn record_poll() {
    metrics().polls.fetch_add(1, Ordering::Relaxed);
}

/// 记录点位读取结果（Good / Bad 数量）。
pub fn record_reads(good: u64, bad: u64) {
    let metrics = metrics();
    metrics.reads_good.fetch_add(good, Ordering::Relaxed);
    metrics.reads_bad.fetch_add(bad, Ordering::Relaxed);
}

/// 记录进入写入队列的日志条数。
pub fn record_entries_appended(count: u64) {
    metrics()
        .entries_appended
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录因队列满而丢弃的日志条数。
pub fn record_entries_dropped(count: u64) {
    metrics().entries_dropped.fetch_add(count, Ordering::Relaxed);
}

/// 记录成功落盘的日志条数。
pub fn record_entries_written(count: u64) {
    metrics().entries_written.fetch_add(count, Ordering::Relaxed);
}

/// 记录写入失败次数。
pub fn record_sink_write_failure() {
    metrics().sink_write_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接尝试次数。
pub fn record_connect_attempt() {
    metrics().connect_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接失败次数（所有尝试均失败）。
pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录监督器重启轮询器次数。
pub fn record_poller_restart() {
    metrics().poller_restarts.fetch_add(1, Ordering::Relaxed);
}

/// 记录保留清理删除条数。
pub fn record_cleanup_deleted(count: u64) {
    metrics().cleanup_deleted.fetch_add(count, Ordering::Relaxed);
}

/// 记录单批轮询耗时（毫秒）。
pub fn record_poll_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .poll_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .poll_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
