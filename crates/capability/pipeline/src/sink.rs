use crate::{SinkConfig, SinkError};
use domain::{DeviceStatus, LogEntry, now_epoch_ms};
use ems_storage::{
    CleanupReport, InMemoryLogStore, InMemoryStatusStore, LogQuery, LogStore, StatusStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum SinkCommand {
    Entry(LogEntry),
    Flush(oneshot::Sender<()>),
}

/// 单次 `append` 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendReport {
    pub accepted: usize,
    pub dropped: usize,
}

/// 本实例累计计数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkStats {
    pub appended: u64,
    pub dropped: u64,
    pub written: u64,
    pub write_failures: u64,
}

#[derive(Default)]
struct SinkCounters {
    appended: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    write_failures: AtomicU64,
}

struct SinkInner {
    tx: mpsc::Sender<SinkCommand>,
    logs: Arc<dyn LogStore>,
    statuses: Arc<dyn StatusStore>,
    config: SinkConfig,
    counters: Arc<SinkCounters>,
}

/// 日志写入前端；克隆共享同一队列与写入任务。
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<SinkInner>,
}

impl LogSink {
    /// 创建写入前端并启动写入任务（需在 tokio 运行时内调用）。
    /// 最后一个克隆释放后，写入任务落盘剩余条目并退出。
    pub fn new(
        logs: Arc<dyn LogStore>,
        statuses: Arc<dyn StatusStore>,
        config: SinkConfig,
    ) -> Self {
        let config = config.sanitized();
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let counters = Arc::new(SinkCounters::default());
        tokio::spawn(run_writer(
            rx,
            logs.clone(),
            counters.clone(),
            config.batch_size,
            config.max_retries,
        ));
        Self {
            inner: Arc::new(SinkInner {
                tx,
                logs,
                statuses,
                config,
                counters,
            }),
        }
    }

    /// 内存后端
    pub fn in_memory(config: SinkConfig) -> Self {
        Self::new(
            Arc::new(InMemoryLogStore::new()),
            Arc::new(InMemoryStatusStore::new()),
            config,
        )
    }

    pub fn config(&self) -> &SinkConfig {
        &self.inner.config
    }

    /// 非阻塞追加；队列满时丢弃并计数。
    pub fn append(&self, entries: Vec<LogEntry>) -> AppendReport {
        let mut report = AppendReport::default();
        for entry in entries {
            match self.inner.tx.try_send(SinkCommand::Entry(entry)) {
                Ok(()) => report.accepted += 1,
                Err(_) => report.dropped += 1,
            }
        }

        let counters = &self.inner.counters;
        counters
            .appended
            .fetch_add(report.accepted as u64, Ordering::Relaxed);
        ems_telemetry::record_entries_appended(report.accepted as u64);
        if report.dropped > 0 {
            counters
                .dropped
                .fetch_add(report.dropped as u64, Ordering::Relaxed);
            ems_telemetry::record_entries_dropped(report.dropped as u64);
            warn!(
                target: "ems.sink",
                dropped = report.dropped,
                accepted = report.accepted,
                "sink_queue_full"
            );
        }
        report
    }

    /// 等待此前已入队的条目全部处理完毕。
    pub async fn flush(&self) -> Result<(), SinkError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner
            .tx
            .send(SinkCommand::Flush(ack_tx))
            .await
            .map_err(|_| SinkError::Closed)?;
        ack_rx.await.map_err(|_| SinkError::Closed)
    }

    /// 分页查询，最新优先
    pub async fn query(&self, query: &LogQuery) -> Result<Vec<LogEntry>, SinkError> {
        Ok(self.inner.logs.query_entries(query).await?)
    }

    pub async fn count(&self) -> Result<u64, SinkError> {
        Ok(self.inner.logs.count_entries().await?)
    }

    pub async fn update_status(&self, status: &DeviceStatus) -> Result<(), SinkError> {
        Ok(self.inner.statuses.upsert_status(status).await?)
    }

    pub async fn status(&self, device_id: &str) -> Result<Option<DeviceStatus>, SinkError> {
        Ok(self.inner.statuses.get_status(device_id).await?)
    }

    pub async fn statuses(&self) -> Result<Vec<DeviceStatus>, SinkError> {
        Ok(self.inner.statuses.list_statuses().await?)
    }

    pub async fn remove_status(&self, device_id: &str) -> Result<bool, SinkError> {
        Ok(self.inner.statuses.delete_status(device_id).await?)
    }

    /// 按配置的保留策略执行一次清理
    pub async fn cleanup(&self) -> Result<CleanupReport, SinkError> {
        let policy = self.inner.config.retention;
        if policy.max_entries.is_none() && policy.max_age_ms.is_none() {
            return Ok(CleanupReport::default());
        }
        let report = self.inner.logs.cleanup(&policy, now_epoch_ms()).await?;
        ems_telemetry::record_cleanup_deleted(report.total());
        if report.total() > 0 {
            info!(
                target: "ems.sink",
                deleted_by_age = report.deleted_by_age,
                deleted_by_count = report.deleted_by_count,
                "log_cleanup_completed"
            );
        }
        Ok(report)
    }

    /// 按 `cleanup_interval` 定时清理，直到 `stop` 置位。首个周期立即执行。
    pub fn spawn_cleanup(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let sink = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sink.inner.config.cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = sink.cleanup().await {
                            warn!(target: "ems.sink", error = %err, "log_cleanup_failed");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(target: "ems.sink", "log_cleanup_stopped");
        })
    }

    pub fn stats(&self) -> SinkStats {
        let counters = &self.inner.counters;
        SinkStats {
            appended: counters.appended.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
            write_failures: counters.write_failures.load(Ordering::Relaxed),
        }
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<SinkCommand>,
    logs: Arc<dyn LogStore>,
    counters: Arc<SinkCounters>,
    batch_size: usize,
    max_retries: usize,
) {
    let mut batch = Vec::with_capacity(batch_size);
    let mut acks = Vec::new();
    while let Some(command) = rx.recv().await {
        collect(command, &mut batch, &mut acks);
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(command) => collect(command, &mut batch, &mut acks),
                Err(_) => break,
            }
        }
        if !batch.is_empty() {
            write_batch_with_retry(logs.as_ref(), &batch, &counters, max_retries).await;
            batch.clear();
        }
        for ack in acks.drain(..) {
            let _ = ack.send(());
        }
    }
    debug!(target: "ems.sink", "sink_writer_stopped");
}

fn collect(
    command: SinkCommand,
    batch: &mut Vec<LogEntry>,
    acks: &mut Vec<oneshot::Sender<()>>,
) {
    match command {
        SinkCommand::Entry(entry) => batch.push(entry),
        SinkCommand::Flush(ack) => acks.push(ack),
    }
}

async fn write_batch_with_retry(
    logs: &dyn LogStore,
    batch: &[LogEntry],
    counters: &SinkCounters,
    max_retries: usize,
) {
    let mut attempt = 0;
    loop {
        match logs.append_entries(batch).await {
            Ok(written) => {
                counters
                    .written
                    .fetch_add(written as u64, Ordering::Relaxed);
                ems_telemetry::record_entries_written(written as u64);
                return;
            }
            Err(err) => {
                attempt += 1;
                if attempt > max_retries {
                    counters.write_failures.fetch_add(1, Ordering::Relaxed);
                    ems_telemetry::record_sink_write_failure();
                    warn!(
                        target: "ems.sink",
                        error = %err,
                        unavailable = err.is_unavailable(),
                        entries = batch.len(),
                        attempts = attempt,
                        "sink_write_failed"
                    );
                    return;
                }
                debug!(target: "ems.sink", error = %err, attempt, "sink_write_retry");
            }
        }
    }
}
