//! 单台设备的轮询 actor。
//!
//! ```text
//! Connecting ──成功──▶ Connected ──定时触发──▶ Reading ──批次完成──▶ Connected
//!     │                   │                      │
//!     └──全部尝试失败──▶ Error ◀──传输中断 / 全部点位失败──┘
//!                         │
//!                  退避后重新 Connecting
//! 任意状态 ──停止请求──▶ Stopped
//! ```

use crate::config::{PollerConfig, ReconnectBackoff};
use domain::{Device, DeviceState, DeviceStatus, LogEntry, Tag, now_epoch_ms};
use ems_normalize::decode;
use ems_pipeline::LogSink;
use ems_protocol::ProtocolSession;
use ems_schedule::{GroupKey, PollPlan, ScheduleRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 已连接阶段结束的原因。
enum PhaseExit {
    Stop,
    Reconnect(String),
}

/// 单个分组读取的结果。
enum ReadOutcome {
    Done,
    Stop,
    Reconnect(String),
}

/// 各调度组的定时任务；每个任务向轮询器投递分组 key。
struct GroupTimers {
    _tx: mpsc::Sender<GroupKey>,
    rx: mpsc::Receiver<GroupKey>,
    handles: Vec<JoinHandle<()>>,
}

impl GroupTimers {
    fn start(plan: &PollPlan) -> Self {
        let capacity = plan.groups.len().max(1) * 2;
        let (tx, rx) = mpsc::channel(capacity);
        let handles = plan
            .groups
            .iter()
            .map(|group| spawn_ticker(group.key.clone(), group.interval_ms, tx.clone()))
            .collect();
        Self {
            _tx: tx,
            rx,
            handles,
        }
    }
}

impl Drop for GroupTimers {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn spawn_ticker(key: GroupKey, interval_ms: u64, tx: mpsc::Sender<GroupKey>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match tx.try_send(key.clone()) {
                Ok(()) => {}
                // 轮询器忙，本次触发合并到已排队的触发中
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => break,
            }
        }
    })
}

/// 状态写入任务：只写最新一次状态，慢存储不阻塞读取循环。
struct StatusWriter {
    tx: Option<watch::Sender<DeviceStatus>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusWriter {
    fn spawn(sink: LogSink, initial: DeviceStatus) -> Self {
        let (tx, mut rx) = watch::channel(initial);
        let handle = tokio::spawn(async move {
            // 发送端释放后，尚未写入的最后一次状态仍会被 changed() 返回
            while rx.changed().await.is_ok() {
                let status = rx.borrow_and_update().clone();
                if let Err(err) = sink.update_status(&status).await {
                    warn!(
                        target: "ems.poller",
                        device_id = %status.device_id,
                        error = %err,
                        "status_write_failed"
                    );
                }
            }
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    fn send(&self, status: DeviceStatus) {
        if let Some(tx) = &self.tx {
            tx.send_replace(status);
        }
    }

    /// 关闭通道并等待最后一次状态落库；超时返回 false。
    async fn finish(&mut self, limit: Duration) -> bool {
        self.tx.take();
        let Some(mut handle) = self.handle.take() else {
            return true;
        };
        match tokio::time::timeout(limit, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                handle.abort();
                false
            }
        }
    }
}

impl Drop for StatusWriter {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// 等待停止信号（发送端释放同样视为停止）。
pub(crate) async fn wait_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// 逐次尝试连接，每次受 timeout_ms 约束。成功返回所用尝试次数。
///
/// 快速失败（如连接被拒）的尝试同样占满一个 timeout_ms 周期，
/// 目标不可达时不会在短时间内打满重试。
async fn connect_with_retry(
    session: &mut dyn ProtocolSession,
    device: &Device,
) -> Result<u32, String> {
    let attempts = device.attempts();
    let timeout = Duration::from_millis(device.timeout_ms);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let started = Instant::now();
        ems_telemetry::record_connect_attempt();
        let result = match tokio::time::timeout(timeout, session.connect()).await {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(_) => Err(format!("connect timed out after {} ms", device.timeout_ms)),
        };
        match result {
            Ok(()) => return Ok(attempt),
            Err(reason) => {
                debug!(
                    target: "ems.poller",
                    device_id = %device.id,
                    attempt,
                    attempts,
                    reason = %reason,
                    "connect_attempt_failed"
                );
                last_error = reason;
                tokio::time::sleep_until(started + timeout).await;
            }
        }
    }
    ems_telemetry::record_connect_failure();
    Err(format!(
        "connection failed after {} attempt(s): {}",
        attempts, last_error
    ))
}

pub(crate) struct DevicePoller {
    device: Device,
    session: Box<dyn ProtocolSession>,
    registry: Arc<ScheduleRegistry>,
    sink: LogSink,
    config: PollerConfig,
    stop: watch::Receiver<bool>,
    status: DeviceStatus,
    status_writer: StatusWriter,
    plan: PollPlan,
    /// 上一批记录的时间戳，保证同一点位的时间戳不回退
    last_ts_ms: i64,
}

impl DevicePoller {
    pub(crate) fn new(
        device: Device,
        session: Box<dyn ProtocolSession>,
        registry: Arc<ScheduleRegistry>,
        sink: LogSink,
        config: PollerConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let status = DeviceStatus::new(device.id.clone(), DeviceState::Connecting, now_epoch_ms());
        let status_writer = StatusWriter::spawn(sink.clone(), status.clone());
        Self {
            device,
            session,
            registry,
            sink,
            config,
            stop,
            status,
            status_writer,
            plan: PollPlan::default(),
            last_ts_ms: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            target: "ems.poller",
            device_id = %self.device.id,
            protocol = self.device.protocol.protocol_type(),
            endpoint = %self.device.protocol.endpoint(),
            "poller_started"
        );
        if let Ok(Some(previous)) = self.sink.status(&self.device.id).await {
            self.status.connection_count = previous.connection_count;
        }

        let mut backoff = ReconnectBackoff::from_config(&self.config);
        loop {
            self.publish(DeviceState::Connecting, None);
            let connected = tokio::select! {
                result = connect_with_retry(self.session.as_mut(), &self.device) => Some(result),
                _ = wait_stop(&mut self.stop) => None,
            };

            let reason = match connected {
                None => break,
                Some(Ok(attempt)) => {
                    backoff.reset();
                    self.status.connection_count += 1;
                    info!(
                        target: "ems.poller",
                        device_id = %self.device.id,
                        attempt,
                        connection_count = self.status.connection_count,
                        "device_connected"
                    );
                    self.publish(DeviceState::Connected, None);
                    match self.poll_connected().await {
                        PhaseExit::Stop => break,
                        PhaseExit::Reconnect(reason) => {
                            self.session.disconnect().await;
                            reason
                        }
                    }
                }
                Some(Err(reason)) => reason,
            };

            let delay = backoff.next_delay();
            warn!(
                target: "ems.poller",
                device_id = %self.device.id,
                reason = %reason,
                retry_in_ms = delay.as_millis() as u64,
                "device_error"
            );
            self.publish(DeviceState::Error, Some(reason));
            if self.pause(delay).await {
                break;
            }
        }

        self.session.disconnect().await;
        self.publish(DeviceState::Stopped, None);
        let limit = Duration::from_millis(self.device.timeout_ms);
        if !self.status_writer.finish(limit).await {
            warn!(
                target: "ems.poller",
                device_id = %self.device.id,
                "status_flush_timeout"
            );
        }
        info!(target: "ems.poller", device_id = %self.device.id, "poller_stopped");
    }

    /// 已连接阶段：按分组定时读取，直到停止或需要重连。
    async fn poll_connected(&mut self) -> PhaseExit {
        let mut registry_rx = self.registry.subscribe();
        registry_rx.borrow_and_update();
        self.rebuild_plan();
        let mut timers = GroupTimers::start(&self.plan);

        loop {
            tokio::select! {
                _ = wait_stop(&mut self.stop) => return PhaseExit::Stop,
                changed = registry_rx.changed() => {
                    if changed.is_ok() {
                        let previous = self.plan.timers();
                        self.rebuild_plan();
                        if self.plan.timers() != previous {
                            timers = GroupTimers::start(&self.plan);
                        }
                    }
                }
                Some(key) = timers.rx.recv() => {
                    match self.read_group(&key).await {
                        ReadOutcome::Done => {}
                        ReadOutcome::Stop => return PhaseExit::Stop,
                        ReadOutcome::Reconnect(reason) => return PhaseExit::Reconnect(reason),
                    }
                }
            }
        }
    }

    fn rebuild_plan(&mut self) {
        let snapshot = self.registry.snapshot();
        self.plan = PollPlan::build(&self.device, &snapshot);
        info!(
            target: "ems.poller",
            device_id = %self.device.id,
            timers = self.plan.groups.len(),
            active_tags = self.plan.active_tag_count(),
            paused_tags = self.plan.paused.len(),
            "poll_plan_built"
        );
        if !self.plan.fallback.is_empty() {
            warn!(
                target: "ems.poller",
                device_id = %self.device.id,
                tags = ?self.plan.fallback,
                "schedule_group_unknown_using_device_interval"
            );
        }
    }

    async fn read_group(&mut self, key: &GroupKey) -> ReadOutcome {
        let Some(tags) = self.plan.group(key).map(|group| group.tags.clone()) else {
            return ReadOutcome::Done;
        };
        if tags.is_empty() {
            return ReadOutcome::Done;
        }

        self.publish(DeviceState::Reading, None);
        let started = Instant::now();
        let result = tokio::select! {
            result = self.session.read_batch(&tags) => result,
            _ = wait_stop(&mut self.stop) => return ReadOutcome::Stop,
        };
        ems_telemetry::record_poll();
        ems_telemetry::record_poll_latency_ms(started.elapsed().as_millis() as u64);

        let results = match result {
            Ok(results) => results,
            Err(err) => return ReadOutcome::Reconnect(err.to_string()),
        };

        let ts_ms = self.next_timestamp();
        let mut entries = Vec::with_capacity(tags.len());
        let mut first_error = None;
        let mut good = 0usize;
        for (tag, result) in tags.iter().zip(results) {
            match result.map_err(|err| err.to_string()).and_then(|raw| {
                decode(&raw, tag).map_err(|err| err.to_string())
            }) {
                Ok(value) => {
                    good += 1;
                    entries.push(LogEntry::good(
                        self.device.id.clone(),
                        tag.name.clone(),
                        value,
                        tag.unit.clone(),
                        ts_ms,
                    ));
                }
                Err(reason) => {
                    debug!(
                        target: "ems.poller",
                        device_id = %self.device.id,
                        tag = %tag.name,
                        reason = %reason,
                        "tag_read_bad"
                    );
                    entries.push(self.bad_entry(tag, ts_ms));
                    first_error.get_or_insert(reason);
                }
            }
        }
        // 会话返回的结果少于请求点位时，缺失部分记为 Bad
        for tag in tags.iter().skip(entries.len()) {
            entries.push(self.bad_entry(tag, ts_ms));
            first_error.get_or_insert_with(|| "missing result".to_string());
        }

        let bad = entries.len() - good;
        ems_telemetry::record_reads(good as u64, bad as u64);
        debug!(
            target: "ems.poller",
            device_id = %self.device.id,
            group = %key,
            good,
            bad,
            "group_polled"
        );
        self.sink.append(entries);

        if good == 0 {
            return ReadOutcome::Reconnect(format!(
                "all {} tag reads failed: {}",
                tags.len(),
                first_error.unwrap_or_default()
            ));
        }
        self.publish(DeviceState::Connected, None);
        ReadOutcome::Done
    }

    fn bad_entry(&self, tag: &Tag, ts_ms: i64) -> LogEntry {
        LogEntry::bad(self.device.id.clone(), tag.name.clone(), tag.unit.clone(), ts_ms)
    }

    /// 单调不减的时间戳。
    fn next_timestamp(&mut self) -> i64 {
        self.last_ts_ms = monotonic_ts(now_epoch_ms(), self.last_ts_ms);
        self.last_ts_ms
    }

    /// 等待退避时长；收到停止信号返回 true。
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = wait_stop(&mut self.stop) => true,
        }
    }

    /// 更新状态并交给写入任务；不等待落库。
    fn publish(&mut self, state: DeviceState, error_message: Option<String>) {
        self.status.state = state;
        self.status.error_message = error_message;
        self.status.last_update_ms = now_epoch_ms();
        self.status_writer.send(self.status.clone());
    }
}

/// 墙钟回拨时沿用上一次的时间戳。
fn monotonic_ts(now_ms: i64, last_ms: i64) -> i64 {
    now_ms.max(last_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_never_go_backwards() {
        let first = monotonic_ts(1_000, 0);
        let rewound = monotonic_ts(900, first);
        let later = monotonic_ts(1_200, rewound);
        assert_eq!((first, rewound, later), (1_000, 1_000, 1_200));
    }

    #[tokio::test]
    async fn wait_stop_returns_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        wait_stop(&mut rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn group_timers_emit_each_group_key() {
        let device = Device {
            id: "d".to_string(),
            name: "d".to_string(),
            serial_number: None,
            model_id: None,
            enabled: true,
            protocol: domain::ProtocolConfig::Iec104 {
                host: "127.0.0.1".to_string(),
                port: 2404,
                common_address: None,
            },
            polling_interval_ms: 1000,
            timeout_ms: 1000,
            retry_count: 1,
            created_at_ms: 0,
            updated_at_ms: 0,
            tags: vec![
                Tag::new("a", 1, domain::DataType::Coil),
                Tag::new("b", 2, domain::DataType::Coil).with_schedule_group("fast"),
            ],
        };
        let mut groups = std::collections::HashMap::new();
        groups.insert(
            "fast".to_string(),
            domain::ScheduleGroup::new("fast", "Fast", 100),
        );
        let plan = PollPlan::build(&device, &groups);
        let mut timers = GroupTimers::start(&plan);

        let mut seen = vec![
            timers.rx.recv().await.expect("tick"),
            timers.rx.recv().await.expect("tick"),
        ];
        seen.sort();
        assert_eq!(
            seen,
            vec![GroupKey::Device, GroupKey::Group("fast".to_string())]
        );
    }
}
