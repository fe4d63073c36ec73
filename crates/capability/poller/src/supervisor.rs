//! 轮询器监督器：按设备集对账，管理轮询器的启停与重启。

use crate::config::PollerConfig;
use crate::error::SupervisorError;
use crate::poller::{DevicePoller, wait_stop};
use domain::{Device, DeviceState, DeviceStatus, ScheduleGroup, now_epoch_ms};
use ems_pipeline::LogSink;
use ems_protocol::{ProtocolSession, SessionFactory};
use ems_schedule::ScheduleRegistry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

/// 对账结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub restarted: Vec<String>,
    pub unchanged: Vec<String>,
    pub rejected: Vec<RejectedDevice>,
}

/// 被拒绝的设备及原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedDevice {
    pub device_id: String,
    pub reason: String,
}

struct PollerHandle {
    instance_id: Uuid,
    device: Device,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}

#[derive(Default)]
struct SupervisorState {
    /// 已知设备（按 id 排序）
    devices: BTreeMap<String, Device>,
    /// 每个 id 至多一个轮询器
    pollers: HashMap<String, PollerHandle>,
}

pub struct PollerSupervisor {
    factory: Arc<dyn SessionFactory>,
    registry: Arc<ScheduleRegistry>,
    sink: LogSink,
    config: PollerConfig,
    state: Mutex<SupervisorState>,
}

impl PollerSupervisor {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        registry: Arc<ScheduleRegistry>,
        sink: LogSink,
        config: PollerConfig,
    ) -> Self {
        Self {
            factory,
            registry,
            sink,
            config,
            state: Mutex::new(SupervisorState::default()),
        }
    }

    pub fn registry(&self) -> &Arc<ScheduleRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// 按期望设备集对账：启动新启用的设备，停止禁用或移除的设备，
    /// 重启配置变化的设备，未变化的设备保持原轮询器。
    pub async fn apply_device_set(&self, devices: Vec<Device>) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut desired: BTreeMap<String, Device> = BTreeMap::new();
        for device in devices {
            if desired.contains_key(&device.id) {
                reject(&mut report, &device.id, "duplicate device id".to_string());
                continue;
            }
            if let Err(err) = device.validate() {
                reject(&mut report, &device.id, err.to_string());
                continue;
            }
            desired.insert(device.id.clone(), device);
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let running: Vec<String> = state.pollers.keys().cloned().collect();
        for id in running {
            let keep = desired.get(&id).is_some_and(|device| device.enabled);
            if keep {
                continue;
            }
            if let Some(handle) = state.pollers.remove(&id) {
                self.stop_poller(handle).await;
                report.stopped.push(id);
            }
        }

        let mut failed = HashSet::new();
        for (id, device) in &desired {
            if !device.enabled {
                self.write_state(&device.id, DeviceState::Disabled).await;
                continue;
            }
            let unchanged = state.pollers.get(id).is_some_and(|handle| {
                handle.is_running() && handle.device.same_runtime_config(device)
            });
            if unchanged {
                report.unchanged.push(id.clone());
                continue;
            }

            let previous = state.pollers.remove(id);
            let session = match self.factory.create(device) {
                Ok(session) => session,
                Err(err) => {
                    if let Some(handle) = previous {
                        self.stop_poller(handle).await;
                        report.stopped.push(id.clone());
                    }
                    reject(&mut report, id, err.to_string());
                    failed.insert(id.clone());
                    continue;
                }
            };
            match previous {
                Some(handle) => {
                    self.stop_poller(handle).await;
                    report.restarted.push(id.clone());
                }
                None => report.started.push(id.clone()),
            }
            let handle = self.spawn_poller(device.clone(), session);
            state.pollers.insert(id.clone(), handle);
        }

        desired.retain(|id, _| !failed.contains(id));
        state.devices = desired;

        info!(
            target: "ems.supervisor",
            started = report.started.len(),
            stopped = report.stopped.len(),
            restarted = report.restarted.len(),
            unchanged = report.unchanged.len(),
            rejected = report.rejected.len(),
            "device_set_applied"
        );
        report
    }

    /// 启动已知设备的轮询器（同时将设备标记为启用）。已在运行时返回 `false`。
    pub async fn start_device(&self, device_id: &str) -> Result<bool, SupervisorError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(known) = state.devices.get(device_id) else {
            return Err(SupervisorError::UnknownDevice(device_id.to_string()));
        };
        if state
            .pollers
            .get(device_id)
            .is_some_and(PollerHandle::is_running)
        {
            return Ok(false);
        }

        let mut device = known.clone();
        device.enabled = true;
        device.validate()?;
        let session = self
            .factory
            .create(&device)
            .map_err(|err| SupervisorError::Session(err.to_string()))?;

        // 已结束的旧实例直接丢弃
        state.pollers.remove(device_id);
        let handle = self.spawn_poller(device.clone(), session);
        state.pollers.insert(device.id.clone(), handle);
        state.devices.insert(device.id.clone(), device);
        Ok(true)
    }

    /// 停止设备的轮询器，状态保留为 Stopped。未在运行时返回 `false`。
    pub async fn stop_device(&self, device_id: &str) -> Result<bool, SupervisorError> {
        let mut state = self.state.lock().await;
        if !state.devices.contains_key(device_id) {
            return Err(SupervisorError::UnknownDevice(device_id.to_string()));
        }
        match state.pollers.remove(device_id) {
            Some(handle) => {
                self.stop_poller(handle).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 每台已知设备的最新状态；尚无记录的设备按启用情况合成。
    pub async fn get_status(&self) -> Result<Vec<DeviceStatus>, SupervisorError> {
        let devices = self.devices().await;
        let mut statuses = Vec::with_capacity(devices.len());
        for device in devices {
            let status = match self.sink.status(&device.id).await? {
                Some(status) => status,
                None => {
                    let state = if device.enabled {
                        DeviceState::Connecting
                    } else {
                        DeviceState::Disabled
                    };
                    DeviceStatus::new(device.id.clone(), state, now_epoch_ms())
                }
            };
            statuses.push(status);
        }
        Ok(statuses)
    }

    pub async fn devices(&self) -> Vec<Device> {
        self.state.lock().await.devices.values().cloned().collect()
    }

    pub async fn device(&self, device_id: &str) -> Option<Device> {
        self.state.lock().await.devices.get(device_id).cloned()
    }

    /// 当前轮询器实例 ID（重启后变化）。
    pub async fn poller_instance(&self, device_id: &str) -> Option<Uuid> {
        self.state
            .lock()
            .await
            .pollers
            .get(device_id)
            .filter(|handle| handle.is_running())
            .map(|handle| handle.instance_id)
    }

    pub async fn running_count(&self) -> usize {
        self.state
            .lock()
            .await
            .pollers
            .values()
            .filter(|handle| handle.is_running())
            .count()
    }

    pub fn upsert_schedule_group(
        &self,
        group: ScheduleGroup,
    ) -> Result<ScheduleGroup, SupervisorError> {
        Ok(self.registry.upsert(group)?)
    }

    pub fn set_schedule_group_enabled(
        &self,
        group_id: &str,
        enabled: bool,
    ) -> Result<ScheduleGroup, SupervisorError> {
        Ok(self.registry.set_enabled(group_id, enabled)?)
    }

    /// 删除调度组；仍被已知设备的点位引用时拒绝。
    pub async fn delete_schedule_group(
        &self,
        group_id: &str,
    ) -> Result<ScheduleGroup, SupervisorError> {
        // 持锁完成引用检查与删除，期间设备集不会变化
        let state = self.state.lock().await;
        let devices: Vec<Device> = state.devices.values().cloned().collect();
        Ok(self.registry.remove(group_id, &devices)?)
    }

    /// 重启意外结束的轮询器，返回重启数量。
    pub async fn check_pollers(&self) -> usize {
        let mut state = self.state.lock().await;
        let finished: Vec<String> = state
            .pollers
            .iter()
            .filter(|(_, handle)| !handle.is_running())
            .map(|(id, _)| id.clone())
            .collect();

        let mut restarted = 0;
        for id in finished {
            let Some(handle) = state.pollers.remove(&id) else {
                continue;
            };
            let PollerHandle {
                instance_id,
                device,
                join,
                ..
            } = handle;
            match join.await {
                Err(err) if err.is_panic() => warn!(
                    target: "ems.supervisor",
                    device_id = %id,
                    instance_id = %instance_id,
                    "poller_panicked"
                ),
                _ => warn!(
                    target: "ems.supervisor",
                    device_id = %id,
                    instance_id = %instance_id,
                    "poller_exited"
                ),
            }
            if !device.enabled {
                continue;
            }
            match self.factory.create(&device) {
                Ok(session) => {
                    let handle = self.spawn_poller(device, session);
                    state.pollers.insert(id, handle);
                    ems_telemetry::record_poller_restart();
                    restarted += 1;
                }
                Err(err) => warn!(
                    target: "ems.supervisor",
                    device_id = %id,
                    error = %err,
                    "poller_restart_failed"
                ),
            }
        }
        restarted
    }

    /// 周期性检查轮询器，直到收到停止信号。
    pub fn spawn_watchdog(self: Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.watchdog_interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 首次触发立即完成，跳过
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let restarted = self.check_pollers().await;
                        if restarted > 0 {
                            info!(target: "ems.supervisor", restarted, "watchdog_restarted_pollers");
                        }
                    }
                    _ = wait_stop(&mut stop) => break,
                }
            }
        })
    }

    /// 停止全部轮询器。
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let handles: Vec<PollerHandle> = state.pollers.drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            let _ = handle.stop_tx.send(true);
        }
        let count = handles.len();
        for handle in handles {
            self.stop_poller(handle).await;
        }
        info!(target: "ems.supervisor", pollers = count, "supervisor_shutdown");
    }

    fn spawn_poller(&self, device: Device, session: Box<dyn ProtocolSession>) -> PollerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let instance_id = Uuid::new_v4();
        info!(
            target: "ems.supervisor",
            device_id = %device.id,
            instance_id = %instance_id,
            "poller_spawned"
        );
        let poller = DevicePoller::new(
            device.clone(),
            session,
            self.registry.clone(),
            self.sink.clone(),
            self.config,
            stop_rx,
        );
        PollerHandle {
            instance_id,
            device,
            stop_tx,
            join: tokio::spawn(poller.run()),
        }
    }

    /// 请求停止并等待轮询器退出；超过 timeout_ms + 1s 则强制中止。
    async fn stop_poller(&self, handle: PollerHandle) {
        let PollerHandle {
            instance_id,
            device,
            stop_tx,
            mut join,
        } = handle;
        let _ = stop_tx.send(true);

        let grace = Duration::from_millis(device.timeout_ms) + Duration::from_secs(1);
        let clean = match tokio::time::timeout(grace, &mut join).await {
            Ok(result) => result.is_ok(),
            Err(_) => {
                join.abort();
                warn!(
                    target: "ems.supervisor",
                    device_id = %device.id,
                    instance_id = %instance_id,
                    "poller_stop_timeout"
                );
                false
            }
        };
        if !clean {
            self.write_state(&device.id, DeviceState::Stopped).await;
        }
        info!(
            target: "ems.supervisor",
            device_id = %device.id,
            instance_id = %instance_id,
            "poller_stopped_by_supervisor"
        );
    }

    /// 写入状态，保留累计连接次数；状态未变化时跳过。
    async fn write_state(&self, device_id: &str, state: DeviceState) {
        let previous = match self.sink.status(device_id).await {
            Ok(previous) => previous,
            Err(err) => {
                warn!(target: "ems.supervisor", device_id, error = %err, "status_read_failed");
                None
            }
        };
        if previous.as_ref().is_some_and(|status| status.state == state) {
            return;
        }
        let mut status = DeviceStatus::new(device_id, state, now_epoch_ms());
        status.connection_count = previous.map_or(0, |status| status.connection_count);
        if let Err(err) = self.sink.update_status(&status).await {
            warn!(target: "ems.supervisor", device_id, error = %err, "status_write_failed");
        }
    }
}

fn reject(report: &mut ApplyReport, device_id: &str, reason: String) {
    warn!(
        target: "ems.supervisor",
        device_id,
        reason = %reason,
        "device_rejected"
    );
    report.rejected.push(RejectedDevice {
        device_id: device_id.to_string(),
        reason,
    });
}
