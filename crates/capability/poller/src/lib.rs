//! # 设备轮询能力模块
//!
//! 每台启用的设备一个轮询器（tokio 任务），监督器负责对账与生命周期。
//!
//! ```text
//! PollerSupervisor::apply_device_set(devices)
//!       │  SessionFactory::create(device)
//!       ▼
//! DevicePoller ──connect──▶ ProtocolSession
//!       │  调度组定时器 ──▶ 单一读取循环 ──▶ read_batch
//!       │
//!       ├── decode ──▶ LogEntry(Good/Bad) ──▶ LogSink::append
//!       └── DeviceStatus ──▶ LogSink::update_status
//! ```
//!
//! ## 失败处理
//!
//! - 连接：每次尝试受 timeout_ms 约束，共 retry_count 次；全部失败后状态 Error，
//!   按指数退避重连。
//! - 读取：单个点位失败只影响该点位（Bad）；传输中断或整批失败触发重连。
//! - 看门狗：轮询器任务意外结束（例如 panic）时由监督器重启。

mod config;
mod error;
mod poller;
mod supervisor;

pub use config::{PollerConfig, ReconnectBackoff};
pub use error::SupervisorError;
pub use supervisor::{ApplyReport, PollerSupervisor, RejectedDevice};
