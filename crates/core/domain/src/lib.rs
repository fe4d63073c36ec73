//! 采集核心的共享领域模型。
//!
//! - [`device`]：设备与协议配置（tagged union）
//! - [`tag`]：点位（Tag）与数据类型
//! - [`schedule`]：调度分组
//! - [`catalog`]：设备型号与点位模板（只读目录）
//! - [`log`]：日志记录、质量标志与设备状态
//! - [`validation`]：保存期校验错误

pub mod catalog;
pub mod device;
pub mod log;
pub mod schedule;
pub mod tag;
pub mod validation;

pub use catalog::{DeviceModel, TagTemplate};
pub use device::{
    Device, IEC104_GLOBAL_COMMON_ADDRESS, Parity, ProtocolConfig, SUPPORTED_BAUD_RATES,
};
pub use log::{DeviceState, DeviceStatus, EngineeringValue, LogEntry, Quality};
pub use schedule::{MIN_POLLING_INTERVAL_MS, ScheduleGroup};
pub use tag::{DataType, Tag};
pub use validation::ConfigError;

/// 获取当前时间戳（毫秒，UTC）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
