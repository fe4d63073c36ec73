//! 监督器错误类型

use ems_pipeline::SinkError;
use ems_schedule::ScheduleError;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error(transparent)]
    InvalidDevice(#[from] domain::ConfigError),

    /// 会话工厂拒绝创建会话
    #[error("session error: {0}")]
    Session(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
