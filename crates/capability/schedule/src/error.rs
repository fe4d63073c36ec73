//! 调度组错误类型定义

use domain::ConfigError;

/// 调度组操作错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule group not found: {0}")]
    NotFound(String),

    /// 分组禁用，不能用于新的点位分配
    #[error("schedule group {0} is disabled")]
    Disabled(String),

    /// 仍被点位引用，拒绝删除
    #[error("schedule group {group_id} is used by tag {tag} of device {device_id}")]
    InUse {
        group_id: String,
        device_id: String,
        tag: String,
    },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}
