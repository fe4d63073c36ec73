//! 保存期校验错误。
//!
//! 配置错误在校验阶段即为致命错误：对应设备不会启动。

/// 配置校验错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("device {device_id}: {reason}")]
    Device { device_id: String, reason: String },

    #[error("device {device_id}: invalid protocol config: {reason}")]
    Protocol { device_id: String, reason: String },

    #[error("device {device_id} tag {tag}: {reason}")]
    Tag {
        device_id: String,
        tag: String,
        reason: String,
    },

    #[error("schedule group {group_id}: {reason}")]
    ScheduleGroup { group_id: String, reason: String },

    /// 无法解析的配置文档（如未知协议类型）
    #[error("config parse error: {0}")]
    Parse(String),
}
