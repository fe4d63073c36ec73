//! 调度分组：跨设备共享的轮询频率。

use crate::validation::ConfigError;
use serde::{Deserialize, Serialize};

/// 调度分组允许的最小轮询间隔（毫秒）。
pub const MIN_POLLING_INTERVAL_MS: u64 = 10;

/// 调度分组。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleGroup {
    pub id: String,
    pub name: String,
    pub polling_interval_ms: u64,
    pub enabled: bool,
    pub description: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl ScheduleGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>, polling_interval_ms: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            polling_interval_ms,
            enabled: true,
            description: None,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::ScheduleGroup {
            group_id: self.id.clone(),
            reason,
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id is required".to_string()));
        }
        if self.polling_interval_ms < MIN_POLLING_INTERVAL_MS {
            return Err(invalid(format!(
                "polling_interval_ms {} is below {}",
                self.polling_interval_ms, MIN_POLLING_INTERVAL_MS
            )));
        }
        Ok(())
    }

    /// 内置分组：high_freq / medium_freq / low_freq / energy_monitor。
    pub fn defaults() -> Vec<ScheduleGroup> {
        let describe = |mut group: ScheduleGroup, text: &str| {
            group.description = Some(text.to_string());
            group
        };
        vec![
            describe(
                ScheduleGroup::new("high_freq", "High Frequency", 100),
                "High frequency polling for critical measurements",
            ),
            describe(
                ScheduleGroup::new("medium_freq", "Medium Frequency", 1000),
                "Standard polling frequency for most measurements",
            ),
            describe(
                ScheduleGroup::new("low_freq", "Low Frequency", 5000),
                "Low frequency polling for status and configuration data",
            ),
            describe(
                ScheduleGroup::new("energy_monitor", "Energy Monitoring", 30000),
                "Energy and power monitoring with 30 second intervals",
            ),
        ]
    }
}
