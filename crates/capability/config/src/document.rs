//! 设备集 JSON 文档。
//!
//! ```json
//! {
//!   "schedule_groups": [{ "id": "fast", "name": "Fast", "polling_interval_ms": 200 }],
//!   "devices": [{
//!     "id": "plc-1",
//!     "name": "Line PLC",
//!     "protocol": { "type": "modbus_tcp", "host": "192.168.1.10", "port": 502, "slave_id": 1 },
//!     "tags": [{ "name": "temperature", "address": 100, "data_type": "int16",
//!                "scaling_multiplier": 0.1, "schedule_group_id": "fast" }]
//!   }]
//! }
//! ```
//!
//! 缺省字段在此补齐；显式给出的 `size` 原样保留，由设备校验拒绝不一致的值。

use crate::ConfigError;
use domain::{DataType, Device, ProtocolConfig, ScheduleGroup, Tag, now_epoch_ms};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

fn default_true() -> bool {
    true
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_polling_interval_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retry_count() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleGroupDocument {
    pub id: String,
    pub name: String,
    pub polling_interval_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagDocument {
    pub name: String,
    pub address: u16,
    /// 缺省为数据类型宽度
    #[serde(default)]
    pub size: Option<u16>,
    pub data_type: DataType,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_multiplier")]
    pub scaling_multiplier: f64,
    #[serde(default)]
    pub scaling_offset: f64,
    #[serde(default = "default_true")]
    pub read_only: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub schedule_group_id: Option<String>,
    #[serde(default)]
    pub aggregation_field: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub tags: Vec<TagDocument>,
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

/// 设备集文档。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSetDocument {
    #[serde(default)]
    pub schedule_groups: Vec<ScheduleGroupDocument>,
    #[serde(default)]
    pub devices: Vec<DeviceDocument>,
}

impl TagDocument {
    fn into_tag(self) -> Tag {
        Tag {
            name: self.name,
            address: self.address,
            size: self.size.unwrap_or_else(|| self.data_type.register_width()),
            data_type: self.data_type,
            unit: self.unit,
            scaling_multiplier: self.scaling_multiplier,
            scaling_offset: self.scaling_offset,
            read_only: self.read_only,
            enabled: self.enabled,
            schedule_group_id: self.schedule_group_id,
            aggregation_field: self.aggregation_field,
            description: self.description,
        }
    }
}

impl DeviceDocument {
    fn into_device(self, now_ms: i64) -> Device {
        Device {
            id: self.id,
            name: self.name,
            serial_number: self.serial_number,
            model_id: self.model_id,
            enabled: self.enabled,
            protocol: self.protocol,
            tags: self.tags.into_iter().map(TagDocument::into_tag).collect(),
            polling_interval_ms: self.polling_interval_ms,
            timeout_ms: self.timeout_ms,
            retry_count: self.retry_count,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

impl DeviceSetDocument {
    /// 解析 JSON；未知协议类型、未知字段、类型错误均为错误。
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Document(err.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.display().to_string(), err.to_string()))?;
        Self::from_json(&text)
    }

    /// 转换为领域类型。
    ///
    /// 调度组在此校验；设备 id 不得重复。设备本身的校验留给监督器，
    /// 以便单台设备配置错误时只拒绝该设备。
    pub fn into_parts(self) -> Result<(Vec<ScheduleGroup>, Vec<Device>), ConfigError> {
        let now_ms = now_epoch_ms();

        let mut groups = Vec::with_capacity(self.schedule_groups.len());
        let mut group_ids = HashSet::new();
        for item in self.schedule_groups {
            if !group_ids.insert(item.id.clone()) {
                return Err(ConfigError::Document(format!(
                    "duplicate schedule group id: {}",
                    item.id
                )));
            }
            let group = ScheduleGroup {
                id: item.id,
                name: item.name,
                polling_interval_ms: item.polling_interval_ms,
                enabled: item.enabled,
                description: item.description,
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
            };
            group.validate()?;
            groups.push(group);
        }

        let mut devices = Vec::with_capacity(self.devices.len());
        let mut device_ids = HashSet::new();
        for item in self.devices {
            if !device_ids.insert(item.id.clone()) {
                return Err(ConfigError::Document(format!(
                    "duplicate device id: {}",
                    item.id
                )));
            }
            devices.push(item.into_device(now_ms));
        }
        Ok((groups, devices))
    }
}
