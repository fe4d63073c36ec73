//! 设备型号与点位模板（只读目录，仅用于新建设备时预填点位）。

use crate::tag::{DataType, Tag};
use serde::{Deserialize, Serialize};

/// 设备型号。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceModel {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    /// 协议类型（modbus_tcp / modbus_rtu / iec104 / any）
    pub protocol_type: String,
}

/// 点位模板：与 Tag 字段一致，但不绑定设备。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagTemplate {
    pub model_id: String,
    pub name: String,
    pub address: u16,
    pub data_type: DataType,
    pub description: Option<String>,
    pub scaling_multiplier: f64,
    pub scaling_offset: f64,
    pub unit: Option<String>,
    pub read_only: bool,
}

impl TagTemplate {
    /// 按模板生成设备点位（宽度由数据类型决定，默认启用、不分组）。
    pub fn to_tag(&self) -> Tag {
        Tag {
            name: self.name.clone(),
            address: self.address,
            size: self.data_type.register_width(),
            data_type: self.data_type,
            unit: self.unit.clone(),
            scaling_multiplier: self.scaling_multiplier,
            scaling_offset: self.scaling_offset,
            read_only: self.read_only,
            enabled: true,
            schedule_group_id: None,
            aggregation_field: None,
            description: self.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_produces_valid_tag() {
        let template = TagTemplate {
            model_id: "m".to_string(),
            name: "flow_rate".to_string(),
            address: 400,
            data_type: DataType::Uint32,
            description: None,
            scaling_multiplier: 0.1,
            scaling_offset: 0.0,
            unit: Some("L/min".to_string()),
            read_only: false,
        };
        let tag = template.to_tag();
        assert_eq!(tag.size, 2);
        assert!(tag.enabled);
        tag.validate("dev").unwrap();
    }
}
