//! 内置设备型号目录
//!
//! 只读：仅用于新建设备时按型号预填点位。

use crate::error::StorageError;
use domain::{DataType, DeviceModel, Tag, TagTemplate};

/// 设备型号与点位模板目录
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    models: Vec<DeviceModel>,
    templates: Vec<TagTemplate>,
}

fn model(id: &str, name: &str, description: &str, manufacturer: &str, protocol: &str) -> DeviceModel {
    DeviceModel {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        manufacturer: Some(manufacturer.to_string()),
        protocol_type: protocol.to_string(),
    }
}

impl ModelCatalog {
    pub fn new(models: Vec<DeviceModel>, templates: Vec<TagTemplate>) -> Self {
        Self { models, templates }
    }

    /// 内置目录：custom、sungrow_1（7 个点位）、iec104_rtu
    pub fn builtin() -> Self {
        let models = vec![
            model(
                "custom",
                "Custom Device",
                "Generic device model without predefined tags",
                "Various",
                "any",
            ),
            model(
                "sungrow_1",
                "Sungrow Inverter",
                "Sungrow Solar Inverter",
                "Sungrow",
                "modbus_tcp",
            ),
            model(
                "iec104_rtu",
                "IEC 104 RTU",
                "Generic IEC 60870-5-104 Remote Terminal Unit",
                "Various",
                "iec104",
            ),
        ];

        let sungrow: [(&str, u16, DataType, &str, f64, Option<&str>); 7] = [
            ("system_status", 1, DataType::Uint16, "System status register", 1.0, None),
            ("production_count", 100, DataType::Uint32, "Production counter", 1.0, Some("units")),
            ("temperature_1", 200, DataType::Int16, "Temperature sensor 1", 0.1, Some("°C")),
            ("temperature_2", 201, DataType::Int16, "Temperature sensor 2", 0.1, Some("°C")),
            ("pressure_1", 300, DataType::Uint16, "Pressure sensor 1", 0.01, Some("bar")),
            ("flow_rate", 400, DataType::Uint32, "Flow rate measurement", 0.1, Some("L/min")),
            ("alarm_status", 500, DataType::Uint16, "Alarm status register", 1.0, None),
        ];
        let templates = sungrow
            .into_iter()
            .map(
                |(name, address, data_type, description, multiplier, unit)| TagTemplate {
                    model_id: "sungrow_1".to_string(),
                    name: name.to_string(),
                    address,
                    data_type,
                    description: Some(description.to_string()),
                    scaling_multiplier: multiplier,
                    scaling_offset: 0.0,
                    unit: unit.map(str::to_string),
                    read_only: false,
                },
            )
            .collect();

        Self { models, templates }
    }

    pub fn models(&self) -> &[DeviceModel] {
        &self.models
    }

    pub fn model(&self, model_id: &str) -> Option<&DeviceModel> {
        self.models.iter().find(|model| model.id == model_id)
    }

    /// 型号的点位模板，按地址排序
    pub fn templates(&self, model_id: &str) -> Vec<&TagTemplate> {
        let mut templates: Vec<&TagTemplate> = self
            .templates
            .iter()
            .filter(|template| template.model_id == model_id)
            .collect();
        templates.sort_by_key(|template| template.address);
        templates
    }

    /// 按型号模板生成设备点位；未知型号返回错误
    pub fn instantiate_tags(&self, model_id: &str) -> Result<Vec<Tag>, StorageError> {
        if self.model(model_id).is_none() {
            return Err(StorageError::UnknownModel(model_id.to_string()));
        }
        Ok(self
            .templates(model_id)
            .into_iter()
            .map(TagTemplate::to_tag)
            .collect())
    }
}
