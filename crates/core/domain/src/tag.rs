//! 点位（Tag）与数据类型。

use crate::validation::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 点位数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 线圈（FC01）
    Coil,
    /// 离散输入（FC02）
    DiscreteInput,
    /// 保持寄存器，16 位无符号（FC03）
    HoldingRegister,
    /// 输入寄存器，16 位无符号（FC04）
    InputRegister,
    Uint16,
    Int16,
    /// 32 位无符号（2 个寄存器）
    Uint32,
    /// 32 位有符号（2 个寄存器）
    Int32,
    /// 32 位浮点（2 个寄存器）
    Float32,
}

impl DataType {
    pub const ALL: [DataType; 9] = [
        DataType::Coil,
        DataType::DiscreteInput,
        DataType::HoldingRegister,
        DataType::InputRegister,
        DataType::Uint16,
        DataType::Int16,
        DataType::Uint32,
        DataType::Int32,
        DataType::Float32,
    ];

    /// 数据类型占用的寄存器数量。
    pub fn register_width(self) -> u16 {
        match self {
            Self::Uint32 | Self::Int32 | Self::Float32 => 2,
            _ => 1,
        }
    }

    /// 是否为开关量（不参与缩放）。
    pub fn is_bool(self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coil => "coil",
            Self::DiscreteInput => "discrete_input",
            Self::HoldingRegister => "holding_register",
            Self::InputRegister => "input_register",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|item| item.as_str() == s)
            .ok_or_else(|| format!("unknown data type: {}", s))
    }
}

/// 点位配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// 设备内唯一
    pub name: String,
    /// 寄存器地址或 IEC 104 信息对象地址（IOA）
    pub address: u16,
    /// 寄存器数量，必须与数据类型宽度一致
    pub size: u16,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub scaling_multiplier: f64,
    pub scaling_offset: f64,
    pub read_only: bool,
    pub enabled: bool,
    /// 为空时使用设备级轮询间隔
    pub schedule_group_id: Option<String>,
    /// 云端聚合字段（下游映射用）
    pub aggregation_field: Option<String>,
    pub description: Option<String>,
}

impl Tag {
    /// 以默认缩放（×1 +0）构造启用的只读点位。
    pub fn new(name: impl Into<String>, address: u16, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            address,
            size: data_type.register_width(),
            data_type,
            unit: None,
            scaling_multiplier: 1.0,
            scaling_offset: 0.0,
            read_only: true,
            enabled: true,
            schedule_group_id: None,
            aggregation_field: None,
            description: None,
        }
    }

    pub fn with_scaling(mut self, multiplier: f64, offset: f64) -> Self {
        self.scaling_multiplier = multiplier;
        self.scaling_offset = offset;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_schedule_group(mut self, group_id: impl Into<String>) -> Self {
        self.schedule_group_id = Some(group_id.into());
        self
    }

    /// 最后一个寄存器地址。
    pub fn end_address(&self) -> u32 {
        self.address as u32 + self.size.max(1) as u32 - 1
    }

    /// 保存期校验：地址、宽度、缩放参数。
    pub fn validate(&self, device_id: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Tag {
            device_id: device_id.to_string(),
            tag: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is required".to_string()));
        }
        if self.address == 0 {
            return Err(invalid("address must be within 1-65535".to_string()));
        }
        if !(1..=4).contains(&self.size) {
            return Err(invalid(format!("size {} must be within 1-4", self.size)));
        }
        let width = self.data_type.register_width();
        if self.size != width {
            return Err(invalid(format!(
                "size {} does not match {} (expected {})",
                self.size, self.data_type, width
            )));
        }
        if self.end_address() > u16::MAX as u32 {
            return Err(invalid("address range exceeds 65535".to_string()));
        }
        if !self.scaling_multiplier.is_finite() || !self.scaling_offset.is_finite() {
            return Err(invalid("scaling must be finite".to_string()));
        }
        if let Some(group_id) = &self.schedule_group_id {
            if group_id.trim().is_empty() {
                return Err(invalid("schedule_group_id must not be blank".to_string()));
            }
        }
        Ok(())
    }
}
