//! 设备与协议配置。

use crate::tag::Tag;
use crate::validation::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Modbus RTU 允许的波特率。
pub const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// IEC 104 全局公共地址（总召唤默认目标）。
pub const IEC104_GLOBAL_COMMON_ADDRESS: u16 = 0xFFFF;

/// 串口校验位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// 协议配置（按 `type` 区分）。
///
/// ```json
/// { "type": "modbus_tcp", "host": "192.168.1.100", "port": 502, "slave_id": 1 }
/// { "type": "modbus_rtu", "port": "/dev/ttyUSB0", "baud_rate": 9600, "slave_id": 1 }
/// { "type": "iec104", "host": "10.0.0.5", "port": 2404 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolConfig {
    ModbusTcp {
        host: String,
        port: u16,
        slave_id: u8,
    },
    ModbusRtu {
        /// 串口路径（如 /dev/ttyUSB0、COM3）
        port: String,
        baud_rate: u32,
        slave_id: u8,
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
        #[serde(default)]
        parity: Parity,
    },
    Iec104 {
        host: String,
        port: u16,
        /// 总召唤使用的公共地址，缺省为全局地址 0xFFFF
        #[serde(default)]
        common_address: Option<u16>,
    },
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

impl ProtocolConfig {
    /// 协议类型标识（与 `type` 字段一致）。
    pub fn protocol_type(&self) -> &'static str {
        match self {
            Self::ModbusTcp { .. } => "modbus_tcp",
            Self::ModbusRtu { .. } => "modbus_rtu",
            Self::Iec104 { .. } => "iec104",
        }
    }

    /// 可读的端点描述，用于日志。
    pub fn endpoint(&self) -> String {
        match self {
            Self::ModbusTcp { host, port, .. } | Self::Iec104 { host, port, .. } => {
                format!("{}:{}", host, port)
            }
            Self::ModbusRtu {
                port, baud_rate, ..
            } => format!("{}@{}", port, baud_rate),
        }
    }

    /// 校验协议参数的语法合法性。
    pub fn validate(&self, device_id: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Protocol {
            device_id: device_id.to_string(),
            reason,
        };
        match self {
            Self::ModbusTcp {
                host,
                port,
                slave_id,
            } => {
                if host.trim().is_empty() {
                    return Err(invalid("host is required".to_string()));
                }
                if *port == 0 {
                    return Err(invalid("port must be within 1-65535".to_string()));
                }
                if *slave_id == 0 {
                    return Err(invalid("slave_id must be within 1-255".to_string()));
                }
            }
            Self::ModbusRtu {
                port,
                baud_rate,
                slave_id,
                data_bits,
                stop_bits,
                ..
            } => {
                if port.trim().is_empty() {
                    return Err(invalid("serial port is required".to_string()));
                }
                if !SUPPORTED_BAUD_RATES.contains(baud_rate) {
                    return Err(invalid(format!("unsupported baud rate {}", baud_rate)));
                }
                if *slave_id == 0 {
                    return Err(invalid("slave_id must be within 1-255".to_string()));
                }
                if !matches!(data_bits, 7 | 8) {
                    return Err(invalid(format!("unsupported data bits {}", data_bits)));
                }
                if !matches!(stop_bits, 1 | 2) {
                    return Err(invalid(format!("unsupported stop bits {}", stop_bits)));
                }
            }
            Self::Iec104 { host, port, .. } => {
                if host.trim().is_empty() {
                    return Err(invalid("host is required".to_string()));
                }
                if *port == 0 {
                    return Err(invalid("port must be within 1-65535".to_string()));
                }
            }
        }
        Ok(())
    }
}

/// 设备配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub serial_number: Option<String>,
    pub model_id: Option<String>,
    pub enabled: bool,
    pub protocol: ProtocolConfig,
    pub tags: Vec<Tag>,
    /// 未分组点位的轮询间隔（毫秒）
    pub polling_interval_ms: u64,
    /// 单次请求超时（毫秒）
    pub timeout_ms: u64,
    /// 每次连接/请求的最大尝试次数
    pub retry_count: u32,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Device {
    /// 保存期校验。
    ///
    /// 点位总是校验；协议参数仅在设备启用时要求合法。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Device {
            device_id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id is required"));
        }
        if self.polling_interval_ms == 0 {
            return Err(invalid("polling_interval_ms must be positive"));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be positive"));
        }
        if self.enabled {
            self.protocol.validate(&self.id)?;
        }

        let mut names = HashSet::new();
        for tag in &self.tags {
            tag.validate(&self.id)?;
            if !names.insert(tag.name.as_str()) {
                return Err(ConfigError::Tag {
                    device_id: self.id.clone(),
                    tag: tag.name.clone(),
                    reason: "duplicate tag name".to_string(),
                });
            }
        }
        Ok(())
    }

    /// 连接与请求的有效尝试次数（至少 1 次）。
    pub fn attempts(&self) -> u32 {
        self.retry_count.max(1)
    }

    /// 启用状态的点位。
    pub fn enabled_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|tag| tag.enabled)
    }

    /// 运行期配置是否一致（忽略时间戳），用于判断是否需要重启轮询器。
    pub fn same_runtime_config(&self, other: &Device) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.enabled == other.enabled
            && self.protocol == other.protocol
            && self.tags == other.tags
            && self.polling_interval_ms == other.polling_interval_ms
            && self.timeout_ms == other.timeout_ms
            && self.retry_count == other.retry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::DataType;

    fn tcp_device() -> Device {
        Device {
            id: "dev-1".to_string(),
            name: "Inverter".to_string(),
            serial_number: None,
            model_id: None,
            enabled: true,
            protocol: ProtocolConfig::ModbusTcp {
                host: "192.168.1.100".to_string(),
                port: 502,
                slave_id: 1,
            },
            tags: vec![Tag::new("temperature", 1, DataType::HoldingRegister)],
            polling_interval_ms: 1000,
            timeout_ms: 5000,
            retry_count: 3,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn protocol_config_parses_tagged_union() {
        let json = r#"{"type": "modbus_rtu", "port": "/dev/ttyUSB0", "baud_rate": 9600, "slave_id": 2}"#;
        let config: ProtocolConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            ProtocolConfig::ModbusRtu {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600,
                slave_id: 2,
                data_bits: 8,
                stop_bits: 1,
                parity: Parity::None,
            }
        );
        assert_eq!(config.protocol_type(), "modbus_rtu");
    }

    #[test]
    fn unknown_protocol_type_is_rejected() {
        let json = r#"{"type": "bacnet", "host": "x", "port": 47808}"#;
        assert!(serde_json::from_str::<ProtocolConfig>(json).is_err());
    }

    #[test]
    fn enabled_device_requires_valid_protocol() {
        let mut device = tcp_device();
        device.protocol = ProtocolConfig::ModbusTcp {
            host: "".to_string(),
            port: 502,
            slave_id: 1,
        };
        assert!(matches!(
            device.validate(),
            Err(ConfigError::Protocol { .. })
        ));

        // 禁用设备允许暂存不完整的协议参数
        device.enabled = false;
        assert!(device.validate().is_ok());
    }

    #[test]
    fn rtu_baud_rate_must_be_supported() {
        let config = ProtocolConfig::ModbusRtu {
            port: "/dev/ttyS0".to_string(),
            baud_rate: 14400,
            slave_id: 1,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::Even,
        };
        assert!(config.validate("dev").is_err());
    }

    #[test]
    fn slave_id_zero_is_rejected() {
        let config = ProtocolConfig::ModbusTcp {
            host: "10.0.0.1".to_string(),
            port: 502,
            slave_id: 0,
        };
        assert!(config.validate("dev").is_err());
    }

    #[test]
    fn duplicate_tag_names_are_rejected() {
        let mut device = tcp_device();
        device
            .tags
            .push(Tag::new("temperature", 2, DataType::HoldingRegister));
        assert!(matches!(device.validate(), Err(ConfigError::Tag { .. })));
    }

    #[test]
    fn timestamps_do_not_affect_runtime_config() {
        let device = tcp_device();
        let mut touched = device.clone();
        touched.updated_at_ms = 99;
        assert!(device.same_runtime_config(&touched));
        touched.timeout_ms = 1000;
        assert!(!device.same_runtime_config(&touched));
    }
}
