//! 日志记录、质量标志与设备状态。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 读取质量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    Good,
    Bad,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Bad => "Bad",
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Good" => Ok(Self::Good),
            "Bad" => Ok(Self::Bad),
            other => Err(format!("unknown quality: {}", other)),
        }
    }
}

/// 工程值：开关量或数值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineeringValue {
    Bool(bool),
    Number(f64),
}

impl EngineeringValue {
    /// 数值视图（开关量按 0/1）。
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Number(v) => v,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(v),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for EngineeringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Number(v) => write!(f, "{}", v),
        }
    }
}

/// 已解码的测量记录，写入后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub device_id: String,
    pub tag_name: String,
    /// Bad 质量时为空
    pub value: Option<EngineeringValue>,
    pub quality: Quality,
    pub unit: Option<String>,
    /// UTC 毫秒时间戳
    pub ts_ms: i64,
}

impl LogEntry {
    pub fn good(
        device_id: impl Into<String>,
        tag_name: impl Into<String>,
        value: EngineeringValue,
        unit: Option<String>,
        ts_ms: i64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            tag_name: tag_name.into(),
            value: Some(value),
            quality: Quality::Good,
            unit,
            ts_ms,
        }
    }

    pub fn bad(
        device_id: impl Into<String>,
        tag_name: impl Into<String>,
        unit: Option<String>,
        ts_ms: i64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            tag_name: tag_name.into(),
            value: None,
            quality: Quality::Bad,
            unit,
            ts_ms,
        }
    }
}

/// 设备轮询状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Disabled,
    Connecting,
    Connected,
    Reading,
    Error,
    Stopped,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reading => "Reading",
            Self::Error => "Error",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Disabled" => Ok(Self::Disabled),
            "Connecting" => Ok(Self::Connecting),
            "Connected" => Ok(Self::Connected),
            "Reading" => Ok(Self::Reading),
            "Error" => Ok(Self::Error),
            "Stopped" => Ok(Self::Stopped),
            other => Err(format!("unknown device state: {}", other)),
        }
    }
}

/// 设备状态：每台设备一行，原地覆盖。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub state: DeviceState,
    pub last_update_ms: i64,
    pub error_message: Option<String>,
    /// 累计成功连接次数
    pub connection_count: u64,
}

impl DeviceStatus {
    pub fn new(device_id: impl Into<String>, state: DeviceState, ts_ms: i64) -> Self {
        Self {
            device_id: device_id.into(),
            state,
            last_update_ms: ts_ms,
            error_message: None,
            connection_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engineering_value_serializes_untagged() {
        let number = serde_json::to_string(&EngineeringValue::Number(40.0)).unwrap();
        assert_eq!(number, "40.0");
        let flag: EngineeringValue = serde_json::from_str("true").unwrap();
        assert_eq!(flag, EngineeringValue::Bool(true));
        assert_eq!(flag.as_f64(), 1.0);
    }

    #[test]
    fn state_names_parse_back() {
        for state in [
            DeviceState::Disabled,
            DeviceState::Connecting,
            DeviceState::Connected,
            DeviceState::Reading,
            DeviceState::Error,
            DeviceState::Stopped,
        ] {
            assert_eq!(state.as_str().parse::<DeviceState>().unwrap(), state);
        }
        assert_eq!("Bad".parse::<Quality>().unwrap(), Quality::Bad);
    }
}
