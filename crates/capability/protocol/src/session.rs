//! 协议会话抽象。

use crate::error::{ReadError, SessionError};
use async_trait::async_trait;
use domain::{Device, Tag};
use ems_normalize::RawValue;
use std::time::Duration;

/// 单批读取结果：与请求的点位一一对应。
pub type BatchResult = Vec<Result<RawValue, ReadError>>;

/// 会话参数（来自设备配置）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// 单次请求/连接超时
    pub timeout: Duration,
    /// 每个请求的最大尝试次数（至少 1）
    pub attempts: u32,
}

impl SessionOptions {
    pub fn from_device(device: &Device) -> Self {
        Self {
            timeout: Duration::from_millis(device.timeout_ms),
            attempts: device.attempts(),
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// 协议会话：每台设备一个物理/逻辑连接。
///
/// 读取在会话内串行；调用方保证同一时刻只有一个请求在途。
#[async_trait]
pub trait ProtocolSession: Send {
    /// 协议类型标识（modbus_tcp / modbus_rtu / iec104）。
    fn protocol(&self) -> &'static str;

    /// 建立传输连接（单次尝试，受超时约束）。
    async fn connect(&mut self) -> Result<(), SessionError>;

    /// 批量读取点位；传输中断时返回会话级错误。
    async fn read_batch(&mut self, tags: &[Tag]) -> Result<BatchResult, SessionError>;

    /// 断开连接（幂等）。
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}
