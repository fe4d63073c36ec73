//! Modbus 链路建立：TCP 套接字或串口。

use crate::error::SessionError;
use async_trait::async_trait;
use domain::Parity;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tokio_serial::SerialStream;

/// 建立 Modbus 客户端上下文的链路。
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    fn protocol(&self) -> &'static str;

    fn endpoint(&self) -> String;

    /// 打开链路并绑定从站。
    async fn open(&self) -> Result<Context, SessionError>;
}

/// Modbus TCP 链路
#[derive(Debug, Clone)]
pub struct TcpTransport {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    fn protocol(&self) -> &'static str {
        "modbus_tcp"
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn open(&self) -> Result<Context, SessionError> {
        let addr = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| SessionError::Connection(format!("resolve {}: {}", self.endpoint(), e)))?
            .next()
            .ok_or_else(|| {
                SessionError::Connection(format!("no address for {}", self.endpoint()))
            })?;

        let mut ctx = tcp::connect(addr)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        ctx.set_slave(Slave(self.slave_id));
        Ok(ctx)
    }
}

/// Modbus RTU 串口链路
#[derive(Debug, Clone)]
pub struct RtuTransport {
    pub path: String,
    pub baud_rate: u32,
    pub slave_id: u8,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub timeout: Duration,
}

#[async_trait]
impl ModbusTransport for RtuTransport {
    fn protocol(&self) -> &'static str {
        "modbus_rtu"
    }

    fn endpoint(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }

    async fn open(&self) -> Result<Context, SessionError> {
        let data_bits = match self.data_bits {
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let stop_bits = match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };
        let parity = match self.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        };

        let builder = tokio_serial::new(&self.path, self.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(self.timeout);
        let port = SerialStream::open(&builder)
            .map_err(|e| SessionError::Connection(format!("open {}: {}", self.path, e)))?;

        Ok(rtu::attach_slave(port, Slave(self.slave_id)))
    }
}
