//! 会话工厂：按协议配置创建会话（协议为封闭集合）。

use crate::error::SessionError;
use crate::iec104::{Iec104Config, Iec104Session};
use crate::modbus::{ModbusRtuSession, ModbusTcpSession, RtuTransport, TcpTransport};
use crate::session::{ProtocolSession, SessionOptions};
use domain::{Device, IEC104_GLOBAL_COMMON_ADDRESS, ProtocolConfig};

/// 会话工厂抽象（轮询器通过它获取会话，测试可注入脚本会话）。
pub trait SessionFactory: Send + Sync {
    fn create(&self, device: &Device) -> Result<Box<dyn ProtocolSession>, SessionError>;
}

/// 默认工厂：Modbus TCP / Modbus RTU / IEC 104。
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSessionFactory;

impl SessionFactory for DefaultSessionFactory {
    fn create(&self, device: &Device) -> Result<Box<dyn ProtocolSession>, SessionError> {
        device
            .protocol
            .validate(&device.id)
            .map_err(|e| SessionError::Config(e.to_string()))?;
        let options = SessionOptions::from_device(device);

        let session: Box<dyn ProtocolSession> = match &device.protocol {
            ProtocolConfig::ModbusTcp {
                host,
                port,
                slave_id,
            } => Box::new(ModbusTcpSession::new(
                TcpTransport {
                    host: host.clone(),
                    port: *port,
                    slave_id: *slave_id,
                },
                options,
            )),
            ProtocolConfig::ModbusRtu {
                port,
                baud_rate,
                slave_id,
                data_bits,
                stop_bits,
                parity,
            } => Box::new(ModbusRtuSession::new(
                RtuTransport {
                    path: port.clone(),
                    baud_rate: *baud_rate,
                    slave_id: *slave_id,
                    data_bits: *data_bits,
                    stop_bits: *stop_bits,
                    parity: *parity,
                    timeout: options.timeout,
                },
                options,
            )),
            ProtocolConfig::Iec104 {
                host,
                port,
                common_address,
            } => Box::new(Iec104Session::new(
                Iec104Config {
                    host: host.clone(),
                    port: *port,
                    common_address: common_address.unwrap_or(IEC104_GLOBAL_COMMON_ADDRESS),
                },
                options,
            )),
        };
        Ok(session)
    }
}
