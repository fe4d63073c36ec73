//! # 协议会话能力模块
//!
//! 每台设备一个会话，支持：
//! - **Modbus TCP**：读取从站线圈、离散输入、寄存器
//! - **Modbus RTU**：同上，经串口链路
//! - **IEC 60870-5-104**：总召唤采集监视方向信息对象
//!
//! ## 架构设计
//!
//! ```text
//! Device.protocol (ProtocolConfig)
//!       │
//!       ▼
//! SessionFactory ──▶ Box<dyn ProtocolSession>
//!                         │
//!                         ├── ModbusTcpSession
//!                         ├── ModbusRtuSession
//!                         └── Iec104Session
//!       │
//!       ▼
//! read_batch(tags) ──▶ Vec<Result<RawValue, ReadError>>
//! ```
//!
//! ## 错误分层
//!
//! - [`SessionError`]：连接失败或传输中断，整批作废，轮询器进入 Error 并重连。
//! - [`ReadError`]：单个点位失败（超时、异常码、无数据、无效品质），仅该点位 Bad。

mod error;
mod factory;
pub mod iec104;
pub mod modbus;
mod session;

pub use error::{ReadError, SessionError};
pub use factory::{DefaultSessionFactory, SessionFactory};
pub use iec104::{Iec104Config, Iec104Session};
pub use modbus::{ModbusRtuSession, ModbusSession, ModbusTcpSession, RtuTransport, TcpTransport};
pub use session::{BatchResult, ProtocolSession, SessionOptions};
