//! Modbus TCP / RTU 会话。
//!
//! 两种链路共用 [`ModbusSession`] 的读取逻辑：
//!
//! ```text
//! tags ──▶ plan_requests（按功能码合并连续地址）──▶ 每个请求：超时 + 重试
//!                                                   │
//!                                                   ├── 成功：按偏移切出每个点位的寄存器/位
//!                                                   ├── 异常码/超时：仅成员点位 Bad
//!                                                   └── 传输中断：整批作废（会话级错误）
//! ```
//!
//! 地址原样下发（不做 1 基 → 0 基换算）。

mod plan;
mod session;
mod transport;

pub use plan::{FunctionCode, MAX_READ_BITS, MAX_READ_REGISTERS, ReadRequest, plan_requests};
pub use session::{ModbusRtuSession, ModbusSession, ModbusTcpSession};
pub use transport::{ModbusTransport, RtuTransport, TcpTransport};
