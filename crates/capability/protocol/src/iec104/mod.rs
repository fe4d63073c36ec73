//! IEC 60870-5-104 客户端会话。
//!
//! ```text
//! connect:    TCP ──▶ STARTDT act ──▶ 等待 STARTDT con
//! read_batch: C_IC_NA_1(激活) ──▶ 收集监视 ASDU ──▶ 激活终止(COT 10) 或超时
//!             └─ 期间应答 TESTFR act，每 8 个 I 帧回 S 帧确认
//! disconnect: STOPDT act（尽力而为）
//! ```
//!
//! 点位地址即信息对象地址（IOA）；未上报的点位为 `ReadError::NoData`，
//! 带 IV 标志的点位为 `ReadError::InvalidQuality`。CP56Time2a 时标不使用，
//! 记录时间取本地采集时间。

pub mod codec;
mod session;

pub use session::{Iec104Config, Iec104Session};
