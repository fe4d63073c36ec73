//! 协议错误类型定义

use std::io;

/// 会话级错误：连接失败或传输层中断，整批读取作废。
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// 连接被拒绝、不可达或握手失败
    #[error("connection error: {0}")]
    Connection(String),

    /// 连接超时
    #[error("connect timed out after {0} ms")]
    ConnectTimeout(u64),

    /// 传输层中断（对端关闭、连接重置等）
    #[error("transport down: {0}")]
    TransportDown(String),

    /// 未连接时调用读取
    #[error("session not connected")]
    NotConnected,

    /// 协议参数与会话类型不符
    #[error("config error: {0}")]
    Config(String),
}

/// 单个点位的读取错误，仅影响该点位质量（Bad）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// 所有尝试均超时
    #[error("timed out after {attempts} attempt(s) of {timeout_ms} ms")]
    Timeout { attempts: u32, timeout_ms: u64 },

    /// 从站返回异常码
    #[error("modbus exception: 0x{0:02X}")]
    Exception(u8),

    /// 协议/帧错误
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 响应长度不足以覆盖点位
    #[error("short response")]
    ShortResponse,

    /// 总召唤未上报该信息对象地址
    #[error("no data reported")]
    NoData,

    /// 点位带无效（IV）品质标志
    #[error("invalid quality")]
    InvalidQuality,

    /// 数据类型无法通过该协议读取
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// 判断 IO 错误是否意味着传输层已中断。
pub(crate) fn is_transport_down(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
