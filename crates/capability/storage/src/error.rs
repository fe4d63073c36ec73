//! 存储层错误类型
//!
//! 日志表与状态表的所有后端（内存、SQLite）共用同一错误类型，
//! 上层只需区分“后端不可用”与“数据本身有问题”。

/// 存储操作失败的原因。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// 连接池关闭、获取连接超时或 IO 失败
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// SQL 执行失败
    #[error("database error: {0}")]
    Database(String),
    /// 行数据无法还原为日志记录或设备状态
    #[error("corrupt row: {0}")]
    CorruptRow(String),
    /// 内存表锁已中毒
    #[error("{0} store lock poisoned")]
    LockPoisoned(&'static str),
    #[error("unknown device model: {0}")]
    UnknownModel(String),
}

impl StorageError {
    /// 后端暂时不可用，稍后重试可能成功
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_) => Self::CorruptRow(err.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}
