//! # EMS Storage 模块
//!
//! 测量日志与设备状态的存储抽象层，支持两种后端。
//!
//! ## 模块说明
//!
//! - [`traits`]：`LogStore` / `StatusStore` 异步接口与查询、保留策略类型
//! - [`error`]：存储错误类型
//! - [`connection`]：SQLite 连接池与建表
//! - [`catalog`]：内置设备型号与点位模板目录
//! - `in_memory`：内存实现（`RwLock` 保护，用于测试与无持久化运行）
//! - `sqlite`：SQLite 实现（持久化，参数化 SQL，批量写入走事务）
//!
//! ## 语义
//!
//! - 日志只追加，唯一的删除来自保留清理
//! - 查询结果最新优先，同一时间戳按写入顺序倒序
//! - 设备状态每台设备一行，覆盖写入
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use ems_storage::{LogQuery, LogStore, SqliteLogStore, connect_pool};
//!
//! let pool = connect_pool("sqlite://device_logger.db").await?;
//! let logs = SqliteLogStore::new(pool.clone());
//! let recent = logs.query_entries(&LogQuery::device("plc-1").with_page(50, 0)).await?;
//! ```

pub mod catalog;
pub mod connection;
pub mod error;
mod in_memory;
mod sqlite;
pub mod traits;

pub use catalog::ModelCatalog;
pub use connection::{connect_pool, ensure_schema};
pub use error::StorageError;
pub use in_memory::{InMemoryLogStore, InMemoryStatusStore};
pub use sqlite::{SqliteLogStore, SqliteStatusStore};
pub use traits::{
    CleanupReport, DEFAULT_QUERY_LIMIT, LogQuery, LogStore, RetentionPolicy, StatusStore,
};
