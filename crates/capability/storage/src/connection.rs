//! 数据库连接管理
//!
//! 提供 SQLite 连接池初始化与建表：
//! - connect_pool：建立连接池（文件不存在时创建）并确保表结构
//! - ensure_schema：幂等建表
//!
//! 内存库（`sqlite::memory:`）每个连接都是独立数据库，因此只保留一个常驻连接。

use crate::error::StorageError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

const SCHEMA: [&str; 4] = [
    "create table if not exists log_entries ( \
        id integer primary key autoincrement, \
        device_id text not null, \
        tag_name text not null, \
        value real, \
        value_is_bool integer not null default 0, \
        quality text not null, \
        unit text, \
        ts_ms integer not null)",
    "create index if not exists idx_log_entries_ts on log_entries (ts_ms)",
    "create index if not exists idx_log_entries_device_tag_ts \
        on log_entries (device_id, tag_name, ts_ms)",
    "create table if not exists device_status ( \
        device_id text primary key, \
        state text not null, \
        last_update_ms integer not null, \
        error_message text, \
        connection_count integer not null default 0)",
];

/// 建立 SQLite 连接池
///
/// 文件库最大连接数为 8；内存库固定为 1 个永不回收的连接。
pub async fn connect_pool(database_url: &str) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let in_memory = database_url.contains(":memory:");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(8)
    };
    let pool = pool_options.connect_with(options).await?;
    ensure_schema(&pool).await?;
    info!(target: "ems.storage", in_memory, "sqlite_pool_ready");
    Ok(pool)
}

/// 幂等建表
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
