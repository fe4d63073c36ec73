//! SQLite 设备状态实现

use crate::error::StorageError;
use crate::traits::StatusStore;
use domain::{DeviceState, DeviceStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct SqliteStatusStore {
    pub pool: SqlitePool,
}

impl SqliteStatusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn status_from_row(row: &SqliteRow) -> Result<DeviceStatus, StorageError> {
    let state: String = row.try_get("state")?;
    let connection_count: i64 = row.try_get("connection_count")?;
    Ok(DeviceStatus {
        device_id: row.try_get("device_id")?,
        state: state.parse::<DeviceState>().map_err(StorageError::CorruptRow)?,
        last_update_ms: row.try_get("last_update_ms")?,
        error_message: row.try_get("error_message")?,
        connection_count: connection_count.max(0) as u64,
    })
}

#[async_trait::async_trait]
impl StatusStore for SqliteStatusStore {
    async fn upsert_status(&self, status: &DeviceStatus) -> Result<(), StorageError> {
        sqlx::query(
            "insert into device_status \
             (device_id, state, last_update_ms, error_message, connection_count) \
             values (?, ?, ?, ?, ?) \
             on conflict (device_id) do update set \
             state = excluded.state, \
             last_update_ms = excluded.last_update_ms, \
             error_message = excluded.error_message, \
             connection_count = excluded.connection_count",
        )
        .bind(&status.device_id)
        .bind(status.state.as_str())
        .bind(status.last_update_ms)
        .bind(status.error_message.as_deref())
        .bind(i64::try_from(status.connection_count).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_status(&self, device_id: &str) -> Result<Option<DeviceStatus>, StorageError> {
        let row = sqlx::query(
            "select device_id, state, last_update_ms, error_message, connection_count \
             from device_status where device_id = ?",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(status_from_row).transpose()
    }

    async fn list_statuses(&self) -> Result<Vec<DeviceStatus>, StorageError> {
        let rows = sqlx::query(
            "select device_id, state, last_update_ms, error_message, connection_count \
             from device_status order by device_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(status_from_row).collect()
    }

    async fn delete_status(&self, device_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from device_status where device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
