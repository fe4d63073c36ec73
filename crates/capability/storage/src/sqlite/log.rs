//! SQLite 测量日志实现

use crate::error::StorageError;
use crate::traits::{CleanupReport, LogQuery, LogStore, RetentionPolicy};
use domain::{EngineeringValue, LogEntry, Quality};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct SqliteLogStore {
    pub pool: SqlitePool,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn value_columns(value: Option<EngineeringValue>) -> (Option<f64>, bool) {
    match value {
        Some(EngineeringValue::Bool(flag)) => (Some(if flag { 1.0 } else { 0.0 }), true),
        Some(EngineeringValue::Number(number)) => (Some(number), false),
        None => (None, false),
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<LogEntry, StorageError> {
    let value: Option<f64> = row.try_get("value")?;
    let value_is_bool: bool = row.try_get("value_is_bool")?;
    let quality: String = row.try_get("quality")?;
    let quality = quality.parse::<Quality>().map_err(StorageError::CorruptRow)?;
    let value = value.map(|number| {
        if value_is_bool {
            EngineeringValue::Bool(number != 0.0)
        } else {
            EngineeringValue::Number(number)
        }
    });
    Ok(LogEntry {
        device_id: row.try_get("device_id")?,
        tag_name: row.try_get("tag_name")?,
        value,
        quality,
        unit: row.try_get("unit")?,
        ts_ms: row.try_get("ts_ms")?,
    })
}

#[async_trait::async_trait]
impl LogStore for SqliteLogStore {
    async fn append_entries(&self, entries: &[LogEntry]) -> Result<usize, StorageError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let (value, value_is_bool) = value_columns(entry.value);
            sqlx::query(
                "insert into log_entries \
                 (device_id, tag_name, value, value_is_bool, quality, unit, ts_ms) \
                 values (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.device_id)
            .bind(&entry.tag_name)
            .bind(value)
            .bind(value_is_bool)
            .bind(entry.quality.as_str())
            .bind(entry.unit.as_deref())
            .bind(entry.ts_ms)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(entries.len())
    }

    async fn query_entries(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StorageError> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "select device_id, tag_name, value, value_is_bool, quality, unit, ts_ms \
             from log_entries \
             where (? is null or device_id = ?) \
               and (? is null or tag_name = ?) \
               and (? is null or ts_ms >= ?) \
               and (? is null or ts_ms <= ?) \
             order by ts_ms desc, id desc \
             limit ? offset ?",
        )
        .bind(query.device_id.as_deref())
        .bind(query.device_id.as_deref())
        .bind(query.tag_name.as_deref())
        .bind(query.tag_name.as_deref())
        .bind(query.from_ms)
        .bind(query.from_ms)
        .bind(query.to_ms)
        .bind(query.to_ms)
        .bind(i64::from(query.limit))
        .bind(i64::from(query.offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn count_entries(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("select count(*) as total from log_entries")
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }

    async fn cleanup(
        &self,
        policy: &RetentionPolicy,
        now_ms: i64,
    ) -> Result<CleanupReport, StorageError> {
        let mut report = CleanupReport::default();
        let mut tx = self.pool.begin().await?;

        if let Some(max_age_ms) = policy.max_age_ms {
            let cutoff = now_ms.saturating_sub(max_age_ms);
            let result = sqlx::query("delete from log_entries where ts_ms < ?")
                .bind(cutoff)
                .execute(&mut *tx)
                .await?;
            report.deleted_by_age = result.rows_affected();
        }

        if let Some(max_entries) = policy.max_entries {
            let row = sqlx::query("select count(*) as total from log_entries")
                .fetch_one(&mut *tx)
                .await?;
            let total: i64 = row.try_get("total")?;
            let max_entries = i64::try_from(max_entries).unwrap_or(i64::MAX);
            if total > max_entries {
                let result = sqlx::query(
                    "delete from log_entries where id in ( \
                     select id from log_entries order by ts_ms asc, id asc limit ?)",
                )
                .bind(total - max_entries)
                .execute(&mut *tx)
                .await?;
                report.deleted_by_count = result.rows_affected();
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}
