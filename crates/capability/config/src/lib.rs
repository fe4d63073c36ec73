//! 应用运行配置加载。
//!
//! - [`AppConfig`]：从 `EMS_*` 环境变量读取运行参数
//! - [`DeviceSetDocument`]：启动时读取的设备集 JSON 文档

mod document;

use std::env;
use std::path::PathBuf;

pub use document::{DeviceDocument, DeviceSetDocument, ScheduleGroupDocument, TagDocument};

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("failed to read {0}: {1}")]
    Read(String, String),
    #[error("invalid device set document: {0}")]
    Document(String),
    #[error(transparent)]
    Validation(#[from] domain::ConfigError),
}

/// 存储后端。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite { database_url: String },
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageBackend,
    /// 设备集文档路径；为空时以空设备集启动
    pub devices_file: Option<PathBuf>,
    /// 日志条数上限；0 表示不限
    pub max_log_entries: Option<u64>,
    pub log_max_age_ms: Option<u64>,
    pub cleanup_interval_ms: u64,
    pub sink_queue_capacity: usize,
    pub sink_batch_size: usize,
    pub reconnect_backoff_ms: u64,
    pub reconnect_backoff_max_ms: u64,
    pub watchdog_interval_ms: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage = match env::var("EMS_STORAGE")
            .unwrap_or_else(|_| "sqlite".to_string())
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "sqlite" => StorageBackend::Sqlite {
                database_url: env::var("EMS_DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://device_logger.db".to_string()),
            },
            other => {
                return Err(ConfigError::Invalid(
                    "EMS_STORAGE".to_string(),
                    other.to_string(),
                ));
            }
        };
        let devices_file = read_optional("EMS_DEVICES_FILE").map(PathBuf::from);
        let max_log_entries = Some(read_u64_with_default("EMS_MAX_LOG_ENTRIES", 1_000_000)?)
            .filter(|value| *value > 0);
        let log_max_age_ms = read_optional_u64("EMS_LOG_MAX_AGE_MS")?.filter(|value| *value > 0);
        let cleanup_interval_ms =
            read_u64_with_default("EMS_CLEANUP_INTERVAL_MS", 24 * 60 * 60 * 1000)?;
        let sink_queue_capacity = read_usize_with_default("EMS_SINK_QUEUE_CAPACITY", 10_000)?;
        let sink_batch_size = read_usize_with_default("EMS_SINK_BATCH_SIZE", 200)?;
        let reconnect_backoff_ms = read_u64_with_default("EMS_RECONNECT_BACKOFF_MS", 5_000)?;
        let reconnect_backoff_max_ms =
            read_u64_with_default("EMS_RECONNECT_BACKOFF_MAX_MS", 60_000)?;
        let watchdog_interval_ms = read_u64_with_default("EMS_WATCHDOG_INTERVAL_MS", 5_000)?;

        if reconnect_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "EMS_RECONNECT_BACKOFF_MS".to_string(),
                "0".to_string(),
            ));
        }
        if reconnect_backoff_max_ms < reconnect_backoff_ms {
            return Err(ConfigError::Invalid(
                "EMS_RECONNECT_BACKOFF_MAX_MS".to_string(),
                reconnect_backoff_max_ms.to_string(),
            ));
        }

        Ok(Self {
            storage,
            devices_file,
            max_log_entries,
            log_max_age_ms,
            cleanup_interval_ms,
            sink_queue_capacity,
            sink_batch_size,
            reconnect_backoff_ms,
            reconnect_backoff_max_ms,
            watchdog_interval_ms,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(None),
    }
}
