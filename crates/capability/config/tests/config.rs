use ems_config::{AppConfig, ConfigError, StorageBackend};

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("EMS_DATABASE_URL", "sqlite://test.db");
        std::env::set_var("EMS_DEVICES_FILE", "devices.json");
        std::env::set_var("EMS_MAX_LOG_ENTRIES", "500");
        std::env::set_var("EMS_RECONNECT_BACKOFF_MS", "1000");
        std::env::set_var("EMS_RECONNECT_BACKOFF_MAX_MS", "8000");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(
        config.storage,
        StorageBackend::Sqlite {
            database_url: "sqlite://test.db".to_string()
        }
    );
    assert_eq!(
        config.devices_file.as_deref(),
        Some(std::path::Path::new("devices.json"))
    );
    assert_eq!(config.max_log_entries, Some(500));
    assert_eq!(config.log_max_age_ms, None);
    assert_eq!(config.cleanup_interval_ms, 86_400_000);
    assert_eq!(config.reconnect_backoff_ms, 1000);
    assert_eq!(config.reconnect_backoff_max_ms, 8000);
    assert_eq!(config.sink_queue_capacity, 10_000);

    unsafe {
        std::env::set_var("EMS_MAX_LOG_ENTRIES", "0");
        std::env::set_var("EMS_STORAGE", "memory");
    }
    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.max_log_entries, None);
    assert_eq!(config.storage, StorageBackend::Memory);

    unsafe {
        std::env::set_var("EMS_RECONNECT_BACKOFF_MAX_MS", "500");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "EMS_RECONNECT_BACKOFF_MAX_MS"
    ));

    unsafe {
        std::env::set_var("EMS_RECONNECT_BACKOFF_MAX_MS", "8000");
        std::env::set_var("EMS_SINK_BATCH_SIZE", "many");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, value)) if key == "EMS_SINK_BATCH_SIZE" && value == "many"
    ));
}
