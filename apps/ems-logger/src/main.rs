//! 设备采集守护进程：加载设备集，启动轮询监督器、看门狗与日志保留清理，Ctrl-C 优雅退出。

use domain::Device;
use ems_config::{AppConfig, DeviceSetDocument, StorageBackend};
use ems_pipeline::{LogSink, SinkConfig};
use ems_poller::{PollerConfig, PollerSupervisor};
use ems_protocol::DefaultSessionFactory;
use ems_schedule::ScheduleRegistry;
use ems_storage::{ModelCatalog, RetentionPolicy, SqliteLogStore, SqliteStatusStore, connect_pool};
use ems_telemetry::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let sink = match &config.storage {
        StorageBackend::Memory => LogSink::in_memory(sink_config(&config)),
        StorageBackend::Sqlite { database_url } => {
            let pool = connect_pool(database_url).await?;
            LogSink::new(
                Arc::new(SqliteLogStore::new(pool.clone())),
                Arc::new(SqliteStatusStore::new(pool)),
                sink_config(&config),
            )
        }
    };

    let (groups, devices) = match &config.devices_file {
        Some(path) => DeviceSetDocument::from_path(path)?.into_parts()?,
        None => {
            warn!(target: "ems.app", "devices_file_not_configured");
            (Vec::new(), Vec::new())
        }
    };

    // 内置调度组 + 文档中的调度组（同 id 覆盖）
    let registry = Arc::new(ScheduleRegistry::with_defaults());
    for group in groups {
        registry.upsert(group)?;
    }
    let devices = prefill_model_tags(devices, &ModelCatalog::builtin());

    let supervisor = Arc::new(PollerSupervisor::new(
        Arc::new(DefaultSessionFactory),
        registry,
        sink.clone(),
        poller_config(&config),
    ));
    let report = supervisor.apply_device_set(devices).await;

    let (stop_tx, stop_rx) = watch::channel(false);
    let watchdog = supervisor.clone().spawn_watchdog(stop_rx.clone());
    let cleanup = sink.spawn_cleanup(stop_rx);

    info!(
        target: "ems.app",
        started = report.started.len(),
        rejected = report.rejected.len(),
        "logger_started"
    );

    tokio::signal::ctrl_c().await?;
    info!(target: "ems.app", "shutdown_requested");

    let _ = stop_tx.send(true);
    supervisor.shutdown().await;
    if let Err(err) = watchdog.await {
        warn!(target: "ems.app", error = %err, "watchdog_join_failed");
    }
    if let Err(err) = cleanup.await {
        warn!(target: "ems.app", error = %err, "cleanup_join_failed");
    }
    sink.flush().await?;

    let metrics = ems_telemetry::metrics().snapshot();
    info!(target: "ems.app", ?metrics, "logger_stopped");
    Ok(())
}

fn sink_config(config: &AppConfig) -> SinkConfig {
    SinkConfig {
        queue_capacity: config.sink_queue_capacity,
        batch_size: config.sink_batch_size,
        retention: RetentionPolicy {
            max_entries: config.max_log_entries,
            max_age_ms: config
                .log_max_age_ms
                .map(|age| i64::try_from(age).unwrap_or(i64::MAX)),
        },
        cleanup_interval: Duration::from_millis(config.cleanup_interval_ms),
        ..SinkConfig::default()
    }
}

fn poller_config(config: &AppConfig) -> PollerConfig {
    PollerConfig {
        reconnect_backoff: Duration::from_millis(config.reconnect_backoff_ms),
        reconnect_backoff_max: Duration::from_millis(config.reconnect_backoff_max_ms),
        watchdog_interval: Duration::from_millis(config.watchdog_interval_ms),
    }
}

/// 配置了型号但未列出点位的设备，按型号模板生成点位。
fn prefill_model_tags(devices: Vec<Device>, catalog: &ModelCatalog) -> Vec<Device> {
    devices
        .into_iter()
        .map(|mut device| {
            let Some(model_id) = device.model_id.clone() else {
                return device;
            };
            if !device.tags.is_empty() {
                return device;
            }
            match catalog.instantiate_tags(&model_id) {
                Ok(tags) => {
                    info!(
                        target: "ems.app",
                        device_id = %device.id,
                        model_id = %model_id,
                        tags = tags.len(),
                        "model_tags_applied"
                    );
                    device.tags = tags;
                }
                Err(err) => warn!(
                    target: "ems.app",
                    device_id = %device.id,
                    model_id = %model_id,
                    error = %err,
                    "model_tags_unavailable"
                ),
            }
            device
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(text: &str) -> Vec<Device> {
        DeviceSetDocument::from_json(text)
            .expect("parse")
            .into_parts()
            .expect("parts")
            .1
    }

    #[test]
    fn model_templates_fill_empty_tag_lists() {
        let devices = devices(
            r#"{ "devices": [
                { "id": "inv-1", "name": "Inverter", "model_id": "sungrow_1",
                  "protocol": { "type": "modbus_tcp", "host": "10.0.0.2", "port": 502, "slave_id": 1 } },
                { "id": "inv-2", "name": "Inverter", "model_id": "sungrow_1",
                  "protocol": { "type": "modbus_tcp", "host": "10.0.0.3", "port": 502, "slave_id": 1 },
                  "tags": [{ "name": "only", "address": 1, "data_type": "uint16" }] },
                { "id": "x-1", "name": "Unknown", "model_id": "nope",
                  "protocol": { "type": "modbus_tcp", "host": "10.0.0.4", "port": 502, "slave_id": 1 } }
            ] }"#,
        );

        let filled = prefill_model_tags(devices, &ModelCatalog::builtin());
        assert_eq!(filled[0].tags.len(), 7);
        filled[0].validate().expect("model tags are valid");
        assert_eq!(filled[1].tags.len(), 1);
        assert!(filled[2].tags.is_empty());
    }

    #[test]
    fn app_config_maps_to_runtime_configs() {
        let config = AppConfig {
            storage: StorageBackend::Memory,
            devices_file: None,
            max_log_entries: None,
            log_max_age_ms: Some(60_000),
            cleanup_interval_ms: 1_000,
            sink_queue_capacity: 16,
            sink_batch_size: 4,
            reconnect_backoff_ms: 100,
            reconnect_backoff_max_ms: 1_000,
            watchdog_interval_ms: 500,
        };
        let sink = sink_config(&config);
        assert_eq!(sink.retention.max_entries, None);
        assert_eq!(sink.retention.max_age_ms, Some(60_000));
        assert_eq!(sink.queue_capacity, 16);
        assert_eq!(poller_config(&config).watchdog_interval, Duration::from_millis(500));
    }
}
