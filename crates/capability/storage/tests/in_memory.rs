use domain::{DeviceState, DeviceStatus, EngineeringValue, LogEntry, Quality};
use ems_storage::{
    InMemoryLogStore, InMemoryStatusStore, LogQuery, LogStore, RetentionPolicy, StatusStore,
};

fn reading(device_id: &str, tag_name: &str, ts_ms: i64, value: f64) -> LogEntry {
    LogEntry::good(
        device_id,
        tag_name,
        EngineeringValue::Number(value),
        Some("kW".to_string()),
        ts_ms,
    )
}

#[tokio::test]
async fn query_filters_and_returns_newest_first() {
    let store = InMemoryLogStore::new();
    let entries = vec![
        reading("plc-1", "power", 1000, 1.0),
        reading("plc-1", "power", 3000, 3.0),
        reading("plc-1", "voltage", 2000, 230.0),
        reading("plc-2", "power", 2500, 9.0),
        LogEntry::bad("plc-1", "power", None, 2000),
    ];
    let written = store.append_entries(&entries).await.expect("append");
    assert_eq!(written, 5);
    assert_eq!(store.len(), 5);

    let items = store
        .query_entries(&LogQuery::device("plc-1").with_tag("power"))
        .await
        .expect("query");
    let stamps: Vec<i64> = items.iter().map(|e| e.ts_ms).collect();
    assert_eq!(stamps, vec![3000, 2000, 1000]);
    assert_eq!(items[1].quality, Quality::Bad);
    assert_eq!(items[1].value, None);

    let ranged = store
        .query_entries(&LogQuery::default().with_range(Some(2000), Some(2500)))
        .await
        .expect("query");
    assert_eq!(ranged.len(), 3);
    assert!(ranged.iter().all(|e| (2000..=2500).contains(&e.ts_ms)));
}

#[tokio::test]
async fn query_pages_with_limit_and_offset() {
    let store = InMemoryLogStore::new();
    let entries: Vec<LogEntry> = (0..10)
        .map(|i| reading("plc-1", "power", 1000 + i, i as f64))
        .collect();
    store.append_entries(&entries).await.expect("append");

    let page = store
        .query_entries(&LogQuery::device("plc-1").with_page(3, 2))
        .await
        .expect("query");
    let stamps: Vec<i64> = page.iter().map(|e| e.ts_ms).collect();
    assert_eq!(stamps, vec![1007, 1006, 1005]);

    let empty = store
        .query_entries(&LogQuery::device("plc-1").with_page(0, 0))
        .await
        .expect("query");
    assert!(empty.is_empty());
}

#[tokio::test]
async fn equal_timestamps_keep_write_order() {
    let store = InMemoryLogStore::new();
    store
        .append_entries(&[
            reading("plc-1", "power", 1000, 1.0),
            reading("plc-1", "power", 1000, 2.0),
        ])
        .await
        .expect("append");
    let items = store
        .query_entries(&LogQuery::default())
        .await
        .expect("query");
    assert_eq!(items[0].value, Some(EngineeringValue::Number(2.0)));
    assert_eq!(items[1].value, Some(EngineeringValue::Number(1.0)));
}

#[tokio::test]
async fn cleanup_keeps_most_recent_entries() {
    let store = InMemoryLogStore::new();
    let entries: Vec<LogEntry> = (0..150)
        .map(|i| reading("plc-1", "power", 10_000 + i, i as f64))
        .collect();
    store.append_entries(&entries).await.expect("append");

    let policy = RetentionPolicy {
        max_entries: Some(100),
        max_age_ms: None,
    };
    let report = store.cleanup(&policy, 20_000).await.expect("cleanup");
    assert_eq!(report.deleted_by_count, 50);
    assert_eq!(report.total(), 50);
    assert_eq!(store.count_entries().await.expect("count"), 100);

    let remaining = store
        .query_entries(&LogQuery::default().with_page(1000, 0))
        .await
        .expect("query");
    let oldest = remaining.iter().map(|e| e.ts_ms).min().expect("oldest");
    assert_eq!(oldest, 10_050);

    let again = store.cleanup(&policy, 20_000).await.expect("cleanup");
    assert_eq!(again.total(), 0);
}

#[tokio::test]
async fn cleanup_drops_entries_older_than_max_age() {
    let store = InMemoryLogStore::new();
    store
        .append_entries(&[
            reading("plc-1", "power", 1_000, 1.0),
            reading("plc-1", "power", 5_000, 2.0),
            reading("plc-1", "power", 9_000, 3.0),
        ])
        .await
        .expect("append");

    let policy = RetentionPolicy {
        max_entries: None,
        max_age_ms: Some(5_000),
    };
    let report = store.cleanup(&policy, 10_000).await.expect("cleanup");
    assert_eq!(report.deleted_by_age, 1);
    assert_eq!(store.count_entries().await.expect("count"), 2);
}

#[tokio::test]
async fn status_is_overwritten_per_device() {
    let store = InMemoryStatusStore::new();
    let mut status = DeviceStatus::new("plc-1", DeviceState::Connecting, 1000);
    store.upsert_status(&status).await.expect("upsert");

    status.state = DeviceState::Error;
    status.error_message = Some("connect timeout".to_string());
    status.last_update_ms = 2000;
    store.upsert_status(&status).await.expect("upsert");
    store
        .upsert_status(&DeviceStatus::new("a-meter", DeviceState::Connected, 1500))
        .await
        .expect("upsert");

    let stored = store
        .get_status("plc-1")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.state, DeviceState::Error);
    assert_eq!(stored.error_message.as_deref(), Some("connect timeout"));

    let all = store.list_statuses().await.expect("list");
    let ids: Vec<&str> = all.iter().map(|s| s.device_id.as_str()).collect();
    assert_eq!(ids, vec!["a-meter", "plc-1"]);

    assert!(store.delete_status("plc-1").await.expect("delete"));
    assert!(!store.delete_status("plc-1").await.expect("delete"));
    assert!(store.get_status("plc-1").await.expect("get").is_none());
}
