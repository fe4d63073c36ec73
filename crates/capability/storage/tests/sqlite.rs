use domain::{DeviceState, DeviceStatus, EngineeringValue, LogEntry, Quality};
use ems_storage::{
    LogQuery, LogStore, RetentionPolicy, SqliteLogStore, SqliteStatusStore, StatusStore,
    connect_pool,
};

async fn stores() -> (SqliteLogStore, SqliteStatusStore) {
    let pool = connect_pool("sqlite::memory:").await.expect("pool");
    (
        SqliteLogStore::new(pool.clone()),
        SqliteStatusStore::new(pool),
    )
}

#[tokio::test]
async fn entries_round_trip_with_quality_and_kind() {
    let (logs, _) = stores().await;
    let entries = vec![
        LogEntry::good(
            "plc-1",
            "temperature",
            EngineeringValue::Number(40.0),
            Some("°C".to_string()),
            1000,
        ),
        LogEntry::good("plc-1", "pump", EngineeringValue::Bool(true), None, 2000),
        LogEntry::bad("plc-1", "flow", Some("L/min".to_string()), 3000),
    ];
    assert_eq!(logs.append_entries(&entries).await.expect("append"), 3);
    assert_eq!(logs.append_entries(&[]).await.expect("append"), 0);

    let items = logs
        .query_entries(&LogQuery::device("plc-1"))
        .await
        .expect("query");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].tag_name, "flow");
    assert_eq!(items[0].quality, Quality::Bad);
    assert_eq!(items[0].value, None);
    assert_eq!(items[0].unit.as_deref(), Some("L/min"));
    assert_eq!(items[1].value, Some(EngineeringValue::Bool(true)));
    assert_eq!(items[2].value, Some(EngineeringValue::Number(40.0)));
    assert_eq!(items[2].unit.as_deref(), Some("°C"));
}

#[tokio::test]
async fn filters_and_pages_newest_first() {
    let (logs, _) = stores().await;
    let mut entries = Vec::new();
    for i in 0..6 {
        entries.push(LogEntry::good(
            "plc-1",
            "power",
            EngineeringValue::Number(i as f64),
            None,
            1000 + i * 100,
        ));
    }
    entries.push(LogEntry::good(
        "plc-2",
        "power",
        EngineeringValue::Number(99.0),
        None,
        1200,
    ));
    logs.append_entries(&entries).await.expect("append");

    let ranged = logs
        .query_entries(
            &LogQuery::device("plc-1")
                .with_tag("power")
                .with_range(Some(1100), Some(1400)),
        )
        .await
        .expect("query");
    let stamps: Vec<i64> = ranged.iter().map(|e| e.ts_ms).collect();
    assert_eq!(stamps, vec![1400, 1300, 1200, 1100]);

    let page = logs
        .query_entries(&LogQuery::default().with_page(2, 1))
        .await
        .expect("query");
    let stamps: Vec<i64> = page.iter().map(|e| e.ts_ms).collect();
    assert_eq!(stamps, vec![1400, 1300]);
}

#[tokio::test]
async fn cleanup_keeps_most_recent_entries() {
    let (logs, _) = stores().await;
    let entries: Vec<LogEntry> = (0..150)
        .map(|i| {
            LogEntry::good(
                "plc-1",
                "power",
                EngineeringValue::Number(i as f64),
                None,
                10_000 + i,
            )
        })
        .collect();
    logs.append_entries(&entries).await.expect("append");

    let report = logs
        .cleanup(
            &RetentionPolicy {
                max_entries: Some(100),
                max_age_ms: None,
            },
            20_000,
        )
        .await
        .expect("cleanup");
    assert_eq!(report.deleted_by_count, 50);
    assert_eq!(logs.count_entries().await.expect("count"), 100);

    let oldest = logs
        .query_entries(&LogQuery::default().with_page(1, 99))
        .await
        .expect("query");
    assert_eq!(oldest[0].ts_ms, 10_050);
}

#[tokio::test]
async fn cleanup_applies_age_before_count() {
    let (logs, _) = stores().await;
    let entries: Vec<LogEntry> = (0..10)
        .map(|i| {
            LogEntry::good(
                "plc-1",
                "power",
                EngineeringValue::Number(i as f64),
                None,
                i * 1000,
            )
        })
        .collect();
    logs.append_entries(&entries).await.expect("append");

    let report = logs
        .cleanup(
            &RetentionPolicy {
                max_entries: Some(3),
                max_age_ms: Some(5_000),
            },
            10_000,
        )
        .await
        .expect("cleanup");
    assert_eq!(report.deleted_by_age, 5);
    assert_eq!(report.deleted_by_count, 2);
    assert_eq!(logs.count_entries().await.expect("count"), 3);
}

#[tokio::test]
async fn status_upsert_overwrites_row() {
    let (_, statuses) = stores().await;
    let mut status = DeviceStatus::new("plc-1", DeviceState::Connected, 1000);
    status.connection_count = 1;
    statuses.upsert_status(&status).await.expect("upsert");

    status.state = DeviceState::Error;
    status.error_message = Some("transport down".to_string());
    status.connection_count = 2;
    status.last_update_ms = 5000;
    statuses.upsert_status(&status).await.expect("upsert");

    let stored = statuses
        .get_status("plc-1")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored, status);
    assert_eq!(statuses.list_statuses().await.expect("list").len(), 1);
    assert!(statuses.get_status("other").await.expect("get").is_none());

    assert!(statuses.delete_status("plc-1").await.expect("delete"));
    assert!(statuses.list_statuses().await.expect("list").is_empty());
}
