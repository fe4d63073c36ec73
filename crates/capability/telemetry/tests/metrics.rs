use ems_telemetry::{metrics, record_entries_dropped, record_poll, record_reads};

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_poll();
    record_reads(3, 1);
    record_entries_dropped(5);
    let after = metrics().snapshot();

    assert!(after.polls >= before.polls + 1);
    assert!(after.reads_good >= before.reads_good + 3);
    assert!(after.reads_bad >= before.reads_bad + 1);
    assert!(after.entries_dropped >= before.entries_dropped + 5);
}
