// tests/manager_registry.rs

mod common;
use crate::common::builders::{Harness, WatchRecordBuilder};
use crate::common::fakes::{AUTH_OK, FakeConnector, FakeEnricher, new_frame};
use crate::common::{eventually, init_tracing, settle, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tradewatch::errors::WatchError;
use tradewatch::store::{MemoryRecordStore, RecordStore};
use tradewatch::types::{WatchRecord, WatchStatus};
use tradewatch::watch::{WatchManager, WatchPhase};

type TestResult = Result<(), Box<dyn Error>>;

fn stored(id: i64, search: &str, status: WatchStatus) -> WatchRecord {
    WatchRecordBuilder::new("S1", search)
        .id(id)
        .status(status)
        .build()
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    init_tracing();
    let manager = Harness::new().manager();

    assert!(matches!(manager.get(7), Err(WatchError::NotFound(7))));
    assert!(matches!(manager.start(7).await, Err(WatchError::NotFound(7))));
    assert!(matches!(manager.pause(7).await, Err(WatchError::NotFound(7))));
    assert!(matches!(manager.delete(7).await, Err(WatchError::NotFound(7))));
}

#[tokio::test]
async fn invalid_records_are_rejected_before_any_io() {
    init_tracing();
    let harness = Harness::new();
    let manager = harness.manager();

    let result = manager.add(WatchRecordBuilder::new("S1", " ").build()).await;
    assert!(matches!(result, Err(WatchError::InvalidRecord(_))));
    assert_eq!(harness.store.write_count(), 0);
    assert!(manager.is_empty());
}

#[tokio::test]
async fn connect_failure_on_add_keeps_a_pending_record() -> TestResult {
    init_tracing();
    let harness = Harness::new();
    harness.connector.fail_next_connects("A", 1);
    let manager = harness.manager();

    match manager.add(WatchRecordBuilder::new("S1", "A").build()).await {
        Err(WatchError::StartFailed { id, .. }) => assert_eq!(id, 1),
        other => panic!("Expected StartFailed, got: {:?}", other),
    }

    assert_eq!(harness.store.status_of(1), Some(WatchStatus::Pending));
    assert_eq!(harness.store.write_count(), 1);
    let watcher = manager.get(1)?;
    assert_eq!(watcher.phase(), WatchPhase::Idle);

    harness.connector.queue_frames("A", [AUTH_OK]);
    manager.start(1).await?;
    assert_eq!(watcher.phase(), WatchPhase::Running);
    assert_eq!(harness.store.status_of(1), Some(WatchStatus::Running));
    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn connect_failure_leaves_existing_status_alone() -> TestResult {
    init_tracing();
    let harness = Harness::with_store(MemoryRecordStore::with_records([stored(
        1,
        "A",
        WatchStatus::Pending,
    )]));
    let manager = harness.manager();
    assert_eq!(manager.restore().await?, 0);

    harness.connector.fail_next_connects("A", 1);
    match manager.start(1).await {
        Err(WatchError::StartFailed { id, .. }) => assert_eq!(id, 1),
        other => panic!("Expected StartFailed, got: {:?}", other),
    }

    assert_eq!(harness.store.status_of(1), Some(WatchStatus::Pending));
    assert_eq!(harness.store.write_count(), 0);
    assert_eq!(manager.get(1)?.phase(), WatchPhase::Idle);
    Ok(())
}

#[tokio::test]
async fn first_start_of_a_loaded_running_record_is_skipped() -> TestResult {
    init_tracing();
    let harness = Harness::with_store(MemoryRecordStore::with_records([stored(
        5,
        "A",
        WatchStatus::Running,
    )]));
    let manager = harness.manager();

    manager.start(5).await?;
    assert_eq!(manager.ids(), vec![5]);
    assert_eq!(harness.connector.connects("A"), 0);
    assert_eq!(manager.get(5)?.phase(), WatchPhase::Idle);

    // Only the first start is skipped.
    manager.start(5).await?;
    assert_eq!(harness.connector.connects("A"), 1);
    assert_eq!(manager.get(5)?.phase(), WatchPhase::Running);
    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn start_loads_paused_records_on_demand() -> TestResult {
    init_tracing();
    let harness = Harness::with_store(MemoryRecordStore::with_records([stored(
        3,
        "A",
        WatchStatus::Pending,
    )]));
    harness
        .connector
        .queue_frames("A", [AUTH_OK.to_string(), new_frame(&["g1"])]);
    let manager = harness.manager();

    manager.start(3).await?;
    with_timeout(eventually(|| harness.notifier.count() == 1)).await;
    assert_eq!(harness.store.status_of(3), Some(WatchStatus::Running));
    assert_eq!(manager.ids(), vec![3]);
    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn adding_an_existing_id_uses_the_stored_record() -> TestResult {
    init_tracing();
    let harness = Harness::with_store(MemoryRecordStore::with_records([stored(
        2,
        "A",
        WatchStatus::Pending,
    )]));
    let manager = harness.manager();

    let submitted = WatchRecordBuilder::new("S1", "B").id(2).build();
    assert_eq!(manager.add(submitted).await?, 2);
    assert_eq!(harness.connector.connects("A"), 1);
    assert_eq!(harness.connector.connects("B"), 0);

    let missing = WatchRecordBuilder::new("S1", "B").id(9).build();
    assert!(matches!(manager.add(missing).await, Err(WatchError::NotFound(9))));
    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn list_reports_durable_records_even_when_not_loaded() -> TestResult {
    init_tracing();
    let harness = Harness::with_store(MemoryRecordStore::with_records([
        stored(1, "A", WatchStatus::Pending),
        stored(2, "B", WatchStatus::Error),
    ]));
    let manager = harness.manager();

    let ids: Vec<i64> = manager.list().await?.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(manager.is_empty());
    Ok(())
}

#[tokio::test]
async fn restore_resumes_only_running_records() -> TestResult {
    init_tracing();
    let harness = Harness::with_store(MemoryRecordStore::with_records([
        stored(1, "A", WatchStatus::Running),
        stored(2, "B", WatchStatus::Pending),
        stored(3, "C", WatchStatus::Error),
        stored(4, "D", WatchStatus::Running),
    ]));
    harness.connector.fail_next_connects("D", 1);
    let manager = harness.manager();

    assert_eq!(manager.restore().await?, 1);
    assert_eq!(manager.ids(), vec![1, 2, 3, 4]);

    assert_eq!(manager.get(1)?.phase(), WatchPhase::Running);
    assert_eq!(manager.get(2)?.phase(), WatchPhase::Idle);
    assert_eq!(manager.get(3)?.phase(), WatchPhase::Idle);
    assert_eq!(harness.connector.connects("B"), 0);
    assert_eq!(harness.connector.connects("C"), 0);

    // A stream that cannot be reopened is marked failed.
    assert_eq!(harness.store.status_of(4), Some(WatchStatus::Error));
    assert_eq!(manager.get(4)?.phase(), WatchPhase::Idle);

    // Restoring twice does not open a second stream.
    manager.restore().await?;
    assert_eq!(harness.connector.max_open("A"), 1);
    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_keeps_durable_status() -> TestResult {
    init_tracing();
    let harness = Harness::new();
    let manager = harness.manager();
    manager.add(WatchRecordBuilder::new("S1", "A").build()).await?;
    manager.add(WatchRecordBuilder::new("S1", "B").build()).await?;

    manager.shutdown().await;

    assert_eq!(harness.connector.open("A"), 0);
    assert_eq!(harness.connector.open("B"), 0);
    assert_eq!(harness.store.status_of(1), Some(WatchStatus::Running));
    assert_eq!(harness.store.status_of(2), Some(WatchStatus::Running));

    // A fresh manager over the same store picks both up again.
    let restarted = WatchManager::new(harness.services());
    assert_eq!(restarted.restore().await?, 2);
    assert_eq!(harness.connector.connects("A"), 2);
    restarted.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commands_never_open_two_streams() -> TestResult {
    init_tracing();
    let harness = Harness::with_parts(
        MemoryRecordStore::new(),
        FakeConnector::new().with_connect_delay(Duration::from_millis(10)),
        FakeEnricher::new(),
    );
    let manager = harness.manager();
    let id = manager.add(WatchRecordBuilder::new("S1", "A").build()).await?;

    let mut handles = Vec::new();
    for i in 0..24 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let _ = manager.start(id).await;
            } else {
                let _ = manager.pause(id).await;
            }
        }));
    }
    for handle in handles {
        with_timeout(handle).await?;
    }

    assert_eq!(harness.connector.max_open("A"), 1);

    // Whatever won, memory and store agree.
    let watcher = manager.get(id)?;
    match watcher.phase() {
        WatchPhase::Running => {
            assert_eq!(harness.store.status_of(id), Some(WatchStatus::Running));
            assert_eq!(harness.connector.open("A"), 1);
        }
        WatchPhase::Idle => {
            assert_eq!(harness.store.status_of(id), Some(WatchStatus::Pending));
            assert_eq!(harness.connector.open("A"), 0);
        }
        other => panic!("Expected a settled phase, got: {:?}", other),
    }
    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_racing_starts_ends_deleted() -> TestResult {
    init_tracing();
    let harness = Harness::with_parts(
        MemoryRecordStore::new(),
        FakeConnector::new().with_connect_delay(Duration::from_millis(10)),
        FakeEnricher::new(),
    );
    let manager = harness.manager();
    let id = manager.add(WatchRecordBuilder::new("S1", "A").build()).await?;
    manager.pause(id).await?;

    let mut handles = Vec::new();
    for i in 0..16 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            match i {
                5 => {
                    let _ = manager.delete(id).await;
                }
                i if i % 2 == 0 => {
                    let _ = manager.start(id).await;
                }
                _ => {
                    let _ = manager.pause(id).await;
                }
            }
        }));
    }
    for handle in handles {
        with_timeout(handle).await?;
    }
    settle().await;

    assert!(harness.connector.max_open("A") <= 1);
    assert_eq!(harness.connector.open("A"), 0);
    assert!(harness.store.get_record(id).await?.is_none());
    assert!(matches!(manager.get(id), Err(WatchError::NotFound(_))));
    assert!(matches!(manager.start(id).await, Err(WatchError::NotFound(_))));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_during_add_reaches_the_adding_watcher() -> TestResult {
    init_tracing();
    let harness = Harness::new();
    harness.store.delay_creates(Duration::from_millis(200));
    harness.connector.fail_next_connects("A", 1);
    let manager = harness.manager();

    let adding = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.add(WatchRecordBuilder::new("S1", "A").build()).await })
    };

    // The record is readable while `add` is still inside the store call.
    let store = Arc::clone(&harness.store);
    with_timeout(eventually(|| store.status_of(1).is_some())).await;
    let started = with_timeout(manager.start(1)).await;

    match with_timeout(adding).await? {
        Err(WatchError::StartFailed { id, .. }) => assert_eq!(id, 1),
        other => panic!("Expected StartFailed, got: {:?}", other),
    }
    started?;

    assert_eq!(manager.len(), 1);
    assert_eq!(manager.get(1)?.phase(), WatchPhase::Running);
    assert_eq!(harness.connector.max_open("A"), 1);

    manager.pause(1).await?;
    assert_eq!(harness.connector.open("A"), 0);
    assert_eq!(harness.store.status_of(1), Some(WatchStatus::Pending));
    Ok(())
}
