//! Integration tests for the task manager
//!
//! These drive the pool with fake browsers so scheduling, timeout and
//! shutdown behavior can be observed without any network.

use crate::common::{fetch_sequence, manager_config, FakeLauncher, MemoryStorage, Counters};
use sitevisit::manager::{SequenceError, SlotState};
use sitevisit::{HarnessError, TaskManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SITES: [&str; 5] = [
    "https://a.example/",
    "https://b.example/",
    "https://c.example/",
    "https://d.example/",
    "https://e.example/",
];

/// Collects callback invocations as (rank, success)
#[derive(Clone, Default)]
struct CallbackLog(Arc<Mutex<Vec<(usize, bool)>>>);

impl CallbackLog {
    fn callback(&self, rank: usize) -> impl FnOnce(bool) + Send + 'static {
        let log = self.0.clone();
        move |success| log.lock().unwrap().push((rank, success))
    }

    fn sorted(&self) -> Vec<(usize, bool)> {
        let mut entries = self.0.lock().unwrap().clone();
        entries.sort_unstable();
        entries
    }
}

#[tokio::test]
async fn test_two_workers_five_sites() {
    let launcher = FakeLauncher::new(Duration::from_millis(50));
    let counters = launcher.counters.clone();
    let storage = Arc::new(MemoryStorage::default());
    let manager = TaskManager::start(&manager_config(2), launcher, storage.clone())
        .await
        .unwrap();
    let log = CallbackLog::default();

    for (rank, url) in SITES.iter().enumerate() {
        let sequence = fetch_sequence(url, rank, Duration::from_secs(5)).on_complete(log.callback(rank));
        manager.submit(sequence).await.unwrap();
    }

    let report = manager.close().await.unwrap();

    assert_eq!(
        log.sorted(),
        (0..5).map(|rank| (rank, true)).collect::<Vec<_>>()
    );
    assert!(Counters::get(&counters.max_in_flight) <= 2);
    assert_eq!(Counters::get(&counters.fetches), 5);
    assert_eq!(manager.slots(), vec![SlotState::Idle, SlotState::Idle]);
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.failed, 0);
    assert_eq!(storage.ranks(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_timeout_is_isolated_to_one_site() {
    let launcher = FakeLauncher::new(Duration::from_millis(10));
    let counters = launcher.counters.clone();
    let manager = TaskManager::start(
        &manager_config(2),
        launcher,
        Arc::new(MemoryStorage::default()),
    )
    .await
    .unwrap();
    let log = CallbackLog::default();

    let mut handles = Vec::new();
    for (rank, url) in SITES.iter().enumerate() {
        let url = if rank == 2 { "https://hang.test/" } else { url };
        let sequence =
            fetch_sequence(url, rank, Duration::from_millis(200)).on_complete(log.callback(rank));
        handles.push(manager.submit(sequence).await.unwrap());
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.wait().await.unwrap());
    }
    manager.close().await.unwrap();

    assert_eq!(
        log.sorted(),
        vec![(0, true), (1, true), (2, false), (3, true), (4, true)]
    );
    assert!(matches!(
        outcomes[2].failure,
        Some(SequenceError::Timeout { .. })
    ));
    // The worker was reset, not replaced
    assert_eq!(Counters::get(&counters.resets), 1);
    assert_eq!(Counters::get(&counters.launches), 2);
}

#[tokio::test]
async fn test_engine_error_reports_failure() {
    let manager = TaskManager::start(
        &manager_config(1),
        FakeLauncher::new(Duration::ZERO),
        Arc::new(MemoryStorage::default()),
    )
    .await
    .unwrap();

    let failed = manager
        .submit(fetch_sequence("https://error.test/", 0, Duration::from_secs(1)))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let next = manager
        .submit(fetch_sequence("https://a.example/", 1, Duration::from_secs(1)))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(!failed.success);
    assert!(matches!(failed.failure, Some(SequenceError::WorkerFault(_))));
    assert!(next.success);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_each_sequence_calls_back_once() {
    let manager = TaskManager::start(
        &manager_config(3),
        FakeLauncher::new(Duration::from_millis(5)),
        Arc::new(MemoryStorage::default()),
    )
    .await
    .unwrap();
    let calls: Arc<Vec<AtomicUsize>> = Arc::new((0..20).map(|_| AtomicUsize::new(0)).collect());

    for rank in 0..20 {
        let url = match rank % 4 {
            0 => "https://error.test/",
            1 => "https://hang.test/",
            _ => "https://ok.example/",
        };
        let counter = calls.clone();
        let sequence = fetch_sequence(url, rank, Duration::from_millis(50)).on_complete(move |_| {
            counter[rank].fetch_add(1, Ordering::SeqCst);
        });
        manager.submit(sequence).await.unwrap();
    }

    let report = manager.close().await.unwrap();

    assert!(calls.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    assert_eq!(report.total(), 20);
    assert_eq!(report.failed, 10);
}

#[tokio::test]
async fn test_submit_blocks_while_pool_is_busy() {
    let manager = TaskManager::start(
        &manager_config(1),
        FakeLauncher::new(Duration::from_millis(300)),
        Arc::new(MemoryStorage::default()),
    )
    .await
    .unwrap();

    manager
        .submit(fetch_sequence("https://a.example/", 0, Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(manager.slots(), vec![SlotState::Busy { rank: 0 }]);

    let blocked = tokio::time::timeout(
        Duration::from_millis(50),
        manager.submit(fetch_sequence("https://b.example/", 1, Duration::from_secs(5))),
    )
    .await;
    assert!(blocked.is_err(), "submit should wait for the busy worker");

    let handle = manager
        .submit(fetch_sequence("https://b.example/", 1, Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(handle.wait().await.unwrap().success);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_close_waits_for_in_flight_sequences() {
    let launcher = FakeLauncher::new(Duration::from_millis(150));
    let counters = launcher.counters.clone();
    let storage = Arc::new(MemoryStorage::default());
    let manager = TaskManager::start(&manager_config(2), launcher, storage.clone())
        .await
        .unwrap();
    let log = CallbackLog::default();

    for rank in 0..2 {
        let sequence = fetch_sequence("https://a.example/", rank, Duration::from_secs(5))
            .on_complete(log.callback(rank));
        manager.submit(sequence).await.unwrap();
    }

    let report = manager.close().await.unwrap();

    assert_eq!(log.sorted(), vec![(0, true), (1, true)]);
    assert_eq!(report.succeeded, 2);
    // Browsers close before storage
    assert_eq!(Counters::get(&counters.closes), 2);
    assert_eq!(storage.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_submit_after_close_is_rejected() {
    let manager = TaskManager::start(
        &manager_config(1),
        FakeLauncher::new(Duration::ZERO),
        Arc::new(MemoryStorage::default()),
    )
    .await
    .unwrap();
    manager.close().await.unwrap();

    let result = manager
        .submit(fetch_sequence("https://a.example/", 0, Duration::from_secs(1)))
        .await;

    assert!(matches!(result, Err(HarnessError::ManagerClosed)));
}

#[tokio::test]
async fn test_double_close_releases_once() {
    let launcher = FakeLauncher::new(Duration::ZERO);
    let counters = launcher.counters.clone();
    let storage = Arc::new(MemoryStorage::default());
    let manager = TaskManager::start(&manager_config(2), launcher, storage.clone())
        .await
        .unwrap();

    let first = manager.close().await.unwrap();
    let second = manager.close().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(Counters::get(&counters.closes), 2);
    assert_eq!(storage.closes.load(Ordering::SeqCst), 1);

    drop(manager);
    assert_eq!(storage.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panic_relaunches_browser() {
    let launcher = FakeLauncher::new(Duration::ZERO);
    let counters = launcher.counters.clone();
    let manager = TaskManager::start(
        &manager_config(1),
        launcher,
        Arc::new(MemoryStorage::default()),
    )
    .await
    .unwrap();

    let crashed = manager
        .submit(fetch_sequence("https://panic.test/", 0, Duration::from_secs(1)))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let next = manager
        .submit(fetch_sequence("https://a.example/", 1, Duration::from_secs(1)))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(crashed.failure, Some(SequenceError::Panicked));
    assert!(next.success);
    assert_eq!(Counters::get(&counters.launches), 2);
    assert_eq!(manager.worker_count(), 1);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_relaunch_retires_last_worker() {
    let mut launcher = FakeLauncher::new(Duration::ZERO);
    launcher.max_launches = 1;
    let manager = TaskManager::start(
        &manager_config(1),
        launcher,
        Arc::new(MemoryStorage::default()),
    )
    .await
    .unwrap();

    let crashed = manager
        .submit(fetch_sequence("https://panic.test/", 0, Duration::from_secs(1)))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(!crashed.success);

    let result = manager
        .submit(fetch_sequence("https://a.example/", 1, Duration::from_secs(1)))
        .await;

    assert!(matches!(result, Err(HarnessError::NoWorkers { requested: 1 })));
    assert_eq!(manager.slots(), vec![SlotState::Retired]);
    let report = manager.close().await.unwrap();
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_storage_failures_become_warnings() {
    let manager = TaskManager::start(
        &manager_config(2),
        FakeLauncher::new(Duration::ZERO),
        Arc::new(MemoryStorage::failing()),
    )
    .await
    .unwrap();
    let log = CallbackLog::default();

    for (rank, url) in SITES.iter().enumerate() {
        let sequence = fetch_sequence(url, rank, Duration::from_secs(1)).on_complete(log.callback(rank));
        manager.submit(sequence).await.unwrap();
    }

    let report = manager.close().await.unwrap();

    // Scheduling is unaffected by lost records
    assert_eq!(report.succeeded, 5);
    assert_eq!(log.sorted().len(), 5);

    let mut ranks: Vec<_> = report
        .storage_warnings
        .iter()
        .filter_map(|w| w.rank)
        .collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
    assert!(report.storage_warnings[0].message.contains("disk full"));
}

#[tokio::test]
async fn test_no_launchable_browser_fails_start() {
    let mut launcher = FakeLauncher::new(Duration::ZERO);
    launcher.max_launches = 0;
    let storage = Arc::new(MemoryStorage::default());

    let result = TaskManager::start(&manager_config(3), launcher, storage.clone()).await;

    assert!(matches!(result, Err(HarnessError::NoWorkers { requested: 3 })));
    assert_eq!(storage.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pool_bound_holds_for_every_worker_count() {
    for workers in 1..=6 {
        let launcher = FakeLauncher::new(Duration::from_millis(5));
        let counters = launcher.counters.clone();
        let manager = TaskManager::start(
            &manager_config(workers),
            launcher,
            Arc::new(MemoryStorage::default()),
        )
        .await
        .unwrap();

        let total = 3 * workers + 1;
        let calls: Arc<Vec<AtomicUsize>> =
            Arc::new((0..total).map(|_| AtomicUsize::new(0)).collect());
        for rank in 0..total {
            let counter = calls.clone();
            let sequence = fetch_sequence("https://ok.example/", rank, Duration::from_secs(5))
                .on_complete(move |_| {
                    counter[rank].fetch_add(1, Ordering::SeqCst);
                });
            manager.submit(sequence).await.unwrap();
        }

        let report = manager.close().await.unwrap();

        assert!(
            Counters::get(&counters.max_in_flight) <= workers,
            "{} fetches overlapped with {} workers",
            Counters::get(&counters.max_in_flight),
            workers
        );
        assert!(calls.iter().all(|c| c.load(Ordering::SeqCst) == 1));
        assert_eq!(report.succeeded, total);
        assert_eq!(manager.slots(), vec![SlotState::Idle; workers]);
    }
}

#[tokio::test]
async fn test_drop_cancels_running_sequence() {
    let launcher = FakeLauncher::new(Duration::from_millis(200));
    let counters = launcher.counters.clone();
    let storage = Arc::new(MemoryStorage::default());
    let manager = TaskManager::start(&manager_config(1), launcher, storage.clone())
        .await
        .unwrap();
    let log = CallbackLog::default();

    let sequence = fetch_sequence("https://a.example/", 0, Duration::from_secs(5))
        .on_complete(log.callback(0));
    manager.submit(sequence).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    drop(manager);
    tokio::time::sleep(Duration::from_millis(400)).await;

    // The fetch was cut short instead of running on in a detached task
    assert_eq!(Counters::get(&counters.fetches), 1);
    assert_eq!(Counters::get(&counters.completed), 0);
    assert_eq!(counters.in_flight(), 0);
    assert_eq!(Counters::get(&counters.closes), 1);
    assert_eq!(log.sorted(), vec![(0, false)]);

    let records = storage.records.lock().unwrap().clone();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert!(records[0].error.as_deref().unwrap().contains("cancelled"));
    assert_eq!(storage.closes.load(Ordering::SeqCst), 1);
}
