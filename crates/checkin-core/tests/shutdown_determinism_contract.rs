//! Architectural Contract Test: Shutdown Determinism
//!
//! This test verifies that shutdown is deterministic and complete.
//!
//! Constraints verified:
//! - Scheduler terminates on shutdown signal
//! - A sweep in progress finishes its commit before the scheduler stops
//! - The startup catch-up sweep runs before the first wait
//! - Dropping the shutdown sender also stops the scheduler
//! - A stopped scheduler can be started again
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Tasks that ignore cancellation
//! - Cancellation points between delivery and commit

mod common;

use checkin_core::{NewSubscriber, Scheduler, SchedulerEvent};
use chrono::Duration;
use common::*;

#[tokio::test]
async fn shutdown_signal_terminates_scheduler() {
    let (store, _backend, _clock) = counting_store();
    let (scheduler, _events) =
        Scheduler::new(store, Box::new(MockNotifier::new()), test_scheduler_config())
            .expect("scheduler construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let handle = tokio::spawn(async move { scheduler.run_with_shutdown(Some(shutdown_rx)).await });

    // Wait for startup
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    let shutdown_result = shutdown_tx.send(());
    assert!(shutdown_result.is_ok(), "shutdown signal send succeeds");

    let result = tokio::time::timeout(tokio::time::Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "Scheduler should terminate within 5 seconds");

    let scheduler_result = result.unwrap().unwrap();
    assert!(
        scheduler_result.is_ok(),
        "Scheduler should shut down successfully: {:?}",
        scheduler_result
    );
}

#[tokio::test]
async fn startup_sweep_runs_when_enabled() {
    let (store, backend, clock) = counting_store();
    store.create(NewSubscriber::new("a@x.com")).await.unwrap();
    clock.advance(Duration::days(1));
    let saves = backend.save_count();

    let notifier = MockNotifier::new();
    let mut config = test_scheduler_config();
    config.run_on_startup = true;

    let (scheduler, _events) = Scheduler::new(store, Box::new(notifier.clone()), config)
        .expect("scheduler construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { scheduler.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(notifier.call_count(), 1, "catch-up sweep delivered the overdue record");
    assert_eq!(backend.save_count() - saves, 1);
}

#[tokio::test]
async fn shutdown_during_sweep_completes_commit() {
    let (store, backend, clock) = counting_store();
    let id = store.create(NewSubscriber::new("a@x.com")).await.unwrap();
    clock.advance(Duration::days(1));

    // Delivery takes longer than the wait before the shutdown signal
    let notifier = MockNotifier::new().with_delay(std::time::Duration::from_millis(300));
    let mut config = test_scheduler_config();
    config.run_on_startup = true;

    let (scheduler, mut events) = Scheduler::new(store, Box::new(notifier.clone()), config)
        .expect("scheduler construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { scheduler.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();

    let result = tokio::time::timeout(tokio::time::Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "Scheduler should terminate within 5 seconds");
    result.unwrap().unwrap().unwrap();

    assert_eq!(notifier.deliveries().len(), 1);
    assert_eq!(
        backend.committed().await[&id].next_due_at,
        t0() + Duration::days(2),
        "the in-flight sweep committed before stopping"
    );

    let mut completed_before_stop = false;
    let mut stopped = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SchedulerEvent::SweepCompleted(_) => completed_before_stop = !stopped,
            SchedulerEvent::Stopped { .. } => stopped = true,
            _ => {}
        }
    }
    assert!(completed_before_stop && stopped);
}

#[tokio::test]
async fn dropped_shutdown_sender_stops_scheduler() {
    let (store, _backend, _clock) = counting_store();
    let (scheduler, _events) =
        Scheduler::new(store, Box::new(MockNotifier::new()), test_scheduler_config())
            .expect("scheduler construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move { scheduler.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    drop(shutdown_tx);

    let result = tokio::time::timeout(tokio::time::Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "Scheduler should terminate within 5 seconds");
}

#[tokio::test]
async fn scheduler_can_run_again_after_shutdown() {
    let (store, _backend, _clock) = counting_store();
    let (scheduler, mut events) =
        Scheduler::new(store, Box::new(MockNotifier::new()), test_scheduler_config())
            .expect("scheduler construction succeeds");
    let scheduler = std::sync::Arc::new(scheduler);

    for _ in 0..2 {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let running = scheduler.clone();
        let handle =
            tokio::spawn(async move { running.run_with_shutdown(Some(shutdown_rx)).await });

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    let mut stops = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SchedulerEvent::Stopped { .. }) {
            stops += 1;
        }
    }
    assert_eq!(stops, 2);
}
