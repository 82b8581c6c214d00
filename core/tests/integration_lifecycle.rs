// Integration test: service lifecycle against fake native and platform sides
//
// Covers start/stop sequencing, wake-lock agreement, failure reporting,
// teardown and bounded status queries.

mod common;

use common::{assert_guard_matches, Harness};
use dnsvisor_core::{Health, ServiceState, StartOutcome, StopOutcome};
use std::time::Duration;

#[tokio::test]
async fn test_double_start_calls_native_once() {
    let h = Harness::spawn();
    h.resolver.slow_start(Duration::from_millis(100));

    assert_eq!(h.controller.request_start().await.unwrap(), StartOutcome::Starting);
    assert_eq!(
        h.controller.request_start().await.unwrap(),
        StartOutcome::Ignored(ServiceState::Starting)
    );

    h.wait_for_state(ServiceState::Running).await;
    assert_eq!(
        h.controller.request_start().await.unwrap(),
        StartOutcome::Ignored(ServiceState::Running)
    );
    assert_eq!(h.resolver.starts(), 1);
}

#[tokio::test]
async fn test_guard_follows_state() {
    let h = Harness::spawn();
    assert_guard_matches(&h.controller.query_status().await, &h.wake);

    h.controller.request_start().await.unwrap();
    assert_guard_matches(&h.controller.latest_status(), &h.wake);

    let running = h.wait_for_state(ServiceState::Running).await;
    assert_guard_matches(&running, &h.wake);

    assert_eq!(h.controller.request_stop().await.unwrap(), StopOutcome::Stopped);
    let stopped = h.controller.query_status().await;
    assert_eq!(stopped.state, ServiceState::Stopped);
    assert_guard_matches(&stopped, &h.wake);

    // Second cycle behaves the same
    h.start_running().await;
    assert!(h.wake.is_held());
    h.controller.request_stop().await.unwrap();
    assert!(!h.wake.is_held());
    assert_eq!(h.resolver.starts(), 2);
    assert_eq!(h.resolver.stops(), 2);
}

#[tokio::test]
async fn test_failed_start_reverts_to_stopped() {
    let h = Harness::spawn();
    h.resolver.fail_start();

    h.controller.request_start().await.unwrap();
    let status = h
        .wait_for(|status| matches!(status.health, Health::Failed(_)))
        .await;

    assert_eq!(status.state, ServiceState::Stopped);
    assert!(!status.wake_lock_held);
    assert!(!h.wake.is_held());
    assert!(!h.connectivity.is_registered());
    assert_eq!(h.resolver.stops(), 0);

    // Failures are reported, never retried
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.resolver.starts(), 1);
}

#[tokio::test]
async fn test_start_writes_default_config() {
    let h = Harness::spawn();
    h.start_running().await;

    let config = std::fs::read_to_string(h.files.path().join("resolver.toml")).unwrap();
    assert!(config.contains("[::1]:5353"));
}

#[tokio::test]
async fn test_stop_during_start_is_deferred() {
    let h = Harness::spawn();
    h.resolver.slow_start(Duration::from_millis(200));

    h.controller.request_start().await.unwrap();
    let outcome = h.controller.request_stop().await.unwrap();

    assert_eq!(outcome, StopOutcome::Stopped);
    assert_eq!(h.resolver.starts(), 1);
    assert_eq!(h.resolver.stops(), 1);

    let status = h.controller.query_status().await;
    assert_eq!(status.state, ServiceState::Stopped);
    assert!(!h.wake.is_held());
}

#[tokio::test]
async fn test_monitor_runs_only_while_running() {
    let h = Harness::spawn();
    assert!(!h.connectivity.is_registered());

    h.start_running().await;
    assert!(h.connectivity.is_registered());

    h.controller.request_stop().await.unwrap();
    assert!(!h.connectivity.is_registered());
}

#[tokio::test]
async fn test_teardown_while_running_stops_resolver() {
    let h = Harness::spawn();
    h.start_running().await;

    h.controller.teardown().await;
    h.task.await.unwrap();

    assert_eq!(h.resolver.stops(), 1);
    assert!(!h.wake.is_held());
    assert!(!h.connectivity.is_registered());
}

#[tokio::test]
async fn test_teardown_releases_guard_when_stop_fails() {
    let h = Harness::spawn();
    h.start_running().await;
    h.resolver.fail_stop();

    let mut status_rx = h.controller.subscribe();
    h.controller.teardown().await;
    h.task.await.unwrap();

    assert_eq!(h.resolver.stops(), 1);
    assert!(!h.wake.is_held());

    let last = status_rx.borrow_and_update().clone();
    assert_eq!(last.state, ServiceState::Stopped);
    assert!(!last.wake_lock_held);
    assert!(matches!(last.health, Health::Failed(_)));
}

#[tokio::test]
async fn test_stop_failure_is_reported() {
    let h = Harness::spawn();
    h.start_running().await;
    h.resolver.fail_stop();

    let outcome = h.controller.request_stop().await.unwrap();
    assert!(matches!(outcome, StopOutcome::Failed(_)));
    assert!(!h.wake.is_held());
    assert_eq!(h.controller.latest_status().state, ServiceState::Stopped);
}

#[tokio::test]
async fn test_teardown_during_start_waits_then_stops() {
    let h = Harness::spawn();
    h.resolver.slow_start(Duration::from_millis(150));

    h.controller.request_start().await.unwrap();
    h.controller.teardown().await;
    h.task.await.unwrap();

    assert_eq!(h.resolver.starts(), 1);
    assert_eq!(h.resolver.stops(), 1);
    assert!(!h.wake.is_held());
}

#[tokio::test]
async fn test_commands_after_teardown_report_gone() {
    let h = Harness::spawn();
    h.controller.teardown().await;
    h.task.await.unwrap();

    assert!(h.controller.request_start().await.is_err());
    // Status falls back to the last published snapshot
    assert_eq!(h.controller.query_status().await.state, ServiceState::Stopped);
}

#[tokio::test]
async fn test_status_reports_stats_and_uptime() {
    let h = Harness::spawn();
    h.resolver
        .set_stats(r#"{"blocks": 4021, "peers": 7, "queries": 12, "responses": 12}"#);
    h.start_running().await;

    let status = h.controller.query_status().await;
    let stats = status.stats.unwrap();
    assert_eq!(stats.blocks, 4021);
    assert_eq!(stats.peers, 7);
    assert!(status.uptime_secs.is_some());

    h.controller.request_stop().await.unwrap();
    let status = h.controller.query_status().await;
    assert_eq!(status.stats, None);
    assert_eq!(status.uptime_secs, None);
}

#[tokio::test]
async fn test_stats_timeout_returns_cached_snapshot() {
    let h = Harness::spawn_with(|config| {
        config.stats_timeout = Duration::from_millis(50);
    });
    h.resolver.set_stats(r#"{"blocks": 10, "peers": 3}"#);
    h.start_running().await;

    let first = h.controller.query_status().await;
    assert_eq!(first.stats.unwrap().blocks, 10);
    // Let the cache update land in the controller
    h.wait_for(|status| status.stats.map(|s| s.blocks) == Some(10))
        .await;

    h.resolver.set_stats(r#"{"blocks": 11, "peers": 3}"#);
    h.resolver.slow_stats(Duration::from_millis(500));

    let second = h.controller.query_status().await;
    assert_eq!(second.state, ServiceState::Running);
    assert_eq!(second.stats.unwrap().blocks, 10);
}

#[tokio::test]
async fn test_recent_log_passthrough() {
    let h = Harness::spawn();
    let log = h.controller.recent_log().await.unwrap();
    assert!(log.contains("listening"));
}

#[tokio::test]
async fn test_hung_stats_call_is_not_repeated() {
    let h = Harness::spawn_with(|config| {
        config.stats_timeout = Duration::from_millis(20);
    });
    h.resolver.set_stats(r#"{"blocks": 5}"#);
    h.start_running().await;

    h.resolver.slow_stats(Duration::from_millis(800));
    for _ in 0..8 {
        let status = h.controller.query_status().await;
        assert_eq!(status.state, ServiceState::Running);
    }
    assert_eq!(h.resolver.stats_fetches(), 1);

    // Once the hung call returns, the next query fetches again
    h.resolver.slow_stats(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let status = h.controller.query_status().await;
    assert_eq!(status.stats.unwrap().blocks, 5);
    assert_eq!(h.resolver.stats_fetches(), 2);
}

#[tokio::test]
async fn test_teardown_gives_up_on_hung_start() {
    let h = Harness::spawn_with(|config| {
        config.stop_timeout = Duration::from_millis(200);
    });
    h.resolver.slow_start(Duration::from_millis(1500));

    h.controller.request_start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), h.controller.teardown())
        .await
        .expect("teardown must be bounded while a start hangs");

    let status = h.controller.latest_status();
    assert_eq!(status.state, ServiceState::Stopped);
    assert!(matches!(status.health, Health::Failed(_)));
    assert!(!h.wake.is_held());
    assert_eq!(h.resolver.stops(), 1);
}

#[tokio::test]
async fn test_deferred_stop_is_bounded_by_stop_timeout() {
    let h = Harness::spawn_with(|config| {
        config.stop_timeout = Duration::from_millis(200);
    });
    h.resolver.slow_start(Duration::from_millis(1500));

    h.controller.request_start().await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(1), h.controller.request_stop())
        .await
        .expect("deferred stop must be answered")
        .unwrap();
    assert!(matches!(outcome, StopOutcome::Failed(_)));

    let status = h.controller.latest_status();
    assert_eq!(status.state, ServiceState::Stopped);
    assert_guard_matches(&status, &h.wake);

    // The late start completion does not revive the service
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.controller.query_status().await.state, ServiceState::Stopped);
}

#[tokio::test]
async fn test_resolver_exit_is_detected_on_status() {
    let h = Harness::spawn();
    h.start_running().await;

    h.resolver.crash();
    h.controller.query_status().await;

    let status = h
        .wait_for(|status| status.state == ServiceState::Stopped)
        .await;
    assert!(matches!(status.health, Health::Failed(_)));
    assert_guard_matches(&status, &h.wake);
    assert_eq!(h.resolver.stops(), 1);
    assert!(!h.connectivity.is_registered());
}
