//! Tests for the connection router

use super::*;
use crate::clock::ManualClock;
use async_trait::async_trait;
use mockall::mock;
use tierroute_core::{ConnectErrorKind, RequestContext};

mock! {
    pub TestProvider {}

    #[async_trait]
    impl ConnectionProvider for TestProvider {
        type Connection = String;
        async fn connect(&self) -> std::result::Result<String, ConnectError>;
    }
}

const START: u64 = 1_700_000_000_000;

fn succeeding(name: &'static str, times: usize) -> MockTestProvider {
    let mut provider = MockTestProvider::new();
    provider
        .expect_connect()
        .times(times)
        .returning(move || Ok(name.to_string()));
    provider
}

fn failing(kind: ConnectErrorKind, message: &'static str, times: usize) -> MockTestProvider {
    let mut provider = MockTestProvider::new();
    provider
        .expect_connect()
        .times(times)
        .returning(move || Err(ConnectError::new(kind, message)));
    provider
}

fn never_called() -> MockTestProvider {
    let mut provider = MockTestProvider::new();
    provider.expect_connect().never();
    provider
}

fn router_with_clock(threshold: i32, block_ms: u64) -> (Router<String>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let router = Router::new(FailoverConfig {
        failure_threshold: threshold,
        block_duration_ms: block_ms,
        ..FailoverConfig::default()
    })
    .with_clock(clock.clone());
    (router, clock)
}

#[tokio::test]
async fn test_missing_route_is_configuration_error() {
    let (mut router, _) = router_with_clock(3, 120_000);
    router.add_route(RouteKey::Primary, never_called());

    let err = router
        .get_connection(&RequestContext::replica())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RouteNotConfigured(RouteKey::Replica)));
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_primary_success_is_direct() {
    let (mut router, _) = router_with_clock(3, 120_000);
    router.add_route(RouteKey::Primary, succeeding("primary-conn", 1));
    router.add_route(RouteKey::Replica, never_called());

    let routed = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();

    assert_eq!(routed.connection(), "primary-conn");
    assert_eq!(routed.served_by(), &RouteKey::Primary);
    assert_eq!(routed.requested(), &RouteKey::Primary);
    assert_eq!(routed.mode(), RouteMode::Direct);
    assert_eq!(router.failure_count(), 0);
}

#[tokio::test]
async fn test_primary_failure_falls_back_to_replica() {
    let (mut router, _) = router_with_clock(3, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 1));

    let routed = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();

    assert_eq!(routed.into_inner(), "replica-conn");
    assert_eq!(router.failure_count(), 1);
    assert!(!router.is_primary_blocked());
}

#[tokio::test]
async fn test_routed_mode_for_fallback() {
    let (mut router, _) = router_with_clock(3, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::PoolInitialization, "pool init failed", 1),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 1));

    let routed = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();

    assert_eq!(routed.mode(), RouteMode::Fallback);
    assert_eq!(routed.served_by(), &RouteKey::Replica);
    assert_eq!(routed.requested(), &RouteKey::Primary);
}

#[tokio::test]
async fn test_both_fail_surfaces_primary_error() {
    let (mut router, _) = router_with_clock(3, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );
    router.add_route(
        RouteKey::Replica,
        failing(ConnectErrorKind::Establish, "replica down", 1),
    );

    let err = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap_err();

    let connect_err = err.as_connect_error().expect("connection error expected");
    assert_eq!(connect_err.message(), "primary down");
    assert_eq!(connect_err.route(), Some(&RouteKey::Primary));
    assert_eq!(router.failure_count(), 1);
}

#[tokio::test]
async fn test_non_retryable_failure_bypasses_breaker_and_fallback() {
    let (mut router, _) = router_with_clock(1, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Application, "bad request", 1),
    );
    router.add_route(RouteKey::Replica, never_called());

    let err = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap_err();

    assert_eq!(
        err.as_connect_error().map(|e| e.kind()),
        Some(ConnectErrorKind::Application)
    );
    assert_eq!(router.failure_count(), 0);
    assert!(!router.is_primary_blocked());
}

#[tokio::test]
async fn test_fallback_disallowed_propagates_and_skips_breaker() {
    let (mut router, _) = router_with_clock(1, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 2),
    );
    router.add_route(RouteKey::Replica, never_called());

    let ctx = RequestContext::primary().without_fallback();
    for _ in 0..2 {
        let err = router.get_connection(&ctx).await.unwrap_err();
        assert_eq!(
            err.as_connect_error().map(|e| e.message()),
            Some("primary down")
        );
    }

    assert_eq!(router.failure_count(), 0);
    assert!(!router.is_primary_blocked());
}

#[tokio::test]
async fn test_fallback_disallowed_ignores_open_breaker() {
    let (mut router, _) = router_with_clock(1, 120_000);
    let mut primary = MockTestProvider::new();
    let mut seq = mockall::Sequence::new();
    primary
        .expect_connect()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Err(ConnectError::establish("primary down")));
    primary
        .expect_connect()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok("admin-conn".to_string()));
    router.add_route(RouteKey::Primary, primary);
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 1));

    // Open the breaker
    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    assert!(router.is_primary_blocked());

    let routed = router
        .get_connection(&RequestContext::primary().without_fallback())
        .await
        .unwrap();
    assert_eq!(routed.connection(), "admin-conn");
    assert_eq!(routed.mode(), RouteMode::Direct);
}

#[tokio::test]
async fn test_replica_request_never_fails_over() {
    let (mut router, _) = router_with_clock(3, 120_000);
    router.add_route(RouteKey::Primary, never_called());
    router.add_route(
        RouteKey::Replica,
        failing(ConnectErrorKind::Establish, "replica down", 1),
    );

    let err = router
        .get_connection(&RequestContext::replica())
        .await
        .unwrap_err();

    assert_eq!(
        err.as_connect_error().map(|e| e.message()),
        Some("replica down")
    );
    assert_eq!(router.failure_count(), 0);
}

#[tokio::test]
async fn test_replica_request_served_directly() {
    let (mut router, _) = router_with_clock(3, 120_000);
    router.add_route(RouteKey::Primary, never_called());
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 1));

    let routed = router
        .get_connection(&RequestContext::replica())
        .await
        .unwrap();
    assert_eq!(routed.mode(), RouteMode::Direct);
    assert_eq!(routed.served_by(), &RouteKey::Replica);
}

#[tokio::test]
async fn test_breaker_opens_at_threshold_and_expires() {
    let (mut router, clock) = router_with_clock(3, 120_000);
    // Attempted three times to open the breaker, once more after expiry
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 4),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 5));

    for expected in [1, 2] {
        router
            .get_connection(&RequestContext::primary())
            .await
            .unwrap();
        assert_eq!(router.failure_count(), expected);
        assert!(!router.is_primary_blocked());
    }

    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    assert_eq!(router.failure_count(), 0);
    assert!(router.is_primary_blocked());
    assert_eq!(
        router.blocked_until().map(|d| d.timestamp_millis() as u64),
        Some(START + 120_000)
    );

    clock.advance(Duration::from_millis(1));
    let routed = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    assert_eq!(routed.mode(), RouteMode::Degraded);

    clock.advance(Duration::from_millis(120_000));
    assert!(!router.is_primary_blocked());
    let routed = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    assert_eq!(routed.mode(), RouteMode::Fallback);
    assert_eq!(router.failure_count(), 1);
}

#[tokio::test]
async fn test_block_deadline_counts_from_failure() {
    let (mut router, clock) = router_with_clock(1, 120_000);

    // Primary hangs for the connect timeout before failing
    let slow_clock = clock.clone();
    let mut primary = MockTestProvider::new();
    primary.expect_connect().times(1).returning(move || {
        slow_clock.advance(Duration::from_millis(5_000));
        Err(ConnectError::establish("connect timed out"))
    });
    router.add_route(RouteKey::Primary, primary);
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 1));

    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();

    assert_eq!(
        router.blocked_until().map(|d| d.timestamp_millis() as u64),
        Some(START + 5_000 + 120_000)
    );

    clock.advance(Duration::from_millis(119_999));
    assert!(router.is_primary_blocked());
    clock.advance(Duration::from_millis(1));
    assert!(!router.is_primary_blocked());
}

#[tokio::test]
async fn test_success_does_not_reset_failure_count() {
    let (mut router, _) = router_with_clock(3, 120_000);
    let mut primary = MockTestProvider::new();
    let mut seq = mockall::Sequence::new();
    for ok in [false, true, false, true, false] {
        primary
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move || {
                if ok {
                    Ok("primary-conn".to_string())
                } else {
                    Err(ConnectError::establish("primary down"))
                }
            });
    }
    router.add_route(RouteKey::Primary, primary);
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 3));

    for _ in 0..4 {
        router
            .get_connection(&RequestContext::primary())
            .await
            .unwrap();
    }
    assert_eq!(router.failure_count(), 2);
    assert!(!router.is_primary_blocked());

    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    assert!(router.is_primary_blocked());
}

#[tokio::test]
async fn test_zero_threshold_disables_blocking() {
    let (mut router, _) = router_with_clock(0, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 10),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 10));

    for _ in 0..10 {
        let routed = router
            .get_connection(&RequestContext::primary())
            .await
            .unwrap();
        assert_eq!(routed.mode(), RouteMode::Fallback);
    }
    assert!(!router.is_primary_blocked());
}

#[tokio::test]
async fn test_degraded_without_replica_is_configuration_error() {
    let (mut router, _) = router_with_clock(1, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );

    // No fallback registered: the primary failure is surfaced and the breaker opens
    let err = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap_err();
    assert_eq!(
        err.as_connect_error().map(|e| e.message()),
        Some("primary down")
    );
    assert!(router.is_primary_blocked());

    let err = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RouteNotConfigured(RouteKey::Replica)));
}

#[tokio::test]
async fn test_degraded_replica_failure_propagates() {
    let (mut router, _) = router_with_clock(1, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );
    let mut replica = MockTestProvider::new();
    let mut seq = mockall::Sequence::new();
    replica
        .expect_connect()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok("replica-conn".to_string()));
    replica
        .expect_connect()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Err(ConnectError::establish("replica down")));
    router.add_route(RouteKey::Replica, replica);

    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    let err = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap_err();

    let connect_err = err.as_connect_error().unwrap();
    assert_eq!(connect_err.message(), "replica down");
    assert_eq!(connect_err.route(), Some(&RouteKey::Replica));
}

#[tokio::test]
async fn test_ordered_fallback_routes() {
    let clock = Arc::new(ManualClock::new(START));
    let mut router = Router::new(FailoverConfig {
        fallback_routes: vec![RouteKey::Replica, RouteKey::custom("standby")],
        ..FailoverConfig::default()
    })
    .with_clock(clock);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Protocol, "handshake failed", 1),
    );
    router.add_route(
        RouteKey::Replica,
        failing(ConnectErrorKind::Establish, "replica down", 1),
    );
    router.add_route(RouteKey::custom("standby"), succeeding("standby-conn", 1));

    let routed = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    assert_eq!(routed.served_by(), &RouteKey::custom("standby"));
    assert_eq!(routed.mode(), RouteMode::Fallback);
}

#[tokio::test]
async fn test_custom_route_participates_in_breaker() {
    let (mut router, _) = router_with_clock(1, 120_000);
    router.add_route(RouteKey::Primary, never_called());
    router.add_route(
        RouteKey::custom("reporting"),
        failing(ConnectErrorKind::Establish, "reporting down", 1),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 2));

    let ctx = RequestContext::new(RouteKey::custom("reporting"));
    let routed = router.get_connection(&ctx).await.unwrap();
    assert_eq!(routed.mode(), RouteMode::Fallback);
    assert!(router.is_primary_blocked());

    let routed = router.get_connection(&ctx).await.unwrap();
    assert_eq!(routed.mode(), RouteMode::Degraded);
}

#[tokio::test]
async fn test_reconfigure_clears_block() {
    let (mut router, _) = router_with_clock(1, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 1));

    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    assert!(router.is_primary_blocked());

    router.reconfigure(&FailoverConfig {
        failure_threshold: 5,
        block_duration_ms: 30_000,
        ..FailoverConfig::default()
    });

    assert!(!router.is_primary_blocked());
    assert_eq!(router.failure_count(), 0);
    assert!(router.blocked_until().is_none());
    assert_eq!(router.breaker().failure_threshold(), 5);
    assert_eq!(router.breaker().block_duration(), Duration::from_secs(30));
}

#[tokio::test]
async fn test_setters_apply_to_next_failure() {
    let (mut router, _) = router_with_clock(3, 120_000);
    router.set_failure_threshold(1);
    router.set_block_duration(Duration::from_secs(10));
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 1));

    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();

    assert_eq!(
        router.blocked_until().map(|d| d.timestamp_millis() as u64),
        Some(START + 10_000)
    );
}

#[test]
fn test_validate() {
    let mut router: Router<String> = Router::with_defaults();
    assert!(matches!(
        router.validate(),
        Err(Error::RouteNotConfigured(RouteKey::Primary))
    ));

    router.add_route(RouteKey::Primary, never_called());
    assert!(matches!(
        router.validate(),
        Err(Error::RouteNotConfigured(RouteKey::Replica))
    ));

    router.add_route(RouteKey::Replica, never_called());
    assert!(router.validate().is_ok());
}

#[test]
fn test_add_route_replaces_provider() {
    let mut router: Router<String> = Router::with_defaults();
    assert!(router.add_route(RouteKey::Primary, never_called()).is_none());
    assert!(router.add_route(RouteKey::Primary, never_called()).is_some());
    assert_eq!(router.route_keys(), vec![RouteKey::Primary]);
}

#[tokio::test]
async fn test_hand_built_custom_keys_resolve_to_known_routes() {
    let (mut router, _) = router_with_clock(1, 120_000);
    router.add_route(
        RouteKey::Custom("primary".to_string()),
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 2));
    router.set_fallback_routes(vec![RouteKey::Custom("Replica".to_string())]);

    assert_eq!(router.route_keys(), vec![RouteKey::Primary, RouteKey::Replica]);
    assert!(router.has_route(&RouteKey::Primary));
    assert!(router.has_route(&RouteKey::Custom("PRIMARY".to_string())));
    assert_eq!(router.fallback_routes(), &[RouteKey::Replica]);

    let routed = router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    assert_eq!(routed.mode(), RouteMode::Fallback);
    assert!(router.is_primary_blocked());

    let ctx = RequestContext::new(RouteKey::Custom("primary".to_string()));
    let routed = router.get_connection(&ctx).await.unwrap();
    assert_eq!(routed.mode(), RouteMode::Degraded);
}

#[tokio::test]
async fn test_readiness_reports_blocked_primary() {
    let (mut router, _) = router_with_clock(1, 120_000);
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 1));

    let statuses = router.get_route_statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.status == "available"));
    assert!(router.is_ready());

    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();

    let statuses = router.get_route_statuses();
    let primary = statuses.iter().find(|s| s.route == "primary").unwrap();
    assert_eq!(primary.status, "blocked");
    assert!(primary.blocked_until.is_some());
    assert!(router.is_ready());
}

#[test]
fn test_not_ready_without_routes() {
    let router: Router<String> = Router::with_defaults();
    assert!(!router.is_ready());
    assert!(router.get_route_statuses().is_empty());
}

#[tokio::test]
async fn test_metrics_recorded() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let (router, _) = router_with_clock(1, 120_000);
    let mut router = router.with_metrics(metrics.clone());
    router.add_route(
        RouteKey::Primary,
        failing(ConnectErrorKind::Establish, "primary down", 1),
    );
    router.add_route(RouteKey::Replica, succeeding("replica-conn", 2));

    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();
    router
        .get_connection(&RequestContext::primary())
        .await
        .unwrap();

    let gathered = metrics.registry().gather();
    let opened = gathered
        .iter()
        .find(|m| m.name() == "tierroute_breaker_opened_total")
        .expect("breaker_opened_total metric not found");
    assert_eq!(opened.metric[0].counter.as_ref().unwrap().value.unwrap(), 1.0);

    let fallbacks = gathered
        .iter()
        .find(|m| m.name() == "tierroute_fallback_triggered_total")
        .expect("fallback_triggered_total metric not found");
    assert_eq!(fallbacks.metric.len(), 2);

    let failures = gathered
        .iter()
        .find(|m| m.name() == "tierroute_connect_failures_total")
        .expect("connect_failures_total metric not found");
    assert_eq!(
        failures.metric[0].counter.as_ref().unwrap().value.unwrap(),
        1.0
    );
}

#[test]
fn test_route_mode_as_str() {
    assert_eq!(RouteMode::Direct.as_str(), "direct");
    assert_eq!(RouteMode::Fallback.as_str(), "fallback");
    assert_eq!(RouteMode::Degraded.to_string(), "degraded");
}
