//! Integration tests for the deimos orchestrator
//!
//! All scenarios run against real loopback sockets: refused connects for
//! deterministic failures, an accepting listener for successes, and a
//! backlog-1 listener that never accepts for SYN_SENT timeouts.

use deimos::{Credential, EngineConfig, Orchestrator, OrchestratorError};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::time::{Duration, Instant};

fn cred() -> Credential {
    Credential::new("admin", "admin")
}

/// A loopback port with nothing listening on it
fn closed_target() -> SocketAddrV4 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
}

fn listener_target(listener: &TcpListener) -> SocketAddrV4 {
    match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(_) => unreachable!("loopback listener is IPv4"),
    }
}

/// Pump the reactor until every connection resolves or the deadline passes
fn drain(orchestrator: &mut Orchestrator, deadline: Duration) {
    let deadline = Instant::now() + deadline;
    while orchestrator.active_connections() > 0 && Instant::now() < deadline {
        orchestrator
            .process_events(Duration::from_millis(50))
            .expect("process_events");
    }
}

#[test]
fn test_load_split_across_two_sources() {
    let mut orchestrator =
        Orchestrator::new(EngineConfig::new(100).with_connect_timeout(2000)).unwrap();
    orchestrator
        .register_source(Ipv4Addr::new(127, 0, 0, 1), 50)
        .unwrap();
    orchestrator
        .register_source(Ipv4Addr::new(127, 0, 0, 2), 50)
        .unwrap();

    let target = closed_target();
    for _ in 0..100 {
        orchestrator.start_connection(target, cred()).unwrap();
    }

    let snapshot = orchestrator.snapshot();
    assert_eq!(orchestrator.active_connections(), 100);
    assert_eq!(snapshot.stats.total_attempts, 100);
    assert_eq!(snapshot.sources[0].active, 50);
    assert_eq!(snapshot.sources[1].active, 50);

    drain(&mut orchestrator, Duration::from_secs(10));

    let snapshot = orchestrator.snapshot();
    assert_eq!(orchestrator.active_connections(), 0);
    assert_eq!(snapshot.sources[0].active, 0);
    assert_eq!(snapshot.sources[1].active, 0);
    // Refused loopback connects all resolve as failed
    assert_eq!(snapshot.stats.resolved(), 100);
    assert_eq!(snapshot.stats.failed, 100);
    assert_eq!(snapshot.stats.successful, 0);
}

#[test]
fn test_source_capacity_rejects_sixth_connection() {
    let mut orchestrator = Orchestrator::new(EngineConfig::new(10)).unwrap();
    orchestrator
        .register_source(Ipv4Addr::LOCALHOST, 5)
        .unwrap();

    let target = closed_target();
    for _ in 0..5 {
        orchestrator.start_connection(target, cred()).unwrap();
    }

    let result = orchestrator.start_connection(target, cred());
    assert!(matches!(result, Err(OrchestratorError::NoCapacity)));
    assert_eq!(orchestrator.active_connections(), 5);
    assert_eq!(orchestrator.snapshot().stats.total_attempts, 5);

    orchestrator.shutdown();
}

#[test]
fn test_successful_loopback_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let target = listener_target(&listener);

    let mut orchestrator = Orchestrator::new(EngineConfig::new(4)).unwrap();
    orchestrator
        .register_source(Ipv4Addr::LOCALHOST, 1)
        .unwrap();

    orchestrator.start_connection(target, cred()).unwrap();
    drain(&mut orchestrator, Duration::from_secs(5));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.stats.successful, 1);
    assert_eq!(snapshot.stats.failed, 0);
    assert_eq!(snapshot.stats.timed_out, 0);
    assert_eq!(orchestrator.active_connections(), 0);
    assert_eq!(snapshot.sources[0].active, 0);
}

#[test]
fn test_pool_exhaustion_and_slot_reuse() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let target = listener_target(&listener);

    // One slot, but address capacity for two
    let mut orchestrator = Orchestrator::new(EngineConfig::new(1)).unwrap();
    orchestrator
        .register_source(Ipv4Addr::LOCALHOST, 2)
        .unwrap();

    orchestrator.start_connection(target, cred()).unwrap();
    let result = orchestrator.start_connection(target, cred());
    assert!(matches!(result, Err(OrchestratorError::PoolExhausted)));
    assert_eq!(orchestrator.active_connections(), 1);

    drain(&mut orchestrator, Duration::from_secs(5));
    assert_eq!(orchestrator.active_connections(), 0);

    // The freed slot is reusable
    orchestrator.start_connection(target, cred()).unwrap();
    drain(&mut orchestrator, Duration::from_secs(5));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.stats.total_attempts, 2);
    assert_eq!(snapshot.stats.successful, 2);
}

#[test]
fn test_stalled_connects_time_out() {
    // Backlog of 1 and no accept() calls: once the accept queue fills, the
    // kernel stops completing loopback handshakes and the surplus connects
    // sit in SYN_SENT until the engine expires them.
    let backlog = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .unwrap();
    backlog
        .bind(&"127.0.0.1:0".parse::<SocketAddr>().unwrap().into())
        .unwrap();
    backlog.listen(1).unwrap();
    let target = match backlog.local_addr().unwrap().as_socket() {
        Some(SocketAddr::V4(addr)) => addr,
        _ => unreachable!("loopback listener is IPv4"),
    };

    let mut orchestrator =
        Orchestrator::new(EngineConfig::new(8).with_connect_timeout(400)).unwrap();
    orchestrator
        .register_source(Ipv4Addr::LOCALHOST, 8)
        .unwrap();

    for _ in 0..8 {
        orchestrator.start_connection(target, cred()).unwrap();
    }

    drain(&mut orchestrator, Duration::from_secs(10));

    let snapshot = orchestrator.snapshot();
    assert_eq!(orchestrator.active_connections(), 0);
    assert_eq!(snapshot.stats.resolved(), 8);
    assert!(
        snapshot.stats.timed_out >= 1,
        "expected stalled connects to be reclaimed as timed out: {:?}",
        snapshot.stats
    );
}

#[test]
fn test_source_load_matches_active_count_throughout() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let target = listener_target(&listener);

    let mut orchestrator = Orchestrator::new(EngineConfig::new(20)).unwrap();
    orchestrator
        .register_source(Ipv4Addr::new(127, 0, 0, 1), 10)
        .unwrap();
    orchestrator
        .register_source(Ipv4Addr::new(127, 0, 0, 2), 10)
        .unwrap();

    for launched in 1..=20 {
        orchestrator.start_connection(target, cred()).unwrap();
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.active_connections, launched);
        assert_eq!(snapshot.total_source_load(), launched);
    }

    // Invariant holds while resolving too
    let deadline = Instant::now() + Duration::from_secs(10);
    while orchestrator.active_connections() > 0 && Instant::now() < deadline {
        orchestrator
            .process_events(Duration::from_millis(20))
            .unwrap();
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.total_source_load(), snapshot.active_connections);
    }

    assert_eq!(orchestrator.snapshot().stats.resolved(), 20);
}

#[test]
fn test_shutdown_releases_everything() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let target = listener_target(&listener);

    let mut orchestrator = Orchestrator::new(EngineConfig::new(8)).unwrap();
    orchestrator
        .register_source(Ipv4Addr::LOCALHOST, 8)
        .unwrap();

    for _ in 0..8 {
        orchestrator.start_connection(target, cred()).unwrap();
    }
    assert_eq!(orchestrator.active_connections(), 8);

    orchestrator.shutdown();

    let snapshot = orchestrator.snapshot();
    assert_eq!(orchestrator.active_connections(), 0);
    assert_eq!(snapshot.total_source_load(), 0);
    // Discarded in-flight connections are not counted as outcomes
    assert_eq!(snapshot.stats.total_attempts, 8);
    assert!(snapshot.stats.resolved() <= 8);

    // The pool is fully reusable after shutdown
    orchestrator.start_connection(target, cred()).unwrap();
    drain(&mut orchestrator, Duration::from_secs(5));
    assert_eq!(orchestrator.snapshot().stats.successful, 1);
}

#[test]
fn test_snapshot_is_pure() {
    let mut orchestrator = Orchestrator::new(EngineConfig::new(4)).unwrap();
    orchestrator
        .register_source(Ipv4Addr::LOCALHOST, 4)
        .unwrap();

    let before = orchestrator.snapshot();
    let again = orchestrator.snapshot();
    assert_eq!(before.stats.total_attempts, again.stats.total_attempts);
    assert_eq!(before.active_connections, again.active_connections);
    assert_eq!(before.sources.len(), again.sources.len());
}
