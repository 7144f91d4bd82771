//! Integration tests for peers that never connect: missing executable, early
//! exit, hangs, and cancellation.

use std::time::{Duration, Instant};

use testhost_session::{AppError, Session, SessionConfig, SessionState};

use super::test_helpers::{peer_config, peer_session, ready_session, PeerHost, FAIL_FAST};

#[tokio::test]
async fn missing_executable_is_a_launch_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config =
        SessionConfig::new(temp.path().join("no-such-peer"), temp.path()).expect("config");
    let mut session = Session::new(PeerHost::new(), &config).expect("session");

    match session.connect().await {
        Err(AppError::Launch(msg)) => assert!(msg.contains("no-such-peer")),
        other => panic!("expected Launch error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Connecting);
    assert!(session.port().is_some(), "port is allocated before launch");

    session.dispose().await;
    assert_eq!(session.state(), SessionState::Disposed);
}

#[tokio::test]
async fn peer_exiting_before_connect_fails_fast() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = peer_config(temp.path(), &["--behavior", "exit-early"]);
    // No connect bound: the exit alone must end the wait.
    config.connect_timeout_seconds = 0;
    let mut session = Session::new(PeerHost::new(), &config).expect("session");

    let started = Instant::now();
    let result = session.connect().await;

    match result {
        Err(AppError::Launch(msg)) => {
            assert!(msg.contains("exited before connecting"), "unexpected message: {msg}");
        }
        other => panic!("expected Launch error, got {other:?}"),
    }
    assert!(started.elapsed() < FAIL_FAST);

    session.dispose().await;
}

#[tokio::test]
async fn peer_that_never_connects_hits_the_connect_bound() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = peer_config(temp.path(), &["--behavior", "hang"]);
    config.connect_timeout_seconds = 1;
    let mut session = Session::new(PeerHost::new(), &config).expect("session");

    match session.connect().await {
        Err(AppError::Timeout(msg)) => assert!(msg.contains("peer connection")),
        other => panic!("expected Timeout error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Connecting);

    session.dispose().await;
}

#[tokio::test]
async fn cancellation_aborts_connect() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = peer_config(temp.path(), &["--behavior", "hang"]);
    config.connect_timeout_seconds = 0;
    let mut session = Session::new(PeerHost::new(), &config).expect("session");

    let cancel = session.cancellation_token();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    assert!(matches!(
        session.connect().await,
        Err(AppError::Cancelled(_))
    ));
    assert!(started.elapsed() < FAIL_FAST);
    canceller.await.expect("canceller task");

    session.dispose().await;
    assert_eq!(session.state(), SessionState::Disposed);
}

#[tokio::test]
async fn cancellation_aborts_a_blocked_read() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = ready_session(temp.path()).await;

    let cancel = session.cancellation_token();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    // The echo peer only speaks when spoken to, so this read blocks.
    match session.read_message().await {
        Err(AppError::Cancelled(msg)) => assert!(msg.contains(session.id())),
        other => panic!("expected Cancelled error, got {other:?}"),
    }
    canceller.await.expect("canceller task");
    assert_eq!(session.state(), SessionState::Faulted);

    session.dispose().await;
}

#[tokio::test]
async fn failed_session_does_not_block_a_new_one() {
    let temp = tempfile::tempdir().expect("tempdir");

    let mut failed = peer_session(temp.path(), "wrong-handshake");
    assert!(failed.connect().await.is_err());
    failed.dispose().await;

    let mut retry = ready_session(temp.path()).await;
    assert_eq!(retry.state(), SessionState::Ready);
    retry.dispose().await;
}
