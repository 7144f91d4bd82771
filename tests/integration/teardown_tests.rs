//! Integration tests for process-tree teardown on dispose and on drop.

#![cfg(target_os = "linux")]

use testhost_session::protocol::message_type::SESSION_END;
use testhost_session::{AppError, Session, SessionState};

use super::test_helpers::{
    peer_session, process_alive, ready_session, wait_until_gone, PeerHost,
};

/// Connect a peer that starts a child and return the child's pid.
async fn session_with_child(workspace: &std::path::Path) -> (Session<PeerHost>, u32) {
    let mut session = peer_session(workspace, "spawn-child");
    session.connect().await.expect("connect succeeds");

    session.send_message("Peer.Child").await.expect("send");
    let reply = session.read_message().await.expect("reply");
    let child_pid = reply
        .payload_as::<Option<u32>>()
        .expect("pid payload")
        .expect("peer reports a child");
    assert!(process_alive(child_pid), "child must be running before dispose");
    (session, child_pid)
}

#[tokio::test]
async fn dispose_terminates_the_peer() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = ready_session(temp.path()).await;
    let pid = session.peer_pid().expect("peer pid");
    assert!(process_alive(pid));

    session.dispose().await;

    assert!(wait_until_gone(pid).await, "peer {pid} survived dispose");
}

#[tokio::test]
async fn dispose_terminates_the_peers_children() {
    let temp = tempfile::tempdir().expect("tempdir");

    // The peer exits on end-of-stream; repeat so a close racing the kill shows up.
    for _ in 0..5 {
        let (mut session, child_pid) = session_with_child(temp.path()).await;

        session.dispose().await;
        assert_eq!(session.state(), SessionState::Disposed);

        assert!(
            wait_until_gone(child_pid).await,
            "child {child_pid} survived dispose"
        );
    }
}

#[tokio::test]
async fn dispose_terminates_children_of_a_peer_that_already_exited() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (mut session, child_pid) = session_with_child(temp.path()).await;
    let peer_pid = session.peer_pid().expect("peer pid");

    session.send_message(SESSION_END).await.expect("send");
    assert!(matches!(
        session.read_message().await,
        Err(AppError::Transport(_))
    ));
    assert!(wait_until_gone(peer_pid).await, "peer {peer_pid} did not exit");
    assert!(process_alive(child_pid), "child outlives its exited peer");

    session.dispose().await;

    assert!(
        wait_until_gone(child_pid).await,
        "child {child_pid} survived dispose"
    );
}

#[tokio::test]
async fn dispose_after_failed_connect_terminates_the_peer() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = peer_session(temp.path(), "wrong-handshake");
    assert!(session.connect().await.is_err());
    let pid = session.peer_pid().expect("peer still held after failure");

    session.dispose().await;

    assert!(wait_until_gone(pid).await, "peer {pid} survived dispose");
}

#[tokio::test]
async fn dropping_without_dispose_terminates_the_peer() {
    let temp = tempfile::tempdir().expect("tempdir");
    let session = ready_session(temp.path()).await;
    let pid = session.peer_pid().expect("peer pid");

    drop(session);

    assert!(wait_until_gone(pid).await, "peer {pid} survived drop");
}
