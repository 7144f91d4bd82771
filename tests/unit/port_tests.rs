//! Unit tests for loopback port allocation and the session listener.

use tokio::net::TcpStream;

use testhost_session::transport::port::{bind_listener, find_free_port};
use testhost_session::AppError;

#[tokio::test]
async fn allocated_port_is_nonzero() {
    let port = find_free_port().await.expect("port allocated");
    assert_ne!(port, 0);
}

#[tokio::test]
async fn listener_binds_the_allocated_port_on_loopback() {
    let port = find_free_port().await.expect("port allocated");
    let listener = bind_listener(port).expect("listener binds");

    let addr = listener.local_addr().expect("local addr");
    assert_eq!(addr.port(), port);
    assert!(addr.ip().is_loopback());
}

#[tokio::test]
async fn listener_accepts_a_loopback_client() {
    let port = find_free_port().await.expect("port allocated");
    let listener = bind_listener(port).expect("listener binds");

    let (client, accepted) = tokio::join!(
        TcpStream::connect(("127.0.0.1", port)),
        listener.accept()
    );

    let client = client.expect("client connects");
    let (_server, peer_addr) = accepted.expect("listener accepts");
    assert_eq!(
        peer_addr,
        client.local_addr().expect("client addr"),
        "accepted address must be the client's"
    );
}

#[tokio::test]
async fn binding_a_port_in_use_is_an_io_error() {
    let port = find_free_port().await.expect("port allocated");
    let _held = bind_listener(port).expect("first bind");

    match bind_listener(port) {
        Err(AppError::Io(msg)) => assert!(msg.contains(&port.to_string())),
        other => panic!("expected Io error, got {other:?}"),
    }
}
