//! Integration tests for the node client against a bare listener.

use std::time::Duration;

use synclink_client::{CloseReason, NodeClient, NodeConfig, NodeEvent};
use synclink_protocol::CloseCode;
use synclink_transport::{Talker, WebSocketListener};

#[tokio::test]
async fn user_close_sends_a_clean_close_frame() {
    let listener = WebSocketListener::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = listener.local_addr().expect("should have local addr");

    // Bare hub side: accept, drain until the peer closes, report the
    // close frame it sent.
    let hub = tokio::spawn(async move {
        let talker = listener.accept().await.expect("should accept");
        while let Ok(Some(_)) = talker.recv().await {}
        talker.peer_close()
    });

    let config =
        NodeConfig::new(format!("ws://{addr}"), "hub", "secret", "node-1")
            .auth_timeout(Duration::from_secs(5));
    let (client, mut events) = NodeClient::connect(config);

    // Let the dial land before closing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.close();

    let frame = tokio::time::timeout(Duration::from_secs(5), hub)
        .await
        .expect("hub sees the close")
        .expect("hub task")
        .expect("close frame recorded");
    assert_eq!(CloseCode::from_u16(frame.code), Some(CloseCode::Normal));

    let closed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within deadline")
        .expect("event stream open");
    assert!(matches!(closed, NodeEvent::Closed(CloseReason::UserClose)));
}
