use claims::*;
use futures::future::join_all;
use server::client::RelayClient;
use server::common::RelayError;
use server::correlation::{AwaitOutcome, ReplyWaitPolicy};
use server::transport::{InMemoryTransport, QueueTransport};
use std::sync::Arc;
use std::time::Duration;

fn transport() -> (InMemoryTransport, Arc<dyn QueueTransport>) {
    let transport = InMemoryTransport::new();
    let shared: Arc<dyn QueueTransport> = Arc::new(transport.clone());
    (transport, shared)
}

#[tokio::test]
async fn test_connect_then_disconnect() {
    let client = RelayClient::new();
    let (broker, shared) = transport();

    let connection = assert_ok!(client.connect(Some("s-1".to_string()), shared).await);
    assert!(client.is_connected());
    assert_eq!(connection.session_id(), "s-1");
    assert_eq!(assert_ok!(client.connection().await).session_id(), "s-1");

    assert_ok!(client.disconnect().await);
    assert!(!client.is_connected());
    assert!(broker.is_closed());
    assert_matches!(client.connection().await, Err(RelayError::NotConnected));

    // Second disconnect is a no-op.
    assert_ok!(client.disconnect().await);
}

#[tokio::test]
async fn test_reconnect_tears_down_previous_connection() {
    let client = RelayClient::new();
    let (first_broker, first) = transport();
    let (second_broker, second) = transport();

    let old = assert_ok!(client.connect(Some("old".to_string()), first).await);
    first_broker.reply("old", "parked", b"{}".to_vec());
    let outcome = assert_ok!(old.await_reply("other", Duration::from_millis(20)).await);
    assert!(outcome.timed_out());
    assert_eq!(old.buffer().len(), 1);

    let new = assert_ok!(client.connect(Some("new".to_string()), second).await);

    assert!(first_broker.is_closed());
    assert!(!second_broker.is_closed());
    assert!(old.is_closed());
    assert!(old.buffer().is_empty());
    assert!(new.buffer().is_empty());
    assert_eq!(assert_ok!(client.connection().await).session_id(), "new");
}

#[tokio::test]
async fn test_stale_handle_fails_fast_after_disconnect() {
    let client = RelayClient::new();
    let (broker, shared) = transport();
    let connection = assert_ok!(client.connect(None, shared).await);

    assert_ok!(client.disconnect().await);

    assert_matches!(
        connection.send(b"{}".to_vec()).await,
        Err(RelayError::NotConnected)
    );
    assert_matches!(
        connection.await_reply("x", Duration::from_secs(5)).await,
        Err(RelayError::NotConnected)
    );
    assert_matches!(connection.peek().await, Err(RelayError::NotConnected));
    assert!(broker.sent_requests().is_empty());
}

#[tokio::test]
async fn test_send_and_receive_through_client() {
    let client = RelayClient::with_policy(ReplyWaitPolicy::PerReceive);
    let (broker, shared) = transport();
    broker.set_responder(|request| Some(request.body.clone()));

    let connection = assert_ok!(client.connect(None, shared).await);
    assert_eq!(connection.wait_policy(), ReplyWaitPolicy::PerReceive);

    let id = assert_ok!(client.send(b"hello".to_vec()).await);
    let outcome = assert_ok!(client.await_reply(&id, Duration::from_secs(1)).await);

    let reply = assert_some!(outcome.into_message());
    assert_eq!(reply.body, b"hello");
    assert_eq!(reply.session_id.as_deref(), Some(connection.session_id()));
}

#[tokio::test]
async fn test_receive_any_and_peek_bypass_correlation() {
    let client = RelayClient::new();
    let (broker, shared) = transport();
    let connection = assert_ok!(client.connect(Some("mine".to_string()), shared).await);

    broker.reply("foreign", "f-1", b"{}".to_vec());
    assert_eq!(assert_some!(assert_ok!(connection.peek().await)).id, "f-1");

    let taken = assert_ok!(connection.receive_any(Duration::from_millis(10)).await);
    assert_eq!(assert_some!(taken).id, "f-1");
    assert_none!(assert_ok!(connection.receive_any(Duration::from_millis(10)).await));
    assert!(connection.buffer().is_empty());
}

#[tokio::test]
async fn test_drain_returns_unclaimed_replies() {
    let client = RelayClient::new();
    let (broker, shared) = transport();
    let connection = assert_ok!(client.connect(Some("s".to_string()), shared).await);
    broker.reply("s", "a", b"{}".to_vec());
    broker.reply("s", "b", b"{}".to_vec());

    let outcome = assert_ok!(connection.await_reply("c", Duration::from_millis(20)).await);
    assert_eq!(outcome, AwaitOutcome::TimedOut);

    let drained: Vec<_> = connection
        .drain_buffered()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(drained, ["a", "b"]);
    assert!(connection.buffer().is_empty());
}

#[tokio::test]
async fn test_concurrent_transitions_leave_consistent_state() {
    let client = Arc::new(RelayClient::new());

    let transitions = (0..20).map(|i| {
        let client = Arc::clone(&client);
        async move {
            if i % 3 == 0 {
                client.disconnect().await
            } else {
                client
                    .connect(None, Arc::new(InMemoryTransport::new()))
                    .await
                    .map(|_| ())
            }
        }
    });
    for result in join_all(transitions).await {
        assert_ok!(result);
    }

    assert_eq!(client.is_connected(), client.connection().await.is_ok());
}

#[tokio::test]
async fn test_global_client_is_shared() {
    let first = RelayClient::global();
    let second = RelayClient::global();
    assert!(std::ptr::eq(first, second));

    let (broker, shared) = transport();
    assert_ok!(first.connect(None, shared).await);
    assert!(second.is_connected());

    assert_ok!(second.disconnect().await);
    assert!(!first.is_connected());
    assert!(broker.is_closed());
}
