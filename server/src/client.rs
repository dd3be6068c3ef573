use crate::common::{RelayError, RelayResult};
use crate::config::{ConnectionConfig, new_session_id};
use crate::correlation::{AwaitOutcome, CorrelationEngine, PendingReplyBuffer, ReplyWaitPolicy};
use crate::model::{BrokeredMessage, OutboundMessage};
use crate::transport::{QueueTransport, ServiceBusTransport};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// One live session on one transport.
///
/// Handles stay usable while the owning [`RelayClient`] keeps this connection.
/// After a disconnect every call on a stale handle fails with
/// [`RelayError::NotConnected`].
pub struct Connection {
    session_id: String,
    transport: Arc<dyn QueueTransport>,
    engine: CorrelationEngine,
    closed: AtomicBool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("buffered", &self.engine.buffer().len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Connection {
    pub fn new(
        session_id: impl Into<String>,
        transport: Arc<dyn QueueTransport>,
        policy: ReplyWaitPolicy,
    ) -> Self {
        let session_id = session_id.into();
        let engine = CorrelationEngine::new(
            session_id.clone(),
            Arc::clone(&transport),
            Arc::new(PendingReplyBuffer::new()),
            policy,
        );
        Self {
            session_id,
            transport,
            engine,
            closed: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn buffer(&self) -> &Arc<PendingReplyBuffer> {
        self.engine.buffer()
    }

    pub fn wait_policy(&self) -> ReplyWaitPolicy {
        self.engine.policy()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> RelayResult<()> {
        if self.is_closed() {
            Err(RelayError::NotConnected)
        } else {
            Ok(())
        }
    }

    /// Sends `body` tagged with this session and returns the new message ID.
    pub async fn send(&self, body: Vec<u8>) -> RelayResult<String> {
        self.send_message(OutboundMessage::new(body)).await
    }

    /// Sends a prepared message. The session is always overwritten with this
    /// connection's, since replies for any other session would never be seen.
    pub async fn send_message(&self, message: OutboundMessage) -> RelayResult<String> {
        self.ensure_open()?;
        let message = message.with_session(self.session_id.clone());
        self.transport.send(message).await
    }

    /// See [`CorrelationEngine::await_reply`].
    pub async fn await_reply(
        &self,
        message_id: &str,
        timeout: Duration,
    ) -> RelayResult<AwaitOutcome> {
        self.ensure_open()?;
        self.engine.await_reply(message_id, timeout).await
    }

    /// Takes the next reply of any session. Bypasses correlation and the buffer.
    pub async fn receive_any(&self, max_wait: Duration) -> RelayResult<Option<BrokeredMessage>> {
        self.ensure_open()?;
        self.transport.receive_any(max_wait).await
    }

    pub async fn peek(&self) -> RelayResult<Option<BrokeredMessage>> {
        self.ensure_open()?;
        self.transport.peek().await
    }

    /// Removes every parked reply, oldest first.
    pub fn drain_buffered(&self) -> Vec<BrokeredMessage> {
        self.engine.buffer().drain_all()
    }

    async fn close(&self) -> RelayResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let discarded = self.engine.buffer().drain_all();
        if !discarded.is_empty() {
            log::warn!(
                "Discarding {} unclaimed replies for session {}",
                discarded.len(),
                self.session_id
            );
        }

        self.transport.close().await
    }
}

/// Holds at most one [`Connection`] at a time.
///
/// Connect and disconnect are serialized; `is_connected` is a plain atomic read
/// and never waits for them.
///
/// # Examples
///
/// ```no_run
/// use server::client::RelayClient;
/// use server::transport::InMemoryTransport;
/// use std::sync::Arc;
///
/// # async fn example() -> server::common::RelayResult<()> {
/// let client = RelayClient::new();
/// let connection = client.connect(None, Arc::new(InMemoryTransport::new())).await?;
/// let id = connection.send(br#"{"type":"RetrieveCompaniesRequest"}"#.to_vec()).await?;
/// println!("sent {id} on session {}", connection.session_id());
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RelayClient {
    connection: Mutex<Option<Arc<Connection>>>,
    connected: AtomicBool,
    policy: ReplyWaitPolicy,
}

static GLOBAL_CLIENT: OnceLock<RelayClient> = OnceLock::new();

impl RelayClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ReplyWaitPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The process-wide client.
    pub fn global() -> &'static RelayClient {
        GLOBAL_CLIENT.get_or_init(RelayClient::new)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Replaces the current connection with one over the transport `open` yields.
    ///
    /// The old connection is torn down first. If `open` fails the client is left
    /// disconnected.
    pub async fn connect_with<F, Fut>(
        &self,
        session_id: Option<String>,
        open: F,
    ) -> RelayResult<Arc<Connection>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RelayResult<Arc<dyn QueueTransport>>>,
    {
        let mut slot = self.connection.lock().await;

        if let Some(previous) = slot.take() {
            self.connected.store(false, Ordering::SeqCst);
            log::info!("Replacing connection for session {}", previous.session_id());
            if let Err(e) = previous.close().await {
                log::warn!("Failed to close previous connection: {e}");
            }
        }

        let transport = open().await?;
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(new_session_id);
        let connection = Arc::new(Connection::new(session_id, transport, self.policy));

        *slot = Some(Arc::clone(&connection));
        self.connected.store(true, Ordering::SeqCst);
        log::info!("Connected with session {}", connection.session_id());
        Ok(connection)
    }

    pub async fn connect(
        &self,
        session_id: Option<String>,
        transport: Arc<dyn QueueTransport>,
    ) -> RelayResult<Arc<Connection>> {
        self.connect_with(session_id, || async move { Ok(transport) })
            .await
    }

    /// Connects to the queue pair described by `config`.
    pub async fn connect_service_bus(
        &self,
        config: &ConnectionConfig,
    ) -> RelayResult<Arc<Connection>> {
        let session_id = config.session_id_or_new();
        self.connect_with(Some(session_id), || async {
            let transport = ServiceBusTransport::connect(config).await?;
            Ok(Arc::new(transport) as Arc<dyn QueueTransport>)
        })
        .await
    }

    /// Closes the transport and drops the session and its buffer. Does nothing
    /// when already disconnected.
    pub async fn disconnect(&self) -> RelayResult<()> {
        let mut slot = self.connection.lock().await;
        let Some(connection) = slot.take() else {
            return Ok(());
        };
        self.connected.store(false, Ordering::SeqCst);

        log::info!("Disconnecting session {}", connection.session_id());
        connection.close().await
    }

    /// The live connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] when disconnected.
    pub async fn connection(&self) -> RelayResult<Arc<Connection>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(RelayError::NotConnected)
    }

    pub async fn send(&self, body: Vec<u8>) -> RelayResult<String> {
        self.connection().await?.send(body).await
    }

    pub async fn await_reply(
        &self,
        message_id: &str,
        timeout: Duration,
    ) -> RelayResult<AwaitOutcome> {
        self.connection()
            .await?
            .await_reply(message_id, timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    #[tokio::test]
    async fn test_disconnected_client_fails_fast() {
        let client = RelayClient::new();
        assert!(!client.is_connected());
        assert!(matches!(
            client.send(b"{}".to_vec()).await,
            Err(RelayError::NotConnected)
        ));
        assert!(matches!(
            client.await_reply("x", Duration::from_secs(1)).await,
            Err(RelayError::NotConnected)
        ));
        assert!(client.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_send_stamps_connection_session() {
        let transport = InMemoryTransport::new();
        let client = RelayClient::new();
        let connection = client
            .connect(Some("abc".to_string()), Arc::new(transport.clone()))
            .await
            .unwrap();

        let id = connection
            .send_message(OutboundMessage::new(Vec::new()).with_session("elsewhere"))
            .await
            .unwrap();

        let sent = transport.sent_requests();
        assert_eq!(sent[0].message_id, id);
        assert_eq!(sent[0].session_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_blank_session_gets_generated() {
        let client = RelayClient::new();
        let connection = client
            .connect(Some(" ".to_string()), Arc::new(InMemoryTransport::new()))
            .await
            .unwrap();
        assert_eq!(connection.session_id().len(), 32);
    }

    #[tokio::test]
    async fn test_failed_open_leaves_client_disconnected() {
        let client = RelayClient::new();
        client
            .connect(None, Arc::new(InMemoryTransport::new()))
            .await
            .unwrap();

        let result = client
            .connect_with(None, || async {
                Err(RelayError::ConnectionFailed("unreachable".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert!(!client.is_connected());
        assert!(client.connection().await.is_err());
    }
}
