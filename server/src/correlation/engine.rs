use super::PendingReplyBuffer;
use crate::common::{RelayError, RelayResult};
use crate::model::BrokeredMessage;
use crate::transport::{QueueTransport, ReceiveOutcome, SessionReceiver};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// How the caller's timeout is spent while waiting for a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyWaitPolicy {
    /// The whole call, lock wait included, ends when the timeout has elapsed.
    #[default]
    Deadline,
    /// Every pull waits up to the full timeout and the lock wait is unbounded,
    /// so a steady stream of other replies can extend the call indefinitely.
    PerReceive,
}

/// What became of an [`await_reply`](CorrelationEngine::await_reply) call.
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome {
    Matched(BrokeredMessage),
    /// Nothing with the awaited ID arrived in time.
    TimedOut,
    /// The session ended without delivering the awaited ID.
    NoResponse,
}

impl AwaitOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self, AwaitOutcome::TimedOut)
    }

    pub fn into_message(self) -> Option<BrokeredMessage> {
        match self {
            AwaitOutcome::Matched(message) => Some(message),
            _ => None,
        }
    }
}

/// Owns an accepted session receiver and makes sure it gets closed, including
/// when the waiting future is dropped mid-receive.
///
/// The receiver lock is released only after the receiver is closed.
struct ReceiverGuard {
    receiver: Option<Box<dyn SessionReceiver>>,
    lock: Option<OwnedMutexGuard<()>>,
    session_id: String,
}

impl ReceiverGuard {
    fn new(
        receiver: Box<dyn SessionReceiver>,
        lock: OwnedMutexGuard<()>,
        session_id: &str,
    ) -> Self {
        Self {
            receiver: Some(receiver),
            lock: Some(lock),
            session_id: session_id.to_string(),
        }
    }

    fn get(&mut self) -> Option<&mut (dyn SessionReceiver + 'static)> {
        self.receiver.as_deref_mut()
    }

    async fn close(mut self) {
        if let Some(receiver) = self.receiver.take() {
            close_receiver(receiver, &self.session_id).await;
        }
    }
}

async fn close_receiver(receiver: Box<dyn SessionReceiver>, session_id: &str) {
    if let Err(e) = receiver.close().await {
        log::warn!("Failed to close session receiver for {session_id}: {e}");
    }
}

impl Drop for ReceiverGuard {
    fn drop(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };
        let lock = self.lock.take();
        let session_id = std::mem::take(&mut self.session_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::debug!("Wait for session {session_id} was cancelled, closing its receiver");
                handle.spawn(async move {
                    close_receiver(receiver, &session_id).await;
                    drop(lock);
                });
            }
            Err(_) => {
                log::warn!("Session receiver for {session_id} dropped outside a runtime");
            }
        }
    }
}

/// Matches replies on one session to the requests awaiting them.
///
/// At most one call holds the session receiver at a time. Calls whose reply is
/// already buffered return without touching the receiver.
pub struct CorrelationEngine {
    session_id: String,
    transport: Arc<dyn QueueTransport>,
    buffer: Arc<PendingReplyBuffer>,
    receiver_lock: Arc<Mutex<()>>,
    policy: ReplyWaitPolicy,
}

impl CorrelationEngine {
    pub fn new(
        session_id: impl Into<String>,
        transport: Arc<dyn QueueTransport>,
        buffer: Arc<PendingReplyBuffer>,
        policy: ReplyWaitPolicy,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            transport,
            buffer,
            receiver_lock: Arc::new(Mutex::new(())),
            policy,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn buffer(&self) -> &Arc<PendingReplyBuffer> {
        &self.buffer
    }

    pub fn policy(&self) -> ReplyWaitPolicy {
        self.policy
    }

    /// Waits for the reply whose ID equals `expected_id`.
    ///
    /// A buffered reply is returned at once. Otherwise the session receiver is
    /// opened and replies are pulled until the match arrives, the wait runs out or
    /// the session ends. Replies for other IDs are completed and buffered.
    ///
    /// # Errors
    ///
    /// Failing to open the receiver, receive or complete is returned as is.
    /// Timing out is not an error; it is [`AwaitOutcome::TimedOut`].
    pub async fn await_reply(
        &self,
        expected_id: &str,
        timeout: Duration,
    ) -> RelayResult<AwaitOutcome> {
        if let Some(reply) = self.buffer.try_take(expected_id) {
            log::debug!("Reply {expected_id} taken from buffer");
            return Ok(AwaitOutcome::Matched(reply));
        }

        let deadline = Instant::now() + timeout;
        let receiver_lock = Arc::clone(&self.receiver_lock);
        let lock = match self.policy {
            ReplyWaitPolicy::Deadline => {
                match tokio::time::timeout_at(deadline, receiver_lock.lock_owned()).await {
                    Ok(guard) => guard,
                    Err(_) => {
                        log::debug!("Timed out waiting for the session receiver ({expected_id})");
                        return Ok(self.take_buffered_or_timeout(expected_id));
                    }
                }
            }
            ReplyWaitPolicy::PerReceive => receiver_lock.lock_owned().await,
        };

        // The previous holder may have parked this reply.
        if let Some(reply) = self.buffer.try_take(expected_id) {
            log::debug!("Reply {expected_id} taken from buffer after acquiring receiver");
            return Ok(AwaitOutcome::Matched(reply));
        }

        let receiver = self.transport.accept_session(&self.session_id).await?;
        let mut receiver = ReceiverGuard::new(receiver, lock, &self.session_id);
        let outcome = match receiver.get() {
            Some(active) => {
                self.pull_until_match(active, expected_id, deadline, timeout)
                    .await
            }
            None => Err(RelayError::ReceiverFailed(
                "Session receiver already closed".to_string(),
            )),
        };
        receiver.close().await;

        outcome
    }

    fn take_buffered_or_timeout(&self, expected_id: &str) -> AwaitOutcome {
        self.buffer
            .try_take(expected_id)
            .map_or(AwaitOutcome::TimedOut, AwaitOutcome::Matched)
    }

    async fn pull_until_match(
        &self,
        receiver: &mut dyn SessionReceiver,
        expected_id: &str,
        deadline: Instant,
        timeout: Duration,
    ) -> RelayResult<AwaitOutcome> {
        loop {
            let max_wait = match self.policy {
                ReplyWaitPolicy::Deadline => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(AwaitOutcome::TimedOut);
                    }
                    remaining
                }
                ReplyWaitPolicy::PerReceive => timeout,
            };

            match receiver.receive(max_wait).await? {
                ReceiveOutcome::Discarded => {
                    log::debug!("Skipped an uncorrelatable reply while waiting for {expected_id}");
                }
                ReceiveOutcome::Empty => {
                    log::debug!("No reply for {expected_id} within {max_wait:?}");
                    return Ok(AwaitOutcome::TimedOut);
                }
                ReceiveOutcome::Closed => {
                    log::debug!("Session {} closed before {expected_id} arrived", self.session_id);
                    return Ok(AwaitOutcome::NoResponse);
                }
                ReceiveOutcome::Message(reply) => {
                    receiver.complete(&reply).await?;
                    if reply.id == expected_id {
                        log::debug!("Received reply {expected_id}");
                        return Ok(AwaitOutcome::Matched(reply));
                    }
                    log::debug!("Buffering reply {} while waiting for {expected_id}", reply.id);
                    self.buffer.put(reply);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    fn engine(transport: &InMemoryTransport, policy: ReplyWaitPolicy) -> CorrelationEngine {
        CorrelationEngine::new(
            "s",
            Arc::new(transport.clone()),
            Arc::new(PendingReplyBuffer::new()),
            policy,
        )
    }

    #[tokio::test]
    async fn test_buffer_hit_skips_transport() {
        let transport = InMemoryTransport::new();
        let engine = engine(&transport, ReplyWaitPolicy::Deadline);
        engine.buffer().put(BrokeredMessage::new(
            "r1",
            7,
            Some("s".to_string()),
            azure_core::date::OffsetDateTime::now_utc(),
            Vec::new(),
        ));

        let outcome = engine.await_reply("r1", Duration::ZERO).await.unwrap();
        assert_eq!(outcome.into_message().map(|m| m.sequence), Some(7));
        assert_eq!(transport.sessions_accepted(), 0);
    }

    #[tokio::test]
    async fn test_other_replies_are_parked() {
        let transport = InMemoryTransport::new();
        let engine = engine(&transport, ReplyWaitPolicy::Deadline);
        transport.reply("s", "other", b"{}".to_vec());
        transport.reply("s", "mine", b"{}".to_vec());

        let outcome = engine
            .await_reply("mine", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(outcome.into_message().map(|m| m.id), Some("mine".to_string()));
        assert!(engine.buffer().contains("other"));
        assert_eq!(transport.complete_count(), 2);
        assert_eq!(transport.receivers_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_session_times_out() {
        let transport = InMemoryTransport::new();
        let engine = engine(&transport, ReplyWaitPolicy::PerReceive);

        let outcome = engine
            .await_reply("nothing", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(outcome.timed_out());
        assert_eq!(transport.active_receivers(), 0);
    }

    #[tokio::test]
    async fn test_closed_session_is_no_response() {
        let transport = InMemoryTransport::new();
        let engine = engine(&transport, ReplyWaitPolicy::Deadline);
        transport.close_session("s");

        let outcome = engine
            .await_reply("r", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, AwaitOutcome::NoResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncorrelatable_reply_does_not_end_the_wait() {
        let transport = InMemoryTransport::new();
        let engine = engine(&transport, ReplyWaitPolicy::Deadline);
        transport.deliver_malformed("s");

        let started = Instant::now();
        let outcome = engine
            .await_reply("r", Duration::from_secs(2))
            .await
            .unwrap();

        assert!(outcome.timed_out());
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(engine.buffer().is_empty());
        assert_eq!(transport.complete_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_still_closes_the_receiver() {
        let transport = InMemoryTransport::new();
        let engine = engine(&transport, ReplyWaitPolicy::Deadline);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(100),
            engine.await_reply("x", Duration::from_secs(5)),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.sessions_accepted(), 1);
        assert_eq!(transport.receivers_closed(), transport.sessions_accepted());
        assert_eq!(transport.active_receivers(), 0);
    }

    #[tokio::test]
    async fn test_accept_failure_propagates() {
        let transport = InMemoryTransport::new();
        let engine = engine(&transport, ReplyWaitPolicy::Deadline);
        transport.fail_accepts("broker unavailable");

        let err = engine
            .await_reply("r", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_transport_failure());
    }
}
