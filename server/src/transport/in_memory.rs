use super::{QueueTransport, ReceiveOutcome, SessionReceiver};
use crate::common::{RelayError, RelayResult};
use crate::model::{BrokeredMessage, OutboundMessage};
use async_trait::async_trait;
use azure_core::date::OffsetDateTime;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Builds the reply body for a request, or `None` to stay silent.
pub type Responder = dyn Fn(&OutboundMessage) -> Option<Vec<u8>> + Send + Sync;

#[derive(Default)]
struct SessionQueue {
    replies: VecDeque<BrokeredMessage>,
    closed: bool,
}

#[derive(Default)]
struct Broker {
    sessions: HashMap<String, SessionQueue>,
    requests: Vec<OutboundMessage>,
    next_sequence: i64,
    accept_failure: Option<String>,
    /// Sequences of replies that arrived without an ID or body
    malformed: HashSet<i64>,
}

impl Broker {
    fn enqueue(&mut self, mut reply: BrokeredMessage) -> i64 {
        self.next_sequence += 1;
        reply.sequence = self.next_sequence;
        let session = reply.session_id.clone().unwrap_or_default();
        self.sessions
            .entry(session)
            .or_default()
            .replies
            .push_back(reply);
        self.next_sequence
    }

    /// Pops the next reply of `session`, dropping uncorrelatable ones.
    /// The second value is true when the popped reply was malformed.
    fn pop(&mut self, session: &str) -> Option<(BrokeredMessage, bool)> {
        let reply = self.sessions.get_mut(session)?.replies.pop_front()?;
        let malformed = self.malformed.remove(&reply.sequence);
        Some((reply, malformed))
    }

    /// Session holding the oldest reply, if any.
    fn oldest_session(&self) -> Option<String> {
        self.sessions
            .iter()
            .filter_map(|(id, queue)| queue.replies.front().map(|m| (m.sequence, id)))
            .min_by_key(|(sequence, _)| *sequence)
            .map(|(_, id)| id.clone())
    }
}

struct Inner {
    broker: Mutex<Broker>,
    arrivals: Notify,
    responder: Mutex<Option<Arc<Responder>>>,
    receives: AtomicUsize,
    completions: AtomicUsize,
    sessions_accepted: AtomicUsize,
    receivers_closed: AtomicUsize,
    active_receivers: AtomicUsize,
    max_active_receivers: AtomicUsize,
    closed: AtomicBool,
}

impl Inner {
    fn broker(&self) -> MutexGuard<'_, Broker> {
        self.broker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> RelayResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RelayError::ConnectionFailed("transport is closed".to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-process broker with one reply queue per session.
///
/// Cloning gives another handle to the same broker, so a test can keep one while a
/// client owns the other. Every receive, completion and open session receiver is
/// counted for assertions.
#[derive(Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                broker: Mutex::new(Broker::default()),
                arrivals: Notify::new(),
                responder: Mutex::new(None),
                receives: AtomicUsize::new(0),
                completions: AtomicUsize::new(0),
                sessions_accepted: AtomicUsize::new(0),
                receivers_closed: AtomicUsize::new(0),
                active_receivers: AtomicUsize::new(0),
                max_active_receivers: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Answers every request sent from now on with whatever `responder` returns,
    /// routed to the request's session under the request's ID.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&OutboundMessage) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        *self
            .inner
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(responder));
    }

    /// Puts a reply on the response queue. The broker assigns its sequence number.
    pub fn deliver(&self, reply: BrokeredMessage) -> i64 {
        let sequence = self.inner.broker().enqueue(reply);
        self.inner.arrivals.notify_waiters();
        sequence
    }

    /// Delivers a reply with the given ID and body to `session_id`.
    pub fn reply(&self, session_id: &str, message_id: &str, body: impl Into<Vec<u8>>) -> i64 {
        self.deliver(BrokeredMessage::new(
            message_id,
            0,
            Some(session_id.to_string()),
            OffsetDateTime::now_utc(),
            body.into(),
        ))
    }

    /// Delivers a reply with neither ID nor body to `session_id`. Receivers
    /// settle it and report [`ReceiveOutcome::Discarded`].
    pub fn deliver_malformed(&self, session_id: &str) -> i64 {
        let sequence = {
            let mut broker = self.inner.broker();
            let sequence = broker.enqueue(BrokeredMessage::new(
                "",
                0,
                Some(session_id.to_string()),
                OffsetDateTime::now_utc(),
                Vec::new(),
            ));
            broker.malformed.insert(sequence);
            sequence
        };
        self.inner.arrivals.notify_waiters();
        sequence
    }

    /// Ends the session: once its queue is empty, receivers report
    /// [`ReceiveOutcome::Closed`].
    pub fn close_session(&self, session_id: &str) {
        self.inner
            .broker()
            .sessions
            .entry(session_id.to_string())
            .or_default()
            .closed = true;
        self.inner.arrivals.notify_waiters();
    }

    /// Makes every following `accept_session` fail with the given reason.
    pub fn fail_accepts(&self, reason: impl Into<String>) {
        self.inner.broker().accept_failure = Some(reason.into());
    }

    pub fn sent_requests(&self) -> Vec<OutboundMessage> {
        self.inner.broker().requests.clone()
    }

    /// Replies still waiting on the queue, across all sessions.
    pub fn queued_replies(&self) -> usize {
        self.inner
            .broker()
            .sessions
            .values()
            .map(|q| q.replies.len())
            .sum()
    }

    pub fn receive_count(&self) -> usize {
        self.inner.receives.load(Ordering::SeqCst)
    }

    pub fn complete_count(&self) -> usize {
        self.inner.completions.load(Ordering::SeqCst)
    }

    pub fn sessions_accepted(&self) -> usize {
        self.inner.sessions_accepted.load(Ordering::SeqCst)
    }

    pub fn receivers_closed(&self) -> usize {
        self.inner.receivers_closed.load(Ordering::SeqCst)
    }

    pub fn active_receivers(&self) -> usize {
        self.inner.active_receivers.load(Ordering::SeqCst)
    }

    /// Highest number of session receivers that were ever open at once.
    pub fn max_concurrent_receivers(&self) -> usize {
        self.inner.max_active_receivers.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    async fn wait_for_arrival(&self, deadline: Instant) -> bool {
        let notified = self.inner.arrivals.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.queued_replies() > 0 {
            return true;
        }
        tokio::time::timeout_at(deadline, notified).await.is_ok()
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn send(&self, message: OutboundMessage) -> RelayResult<String> {
        self.inner.ensure_open()?;
        let message_id = message.message_id.clone();

        let responder = self
            .inner
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let reply = responder.and_then(|respond| {
            respond(&message).map(|body| {
                BrokeredMessage::new(
                    message_id.clone(),
                    0,
                    message.session_id.clone(),
                    OffsetDateTime::now_utc(),
                    body,
                )
            })
        });

        self.inner.broker().requests.push(message);
        log::debug!("Queued request {message_id}");

        if let Some(reply) = reply {
            self.deliver(reply);
        }
        Ok(message_id)
    }

    async fn accept_session(&self, session_id: &str) -> RelayResult<Box<dyn SessionReceiver>> {
        self.inner.ensure_open()?;
        if let Some(reason) = self.inner.broker().accept_failure.clone() {
            return Err(RelayError::ReceiverFailed(format!(
                "Failed to accept session {session_id}: {reason}"
            )));
        }

        let active = self.inner.active_receivers.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .max_active_receivers
            .fetch_max(active, Ordering::SeqCst);
        self.inner.sessions_accepted.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemorySessionReceiver {
            transport: self.clone(),
            session_id: session_id.to_string(),
            unsettled: HashSet::new(),
        }))
    }

    async fn receive_any(&self, max_wait: Duration) -> RelayResult<Option<BrokeredMessage>> {
        let deadline = Instant::now() + max_wait;
        loop {
            self.inner.ensure_open()?;
            let popped = {
                let mut broker = self.inner.broker();
                broker
                    .oldest_session()
                    .and_then(|session| broker.pop(&session))
            };
            if let Some((reply, malformed)) = popped {
                self.inner.receives.fetch_add(1, Ordering::SeqCst);
                self.inner.completions.fetch_add(1, Ordering::SeqCst);
                if malformed {
                    continue;
                }
                return Ok(Some(reply));
            }
            if !self.wait_for_arrival(deadline).await {
                return Ok(None);
            }
        }
    }

    async fn peek(&self) -> RelayResult<Option<BrokeredMessage>> {
        self.inner.ensure_open()?;
        let broker = self.inner.broker();
        Ok(broker
            .oldest_session()
            .and_then(|session| broker.sessions.get(&session))
            .and_then(|q| q.replies.front())
            .filter(|reply| !broker.malformed.contains(&reply.sequence))
            .cloned())
    }

    async fn close(&self) -> RelayResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.arrivals.notify_waiters();
        Ok(())
    }
}

struct InMemorySessionReceiver {
    transport: InMemoryTransport,
    session_id: String,
    unsettled: HashSet<i64>,
}

impl InMemorySessionReceiver {
    fn try_pop(&self) -> Option<ReceiveOutcome> {
        let mut broker = self.transport.inner.broker();
        match broker.pop(&self.session_id) {
            Some((_, true)) => Some(ReceiveOutcome::Discarded),
            Some((reply, false)) => Some(ReceiveOutcome::Message(reply)),
            None if broker.sessions.get(&self.session_id)?.closed => Some(ReceiveOutcome::Closed),
            None => None,
        }
    }
}

#[async_trait]
impl SessionReceiver for InMemorySessionReceiver {
    async fn receive(&mut self, max_wait: Duration) -> RelayResult<ReceiveOutcome> {
        let deadline = Instant::now() + max_wait;
        loop {
            self.transport.inner.ensure_open()?;

            let notified = self.transport.inner.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_pop() {
                Some(ReceiveOutcome::Message(reply)) => {
                    self.transport.inner.receives.fetch_add(1, Ordering::SeqCst);
                    self.unsettled.insert(reply.sequence);
                    return Ok(ReceiveOutcome::Message(reply));
                }
                Some(ReceiveOutcome::Discarded) => {
                    self.transport.inner.receives.fetch_add(1, Ordering::SeqCst);
                    self.transport
                        .inner
                        .completions
                        .fetch_add(1, Ordering::SeqCst);
                    return Ok(ReceiveOutcome::Discarded);
                }
                Some(outcome) => return Ok(outcome),
                None => {}
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(ReceiveOutcome::Empty);
            }
        }
    }

    async fn complete(&mut self, message: &BrokeredMessage) -> RelayResult<()> {
        if !self.unsettled.remove(&message.sequence) {
            return Err(RelayError::MessageCompleteFailed(format!(
                "Message {} (sequence {}) was not received by this session",
                message.id, message.sequence
            )));
        }
        self.transport
            .inner
            .completions
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> RelayResult<()> {
        self.transport
            .inner
            .receivers_closed
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for InMemorySessionReceiver {
    fn drop(&mut self) {
        self.transport
            .inner
            .active_receivers
            .fetch_sub(1, Ordering::SeqCst);
    }
}
