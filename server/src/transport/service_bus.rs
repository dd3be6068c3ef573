use super::{QueueTransport, ReceiveOutcome, SessionReceiver};
use crate::common::{RelayError, RelayResult};
use crate::config::ConnectionConfig;
use crate::consumer::{ServiceBusClientSessionExt, SessionConsumer};
use crate::model::{BrokeredMessage, OutboundMessage};
use crate::producer::{Producer, ServiceBusClientProducerExt};
use async_trait::async_trait;
use azservicebus::core::BasicRetryPolicy;
use azservicebus::{
    ServiceBusClient, ServiceBusClientOptions, ServiceBusReceiverOptions, ServiceBusSenderOptions,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Longest single wait for a session while holding the client lock.
const ACCEPT_SLICE: Duration = Duration::from_secs(1);

fn next_accept_slice(deadline: Instant, now: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(now);
    (!remaining.is_zero()).then(|| remaining.min(ACCEPT_SLICE))
}

/// Request/response queue pair on an Azure Service Bus namespace.
///
/// The sender for the request queue is created once at connect time and shared.
/// Session receivers are accepted per call and disposed when the caller closes them.
pub struct ServiceBusTransport {
    client: Mutex<Option<ServiceBusClient<BasicRetryPolicy>>>,
    producer: Producer,
    request_queue: String,
    response_queue: String,
}

impl ServiceBusTransport {
    /// Opens the client and the request sender.
    ///
    /// With `verify_queues` set, one message is peeked from each queue so a wrong
    /// name or missing permission fails here rather than on the first request.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] for incomplete settings and
    /// [`RelayError::ConnectionFailed`] when the namespace or a queue is unreachable.
    pub async fn connect(config: &ConnectionConfig) -> RelayResult<Self> {
        config.validate()?;
        let connection_string = config.connection_string()?;
        let request_queue = config.request_queue()?.to_string();
        let response_queue = config.response_queue()?.to_string();

        let mut client: ServiceBusClient<BasicRetryPolicy> =
            ServiceBusClient::new_from_connection_string(
                connection_string.expose(),
                ServiceBusClientOptions::default(),
            )
            .await
            .map_err(|e| RelayError::ConnectionFailed(format!("Failed to create client: {e}")))?;

        if config.verify_queues {
            for queue in [&request_queue, &response_queue] {
                Self::probe_queue(&mut client, queue).await?;
            }
        }

        let producer = client
            .create_producer_for_queue(request_queue.clone(), ServiceBusSenderOptions::default())
            .await?;

        log::info!("Connected to Service Bus (requests: {request_queue}, responses: {response_queue})");

        Ok(Self {
            client: Mutex::new(Some(client)),
            producer,
            request_queue,
            response_queue,
        })
    }

    async fn probe_queue(
        client: &mut ServiceBusClient<BasicRetryPolicy>,
        queue: &str,
    ) -> RelayResult<()> {
        let mut receiver = client
            .create_receiver_for_queue(queue.to_string(), ServiceBusReceiverOptions::default())
            .await
            .map_err(|e| {
                RelayError::ConnectionFailed(format!("Queue {queue} is not reachable: {e}"))
            })?;

        let probe = receiver.peek_messages(1, None).await;
        if let Err(e) = receiver.dispose().await {
            log::warn!("Failed to dispose probe receiver for {queue}: {e}");
        }
        probe.map_err(|e| {
            RelayError::ConnectionFailed(format!("Queue {queue} could not be read: {e}"))
        })?;

        log::debug!("Queue {queue} verified");
        Ok(())
    }

    /// Receives until a correlatable message arrives or `deadline` passes, then
    /// completes it.
    async fn receive_and_complete(
        consumer: &mut SessionConsumer,
        deadline: Instant,
    ) -> RelayResult<Option<BrokeredMessage>> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match consumer.receive_message_with_timeout(remaining).await? {
                ReceiveOutcome::Message(message) => {
                    consumer.complete_message(&message).await?;
                    return Ok(Some(message));
                }
                ReceiveOutcome::Discarded => continue,
                ReceiveOutcome::Empty | ReceiveOutcome::Closed => return Ok(None),
            }
        }
    }

    /// Accepts the next session with pending replies.
    ///
    /// The client lock is held for at most one [`ACCEPT_SLICE`] at a time so
    /// session accepts and peeks from other callers are not starved.
    async fn accept_next_before(&self, deadline: Instant) -> RelayResult<Option<SessionConsumer>> {
        while let Some(slice) = next_accept_slice(deadline, Instant::now()) {
            let attempt = {
                let mut guard = self.client.lock().await;
                let Some(client) = guard.as_mut() else {
                    return Err(RelayError::NotConnected);
                };
                tokio::time::timeout(
                    slice,
                    client.accept_next_session_consumer(self.response_queue.clone()),
                )
                .await
            };
            if let Ok(accepted) = attempt {
                return accepted.map(Some);
            }
        }
        Ok(None)
    }

    pub fn request_queue(&self) -> &str {
        &self.request_queue
    }

    pub fn response_queue(&self) -> &str {
        &self.response_queue
    }
}

#[async_trait]
impl QueueTransport for ServiceBusTransport {
    async fn send(&self, message: OutboundMessage) -> RelayResult<String> {
        self.producer.send_message(message).await
    }

    async fn accept_session(&self, session_id: &str) -> RelayResult<Box<dyn SessionReceiver>> {
        let mut guard = self.client.lock().await;
        let Some(client) = guard.as_mut() else {
            return Err(RelayError::NotConnected);
        };

        let consumer = client
            .accept_session_consumer(self.response_queue.clone(), session_id)
            .await?;
        Ok(Box::new(consumer))
    }

    async fn receive_any(&self, max_wait: Duration) -> RelayResult<Option<BrokeredMessage>> {
        let deadline = Instant::now() + max_wait;
        // No session with pending replies showed up in time.
        let Some(mut consumer) = self.accept_next_before(deadline).await? else {
            return Ok(None);
        };

        let result = Self::receive_and_complete(&mut consumer, deadline).await;

        if let Err(e) = consumer.dispose().await {
            log::warn!("Failed to dispose receive-any consumer: {e}");
        }
        result
    }

    async fn peek(&self) -> RelayResult<Option<BrokeredMessage>> {
        let mut guard = self.client.lock().await;
        let Some(client) = guard.as_mut() else {
            return Err(RelayError::NotConnected);
        };

        let mut receiver = client
            .create_receiver_for_queue(
                self.response_queue.clone(),
                ServiceBusReceiverOptions::default(),
            )
            .await
            .map_err(|e| RelayError::ReceiverFailed(format!("Failed to open peek receiver: {e}")))?;

        let peeked = receiver.peek_messages(1, None).await;
        if let Err(e) = receiver.dispose().await {
            log::warn!("Failed to dispose peek receiver: {e}");
        }

        let messages = peeked.map_err(|e| RelayError::MessageReceiveFailed(e.to_string()))?;
        Ok(messages
            .into_iter()
            .find_map(|msg| BrokeredMessage::try_from(msg).ok()))
    }

    async fn close(&self) -> RelayResult<()> {
        self.producer.dispose().await?;

        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client
                .dispose()
                .await
                .map_err(|e| RelayError::InternalError(format!("Failed to dispose client: {e}")))?;
            log::info!("Service Bus connection closed");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionReceiver for SessionConsumer {
    async fn receive(&mut self, max_wait: Duration) -> RelayResult<ReceiveOutcome> {
        self.receive_message_with_timeout(max_wait).await
    }

    async fn complete(&mut self, message: &BrokeredMessage) -> RelayResult<()> {
        self.complete_message(message).await
    }

    async fn close(mut self: Box<Self>) -> RelayResult<()> {
        self.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_slices_are_capped_and_stop_at_deadline() {
        let now = Instant::now();

        assert_eq!(
            next_accept_slice(now + Duration::from_secs(5), now),
            Some(ACCEPT_SLICE)
        );
        assert_eq!(
            next_accept_slice(now + Duration::from_millis(300), now),
            Some(Duration::from_millis(300))
        );
        assert_eq!(next_accept_slice(now, now), None);
        assert_eq!(next_accept_slice(now, now + Duration::from_secs(1)), None);
    }
}
