use crate::common::{RelayError, RelayResult};
use crate::model::BrokeredMessage;
use crate::transport::ReceiveOutcome;
use azservicebus::{
    ServiceBusClient, ServiceBusReceivedMessage, ServiceBusSessionReceiver,
    ServiceBusSessionReceiverOptions,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Session-scoped receiver on the response queue.
///
/// Received messages are kept until they are completed, keyed by sequence number,
/// because the broker needs the original delivery to settle it.
#[derive(Debug)]
pub struct SessionConsumer {
    receiver: Arc<Mutex<Option<ServiceBusSessionReceiver>>>,
    in_flight: HashMap<i64, ServiceBusReceivedMessage>,
}

impl PartialEq for SessionConsumer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.receiver, &other.receiver)
    }
}

impl SessionConsumer {
    pub fn new(receiver: ServiceBusSessionReceiver) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(Some(receiver))),
            in_flight: HashMap::new(),
        }
    }

    /// Receives at most one message, waiting up to `timeout`.
    ///
    /// Messages without an ID or body cannot be correlated; they are completed
    /// and reported as [`ReceiveOutcome::Discarded`] so the caller can keep waiting.
    pub async fn receive_message_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> RelayResult<ReceiveOutcome> {
        let received = {
            let mut guard = self.receiver.lock().await;
            let Some(receiver) = guard.as_mut() else {
                return Err(RelayError::ReceiverFailed(
                    "Receiver already disposed".to_string(),
                ));
            };

            match tokio::time::timeout(
                timeout,
                receiver.receive_message_with_max_wait_time(Some(timeout)),
            )
            .await
            {
                Ok(result) => {
                    result.map_err(|e| RelayError::MessageReceiveFailed(e.to_string()))?
                }
                Err(_) => {
                    log::debug!("receive_message timed out after {timeout:?}, returning empty");
                    None
                }
            }
        };

        let Some(message) = received else {
            return Ok(ReceiveOutcome::Empty);
        };

        match BrokeredMessage::try_from(&message) {
            Ok(model) => {
                self.in_flight.insert(model.sequence, message);
                Ok(ReceiveOutcome::Message(model))
            }
            Err(e) => {
                log::warn!(
                    "Discarding reply with sequence {} that cannot be correlated: {}",
                    message.sequence_number(),
                    e
                );
                self.settle(&message).await?;
                Ok(ReceiveOutcome::Discarded)
            }
        }
    }

    /// Completes a message previously returned by this consumer.
    pub async fn complete_message(&mut self, message: &BrokeredMessage) -> RelayResult<()> {
        let Some(received) = self.in_flight.remove(&message.sequence) else {
            return Err(RelayError::MessageCompleteFailed(format!(
                "Message {} (sequence {}) was not received by this session",
                message.id, message.sequence
            )));
        };
        self.settle(&received).await
    }

    async fn settle(&self, message: &ServiceBusReceivedMessage) -> RelayResult<()> {
        let mut guard = self.receiver.lock().await;
        if let Some(receiver) = guard.as_mut() {
            receiver
                .complete_message(message)
                .await
                .map_err(|e| RelayError::MessageCompleteFailed(e.to_string()))
        } else {
            Err(RelayError::MessageCompleteFailed(
                "Receiver already disposed".to_string(),
            ))
        }
    }

    pub async fn dispose(&mut self) -> RelayResult<()> {
        if !self.in_flight.is_empty() {
            log::debug!(
                "Disposing session receiver with {} unsettled messages",
                self.in_flight.len()
            );
            self.in_flight.clear();
        }

        let mut guard = self.receiver.lock().await;
        if let Some(receiver) = guard.take() {
            receiver
                .dispose()
                .await
                .map_err(|e| RelayError::ReceiverFailed(format!("Failed to dispose: {e}")))?;
        }
        Ok(())
    }
}

pub trait ServiceBusClientSessionExt {
    /// Accepts the named session on a session-enabled queue.
    fn accept_session_consumer(
        &mut self,
        queue_name: impl Into<String> + Send,
        session_id: impl Into<String> + Send,
    ) -> impl Future<Output = RelayResult<SessionConsumer>>;

    /// Accepts whichever session has messages waiting.
    fn accept_next_session_consumer(
        &mut self,
        queue_name: impl Into<String> + Send,
    ) -> impl Future<Output = RelayResult<SessionConsumer>>;
}

impl<RP> ServiceBusClientSessionExt for ServiceBusClient<RP>
where
    RP: azservicebus::ServiceBusRetryPolicy
        + From<azservicebus::ServiceBusRetryOptions>
        + Send
        + Sync
        + 'static,
{
    async fn accept_session_consumer(
        &mut self,
        queue_name: impl Into<String> + Send,
        session_id: impl Into<String> + Send,
    ) -> RelayResult<SessionConsumer> {
        let queue_name = queue_name.into();
        let session_id = session_id.into();
        let receiver = self
            .accept_session_for_queue(
                queue_name.clone(),
                session_id.clone(),
                ServiceBusSessionReceiverOptions::default(),
            )
            .await
            .map_err(|e| {
                RelayError::ReceiverFailed(format!(
                    "Failed to accept session {session_id} on {queue_name}: {e}"
                ))
            })?;

        Ok(SessionConsumer::new(receiver))
    }

    async fn accept_next_session_consumer(
        &mut self,
        queue_name: impl Into<String> + Send,
    ) -> RelayResult<SessionConsumer> {
        let queue_name = queue_name.into();
        let receiver = self
            .accept_next_session_for_queue(
                queue_name.clone(),
                ServiceBusSessionReceiverOptions::default(),
            )
            .await
            .map_err(|e| {
                RelayError::ReceiverFailed(format!(
                    "Failed to accept next session on {queue_name}: {e}"
                ))
            })?;

        Ok(SessionConsumer::new(receiver))
    }
}
