use crate::common::{RelayError, RelayResult};
use crate::model::OutboundMessage;
use azservicebus::{
    ServiceBusClient, ServiceBusMessage, ServiceBusSender, ServiceBusSenderOptions,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A wrapper around the Service Bus sender bound to the request queue.
///
/// The sender is protected by a mutex so a single producer can be shared by every
/// task sending requests through one connection. Once [`dispose`](Producer::dispose)
/// has run, sends fail instead of reaching a closed link.
///
/// # Examples
///
/// ```no_run
/// use server::producer::Producer;
/// use server::model::OutboundMessage;
/// use azservicebus::ServiceBusSender;
///
/// async fn example(sender: ServiceBusSender) -> Result<(), Box<dyn std::error::Error>> {
///     let producer = Producer::new(sender);
///     let message = OutboundMessage::new(b"{}".to_vec()).with_session("session-1");
///     let message_id = producer.send_message(message).await?;
///     println!("sent {message_id}");
///     producer.dispose().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Producer {
    sender: Arc<Mutex<Option<ServiceBusSender>>>,
}

impl PartialEq for Producer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sender, &other.sender)
    }
}

impl Producer {
    pub fn new(sender: ServiceBusSender) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Sends one request and returns its message ID unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MessageSendFailed`] if the sender has been disposed, the
    /// message ID or session ID is rejected, or the broker refuses the message.
    pub async fn send_message(&self, message: OutboundMessage) -> RelayResult<String> {
        let message_id = message.message_id.clone();
        let service_bus_message = Self::create_service_bus_message(message)?;

        let mut guard = self.sender.lock().await;
        let Some(sender) = guard.as_mut() else {
            return Err(RelayError::MessageSendFailed(
                "Sender already disposed".to_string(),
            ));
        };

        sender
            .send_message(service_bus_message)
            .await
            .map_err(|e| {
                RelayError::MessageSendFailed(format!("Failed to send message {message_id}: {e}"))
            })?;

        log::debug!("Sent request message {message_id}");
        Ok(message_id)
    }

    fn create_service_bus_message(message: OutboundMessage) -> RelayResult<ServiceBusMessage> {
        let OutboundMessage {
            message_id,
            session_id,
            body,
        } = message;

        let mut service_bus_message = ServiceBusMessage::new(body);
        if let Err(e) = service_bus_message.set_message_id(message_id.clone()) {
            return Err(RelayError::MessageSendFailed(format!(
                "Invalid message ID {message_id}: {e}"
            )));
        }

        if let Some(session_id) = session_id {
            if let Err(e) = service_bus_message.set_session_id(session_id.clone()) {
                return Err(RelayError::MessageSendFailed(format!(
                    "Invalid session ID {session_id}: {e}"
                )));
            }
        }

        Ok(service_bus_message)
    }

    /// Disposes the underlying sender. Later sends fail.
    pub async fn dispose(&self) -> RelayResult<()> {
        let mut guard = self.sender.lock().await;
        if let Some(sender) = guard.take() {
            sender
                .dispose()
                .await
                .map_err(|e| RelayError::InternalError(format!("Failed to dispose sender: {e}")))?;
        }
        Ok(())
    }
}

/// Extension trait for ServiceBusClient to create Producer instances.
pub trait ServiceBusClientProducerExt {
    fn create_producer_for_queue(
        &mut self,
        queue_name: impl Into<String> + Send,
        options: ServiceBusSenderOptions,
    ) -> impl std::future::Future<Output = RelayResult<Producer>>;
}

impl<RP> ServiceBusClientProducerExt for ServiceBusClient<RP>
where
    RP: azservicebus::ServiceBusRetryPolicy
        + From<azservicebus::ServiceBusRetryOptions>
        + Send
        + Sync
        + 'static,
{
    async fn create_producer_for_queue(
        &mut self,
        queue_name: impl Into<String> + Send,
        options: ServiceBusSenderOptions,
    ) -> RelayResult<Producer> {
        let queue_name = queue_name.into();
        let sender = self
            .create_sender(queue_name.clone(), options)
            .await
            .map_err(|e| {
                RelayError::ConnectionFailed(format!(
                    "Failed to create sender for queue {queue_name}: {e}"
                ))
            })?;

        Ok(Producer::new(sender))
    }
}
