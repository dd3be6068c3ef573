use crate::client::Connection;
use crate::common::{RelayError, RelayResult};
use crate::config::{DEFAULT_MAX_RESPONSE_WAIT, ProcessorConfig};
use crate::correlation::AwaitOutcome;
use crate::model::BrokeredMessage;
use crate::requests::messages::{
    AddContactToMarketingListByEmailRequest, AddContactToMarketingListByIdRequest, ContactKey,
    EmailDispatch, PartialContactUpdateRequest, RemoveContactFromMarketingListByEmailRequest,
    RemoveContactFromMarketingListByIdRequest, SendEmailMessageByEmailRequest,
    SendEmailMessageByIdRequest, SendEmailMessageResponse,
};
use crate::requests::models::PartialContactUpdateItem;
use crate::requests::{ApiRequest, RequestEnvelope, ResponseEnvelope, TypedReply};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Sends typed requests over a connection and decodes their replies.
///
/// # Examples
///
/// ```no_run
/// use server::client::RelayClient;
/// use server::processor::RequestProcessor;
/// use server::requests::messages::DeleteMarketingListRequest;
/// use server::transport::InMemoryTransport;
/// use std::sync::Arc;
///
/// # async fn example() -> server::common::RelayResult<()> {
/// let client = RelayClient::new();
/// let connection = client.connect(None, Arc::new(InMemoryTransport::new())).await?;
/// let processor = RequestProcessor::new(connection);
/// let reply = processor
///     .process(DeleteMarketingListRequest { marketing_list_id: uuid::Uuid::new_v4() })
///     .await?;
/// println!("{:?}", reply.message);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestProcessor {
    connection: Arc<Connection>,
    max_response_wait: Duration,
}

impl RequestProcessor {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            max_response_wait: DEFAULT_MAX_RESPONSE_WAIT,
        }
    }

    pub fn from_config(connection: Arc<Connection>, config: &ProcessorConfig) -> Self {
        Self::new(connection).with_max_response_wait(config.max_response_wait())
    }

    /// Overrides the reply wait. Zero keeps the current value.
    pub fn with_max_response_wait(mut self, wait: Duration) -> Self {
        if !wait.is_zero() {
            self.max_response_wait = wait;
        }
        self
    }

    pub fn max_response_wait(&self) -> Duration {
        self.max_response_wait
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Validates and sends `request`, then waits for and decodes its reply.
    ///
    /// A reply with `succeeded: false` is still returned; only error payloads,
    /// foreign response types, timeouts and a closed session become errors.
    pub async fn process<R: ApiRequest>(&self, mut request: R) -> RelayResult<TypedReply<R::Response>> {
        let command = R::REQUEST_TYPE;
        request.validate()?;

        let envelope = RequestEnvelope::from_request(&request)?;
        let message_id = self.send_raw(envelope).await?;
        log::debug!("{command}, MessageId:{message_id}");

        let reply = self
            .wait_for(command, &message_id, self.max_response_wait)
            .await?;
        log::debug!("Received response as {}", reply.id);

        let (payload, status) =
            ResponseEnvelope::from_message(&reply)?.into_typed::<R::Response>(command)?;
        if !status.succeeded {
            log::warn!(
                "{command} has failed: {}",
                status.message.as_deref().unwrap_or("no message")
            );
        }

        Ok(TypedReply {
            message_id,
            succeeded: status.succeeded,
            message: status.message,
            payload,
        })
    }

    /// Sends a prebuilt envelope, stamped with this connection's session.
    pub async fn send_raw(&self, envelope: RequestEnvelope) -> RelayResult<String> {
        let body = envelope
            .with_session(self.connection.session_id())
            .to_bytes()?;
        self.connection.send(body).await
    }

    /// Waits for any reply by message ID, without decoding it.
    pub async fn get_response(
        &self,
        message_id: &str,
        timeout: Duration,
    ) -> RelayResult<BrokeredMessage> {
        self.wait_for("GetResponse", message_id, timeout).await
    }

    /// Every reply parked for a request nobody has asked about yet.
    pub fn drain_buffered(&self) -> Vec<BrokeredMessage> {
        self.connection.drain_buffered()
    }

    async fn wait_for(
        &self,
        command: &str,
        message_id: &str,
        timeout: Duration,
    ) -> RelayResult<BrokeredMessage> {
        match self.connection.await_reply(message_id, timeout).await? {
            AwaitOutcome::Matched(reply) => Ok(reply),
            AwaitOutcome::TimedOut => Err(RelayError::Timeout {
                command: command.to_string(),
                timeout,
            }),
            AwaitOutcome::NoResponse => Err(RelayError::NoResponse {
                command: command.to_string(),
            }),
        }
    }

    /// Adds a contact to a list, by ID or by email address.
    ///
    /// Returns whether the contact was added.
    pub async fn add_contact_to_marketing_list(
        &self,
        marketing_list_id: Uuid,
        contact: ContactKey,
    ) -> RelayResult<bool> {
        let reply = match contact {
            ContactKey::Id(contact_id) => {
                self.process(AddContactToMarketingListByIdRequest {
                    marketing_list_id,
                    contact_id,
                })
                .await?
            }
            ContactKey::Email(contact_email) => {
                self.process(AddContactToMarketingListByEmailRequest {
                    marketing_list_id,
                    contact_email,
                })
                .await?
            }
        };
        Ok(reply.payload.successfully_added)
    }

    /// Removes a contact from a list, by ID or by email address.
    ///
    /// Returns whether the contact was removed.
    pub async fn remove_contact_from_marketing_list(
        &self,
        marketing_list_id: Uuid,
        contact: ContactKey,
    ) -> RelayResult<bool> {
        let reply = match contact {
            ContactKey::Id(contact_id) => {
                self.process(RemoveContactFromMarketingListByIdRequest {
                    marketing_list_id,
                    contact_id,
                })
                .await?
            }
            ContactKey::Email(contact_email) => {
                self.process(RemoveContactFromMarketingListByEmailRequest {
                    marketing_list_id,
                    contact_email,
                })
                .await?
            }
        };
        Ok(reply.payload.successfully_removed)
    }

    /// Applies a partial update to one contact. Returns whether it was applied.
    pub async fn update_contact_fields(
        &self,
        item: PartialContactUpdateItem,
        enable_creation_or_update_of_company: bool,
    ) -> RelayResult<bool> {
        let reply = self
            .process(PartialContactUpdateRequest {
                partial_contact_update_item: item,
                enable_creation_or_update_of_company,
            })
            .await?;
        Ok(reply.succeeded)
    }

    /// Sends an email to a recipient given by contact ID or email address.
    pub async fn send_email_message(
        &self,
        dispatch: EmailDispatch,
        recipient: ContactKey,
    ) -> RelayResult<TypedReply<SendEmailMessageResponse>> {
        match recipient {
            ContactKey::Id(recipient_id) => {
                self.process(SendEmailMessageByIdRequest {
                    dispatch,
                    recipient_id,
                })
                .await
            }
            ContactKey::Email(recipient_email_address) => {
                self.process(SendEmailMessageByEmailRequest {
                    dispatch,
                    recipient_email_address,
                })
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::ReplyWaitPolicy;
    use crate::transport::InMemoryTransport;

    fn processor(transport: &InMemoryTransport) -> RequestProcessor {
        let connection = Arc::new(Connection::new(
            "s",
            Arc::new(transport.clone()),
            ReplyWaitPolicy::Deadline,
        ));
        RequestProcessor::new(connection)
    }

    #[test]
    fn test_zero_wait_is_ignored() {
        let processor = processor(&InMemoryTransport::new())
            .with_max_response_wait(Duration::ZERO);
        assert_eq!(processor.max_response_wait(), DEFAULT_MAX_RESPONSE_WAIT);

        let processor = processor.with_max_response_wait(Duration::from_secs(3));
        assert_eq!(processor.max_response_wait(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_send_raw_stamps_session_in_envelope() {
        let transport = InMemoryTransport::new();
        let processor = processor(&transport);

        let id = processor
            .send_raw(RequestEnvelope::new("PingRequest", serde_json::Value::Null))
            .await
            .unwrap();

        let sent = transport.sent_requests();
        assert_eq!(sent[0].message_id, id);
        let envelope: RequestEnvelope = serde_json::from_slice(&sent[0].body).unwrap();
        assert_eq!(envelope.session_id.as_deref(), Some("s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_response_times_out_with_command_name() {
        let processor = processor(&InMemoryTransport::new());
        let err = processor
            .get_response("missing", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_sent() {
        let transport = InMemoryTransport::new();
        let processor = processor(&transport);

        let result = processor
            .add_contact_to_marketing_list(Uuid::nil(), ContactKey::Email("a@b.c".to_string()))
            .await;

        assert!(matches!(result, Err(RelayError::Validation { .. })));
        assert!(transport.sent_requests().is_empty());
    }
}
