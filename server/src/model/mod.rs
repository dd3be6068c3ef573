use azservicebus::ServiceBusReceivedMessage;
use azservicebus::prelude::ServiceBusPeekedMessage;
use azure_core::date::OffsetDateTime;
use serde::Serialize;
use serde::ser::Serializer;
use serde_json::Value;
use std::convert::TryFrom;

/// A reply taken off the response queue.
///
/// Correlation only ever looks at [`id`](BrokeredMessage::id); the remaining fields
/// are carried along for diagnostics and for decoding the payload.
///
/// # Examples
///
/// ```no_run
/// use server::model::BrokeredMessage;
/// use azure_core::date::OffsetDateTime;
///
/// let reply = BrokeredMessage::new(
///     "3f2a6c0e9b6d4d0f8a51b2d0c4e1f7a9",
///     42,
///     Some("session-1".to_string()),
///     OffsetDateTime::now_utc(),
///     br#"{"type":"DeleteMarketingListResponse","succeeded":true}"#.to_vec(),
/// );
/// assert_eq!(reply.id, "3f2a6c0e9b6d4d0f8a51b2d0c4e1f7a9");
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct BrokeredMessage {
    /// Message ID, equal to the ID of the request this reply answers
    pub id: String,
    /// Sequence number assigned by the broker
    pub sequence: i64,
    /// Session tag the reply was routed with
    pub session_id: Option<String>,
    /// When the broker enqueued the reply
    pub enqueued_at: OffsetDateTime,
    /// Raw payload
    pub body: Vec<u8>,
}

impl BrokeredMessage {
    pub fn new(
        id: impl Into<String>,
        sequence: i64,
        session_id: Option<String>,
        enqueued_at: OffsetDateTime,
        body: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            sequence,
            session_id,
            enqueued_at,
            body,
        }
    }

    /// Parses the body as JSON when possible, falling back to lossy UTF-8 text.
    pub fn body_data(&self) -> BodyData {
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(val) => BodyData::ValidJson(val),
            Err(_) => BodyData::RawString(String::from_utf8_lossy(&self.body).into_owned()),
        }
    }

    fn from_parts(
        id: Option<&str>,
        sequence: i64,
        session_id: Option<&str>,
        enqueued_at: OffsetDateTime,
        body: Option<&[u8]>,
    ) -> Result<Self, MessageModelError> {
        let id = id.ok_or(MessageModelError::MissingMessageId)?.to_string();
        let body = body.ok_or(MessageModelError::MissingMessageBody)?.to_vec();

        Ok(Self {
            id,
            sequence,
            session_id: session_id.map(|s| s.to_string()),
            enqueued_at,
            body,
        })
    }
}

/// A request on its way to the request queue.
///
/// The message ID is assigned by the producer when the message is built, so the
/// caller knows which reply to wait for before the broker has seen the request.
#[derive(Clone, PartialEq, Debug)]
pub struct OutboundMessage {
    pub message_id: String,
    pub session_id: Option<String>,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Creates a message with a fresh, hyphen-less UUID as its ID.
    pub fn new(body: Vec<u8>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().simple().to_string(), body)
    }

    pub fn with_id(message_id: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            message_id: message_id.into(),
            session_id: None,
            body,
        }
    }

    /// Stamps the session replies should be routed back to.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Represents the body content of a reply for display.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyData {
    /// Body contains valid JSON data
    ValidJson(Value),
    /// Body contains raw string data (including invalid JSON)
    RawString(String),
}

impl Serialize for BodyData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            BodyData::ValidJson(val) => val.serialize(serializer),
            BodyData::RawString(s) => serializer.serialize_str(s),
        }
    }
}

impl std::fmt::Display for BodyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyData::ValidJson(val) => write!(f, "{val}"),
            BodyData::RawString(s) => f.write_str(s),
        }
    }
}

/// Errors that can occur when converting broker messages to [`BrokeredMessage`].
#[derive(Debug, thiserror::Error)]
pub enum MessageModelError {
    #[error("message has no message ID")]
    MissingMessageId,
    #[error("message has no body")]
    MissingMessageBody,
}

impl TryFrom<&ServiceBusReceivedMessage> for BrokeredMessage {
    type Error = MessageModelError;

    fn try_from(msg: &ServiceBusReceivedMessage) -> Result<Self, Self::Error> {
        BrokeredMessage::from_parts(
            msg.message_id().as_deref(),
            msg.sequence_number(),
            msg.session_id(),
            msg.enqueued_time(),
            msg.body().ok(),
        )
    }
}

impl TryFrom<ServiceBusPeekedMessage> for BrokeredMessage {
    type Error = MessageModelError;

    fn try_from(msg: ServiceBusPeekedMessage) -> Result<Self, Self::Error> {
        BrokeredMessage::from_parts(
            msg.message_id().as_deref(),
            msg.sequence_number(),
            msg.session_id(),
            msg.enqueued_time(),
            msg.body().ok(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_ids_are_unique_and_hyphenless() {
        let a = OutboundMessage::new(b"{}".to_vec());
        let b = OutboundMessage::new(b"{}".to_vec());
        assert_ne!(a.message_id, b.message_id);
        assert_eq!(a.message_id.len(), 32);
        assert!(!a.message_id.contains('-'));
        assert!(a.session_id.is_none());
    }

    #[test]
    fn test_with_session_stamps_session() {
        let msg = OutboundMessage::with_id("m-1", Vec::new()).with_session("s-1");
        assert_eq!(msg.session_id.as_deref(), Some("s-1"));
        assert_eq!(msg.message_id, "m-1");
    }

    #[test]
    fn test_body_data_falls_back_to_text() {
        let now = OffsetDateTime::now_utc();
        let json = BrokeredMessage::new("a", 1, None, now, br#"{"x":1}"#.to_vec());
        let text = BrokeredMessage::new("b", 2, None, now, b"plain".to_vec());

        assert!(matches!(json.body_data(), BodyData::ValidJson(_)));
        assert_eq!(text.body_data(), BodyData::RawString("plain".to_string()));
        assert_eq!(text.body_data().to_string(), "plain");
    }
}
