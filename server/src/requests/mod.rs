//! # Typed Requests
//!
//! Requests travel as JSON envelopes naming their type and the session replies
//! should go to. Replies come back in a response envelope under the same message
//! ID, either of the expected response type or an `ErrorResponse`.
//!
//! ```text
//! {"type":"DeleteMarketingListRequest","sessionId":"...","payload":{"marketingListId":"..."}}
//! {"type":"DeleteMarketingListResponse","succeeded":true,"message":"Deleted","payload":{}}
//! ```

use crate::common::{RelayError, RelayResult};
use crate::model::BrokeredMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod messages;
pub mod models;
pub mod validation;

/// Wire type of the response sent back when the remote side fails a request.
pub const ERROR_RESPONSE_TYPE: &str = "ErrorResponse";

/// A request with a fixed wire type and a known response type.
pub trait ApiRequest: Serialize + Send + Sync {
    const REQUEST_TYPE: &'static str;
    type Response: ApiResponse;

    /// Checks the request before it is sent. May fill in derived values.
    fn validate(&mut self) -> RelayResult<()> {
        Ok(())
    }
}

pub trait ApiResponse: DeserializeOwned + Send {
    const RESPONSE_TYPE: &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub request_type: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl RequestEnvelope {
    pub fn new(request_type: impl Into<String>, payload: Value) -> Self {
        Self {
            request_type: request_type.into(),
            session_id: None,
            payload,
        }
    }

    pub fn from_request<R: ApiRequest>(request: &R) -> RelayResult<Self> {
        Ok(Self::new(R::REQUEST_TYPE, serde_json::to_value(request)?))
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn to_bytes(&self) -> RelayResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub response_type: String,
    #[serde(default)]
    pub succeeded: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_details: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl ResponseEnvelope {
    pub fn from_message(message: &BrokeredMessage) -> RelayResult<Self> {
        serde_json::from_slice(&message.body).map_err(|e| {
            RelayError::Serialization(format!("Reply {} is not a response envelope: {e}", message.id))
        })
    }

    pub fn is_error(&self) -> bool {
        self.response_type == ERROR_RESPONSE_TYPE
    }

    /// Decodes the payload as `T`, turning error payloads and foreign response
    /// types into errors. `command` names the request in error messages.
    pub fn into_typed<T: ApiResponse>(self, command: &str) -> RelayResult<(T, ReplyStatus)> {
        if self.is_error() {
            return Err(RelayError::Api {
                message: self.message.unwrap_or_default(),
                details: self.message_details.unwrap_or_default(),
            });
        }

        if self.response_type != T::RESPONSE_TYPE {
            return Err(RelayError::UnexpectedResponseType {
                command: command.to_string(),
                expected: T::RESPONSE_TYPE.to_string(),
                actual: self.response_type,
            });
        }

        let payload = match self.payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let typed = serde_json::from_value(payload).map_err(|e| {
            RelayError::Serialization(format!("{command} returned an unreadable payload: {e}"))
        })?;

        Ok((
            typed,
            ReplyStatus {
                succeeded: self.succeeded,
                message: self.message,
            },
        ))
    }
}

/// Outcome flags reported alongside a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyStatus {
    pub succeeded: bool,
    pub message: Option<String>,
}

/// A decoded reply together with the ID it was correlated on.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedReply<T> {
    pub message_id: String,
    pub succeeded: bool,
    pub message: Option<String>,
    pub payload: T,
}
