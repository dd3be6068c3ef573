//! Connection and processor settings.
//!
//! Values can come from a config file (through serde) or from `SERVICEBUS__*`
//! environment variables, which fill in anything the file leaves unset.

use crate::common::{RelayError, RelayResult};
use crate::correlation::ReplyWaitPolicy;
use crate::utils::env::EnvUtils;
use serde::Deserialize;
use std::time::Duration;
use zeroize::ZeroizeOnDrop;

const ENV_CONNECTION_STRING: &str = "SERVICEBUS__CONNECTION_STRING";
const ENV_NAMESPACE: &str = "SERVICEBUS__NAMESPACE";
const ENV_KEY_NAME: &str = "SERVICEBUS__SHARED_ACCESS_KEY_NAME";
const ENV_KEY: &str = "SERVICEBUS__SHARED_ACCESS_KEY";
const ENV_REQUEST_QUEUE: &str = "SERVICEBUS__REQUEST_QUEUE";
const ENV_RESPONSE_QUEUE: &str = "SERVICEBUS__RESPONSE_QUEUE";
const ENV_SESSION_ID: &str = "SERVICEBUS__SESSION_ID";

/// Default wait for a typed reply.
pub const DEFAULT_MAX_RESPONSE_WAIT: Duration = Duration::from_secs(20);

/// Secret string cleared from memory on drop. Never printed.
#[derive(Clone, Deserialize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Where to connect and which queue pair to use.
///
/// Either `connection_string` or the `namespace` + `shared_access_key_name` +
/// `shared_access_key` triple must be available.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub connection_string: Option<Secret>,
    /// Namespace name (`contoso`) or host (`contoso.servicebus.windows.net`)
    pub namespace: Option<String>,
    pub shared_access_key_name: Option<String>,
    pub shared_access_key: Option<Secret>,
    pub request_queue: Option<String>,
    pub response_queue: Option<String>,
    /// Session for this connection; a fresh one is generated when absent
    pub session_id: Option<String>,
    /// Peek both queues while connecting so bad names fail early
    #[serde(default = "default_verify_queues")]
    pub verify_queues: bool,
}

fn default_verify_queues() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            namespace: None,
            shared_access_key_name: None,
            shared_access_key: None,
            request_queue: None,
            response_queue: None,
            session_id: None,
            verify_queues: default_verify_queues(),
        }
    }
}

impl ConnectionConfig {
    /// Builds a config from `SERVICEBUS__*` variables only.
    pub fn from_env() -> Self {
        Self::default().with_env_fallbacks()
    }

    /// Fills unset fields from the environment.
    pub fn with_env_fallbacks(mut self) -> Self {
        if self.connection_string.is_none() {
            self.connection_string = EnvUtils::get_optional_var(ENV_CONNECTION_STRING).map(Secret);
        }
        if self.namespace.is_none() {
            self.namespace = EnvUtils::get_optional_var(ENV_NAMESPACE);
        }
        if self.shared_access_key_name.is_none() {
            self.shared_access_key_name = EnvUtils::get_optional_var(ENV_KEY_NAME);
        }
        if self.shared_access_key.is_none() {
            self.shared_access_key = EnvUtils::get_optional_var(ENV_KEY).map(Secret);
        }
        if self.request_queue.is_none() {
            self.request_queue = EnvUtils::get_optional_var(ENV_REQUEST_QUEUE);
        }
        if self.response_queue.is_none() {
            self.response_queue = EnvUtils::get_optional_var(ENV_RESPONSE_QUEUE);
        }
        if self.session_id.is_none() {
            self.session_id = EnvUtils::get_optional_var(ENV_SESSION_ID);
        }
        self
    }

    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] if the request queue is not set
    pub fn request_queue(&self) -> RelayResult<&str> {
        non_empty(self.request_queue.as_deref()).ok_or_else(|| {
            RelayError::Configuration(format!(
                "{ENV_REQUEST_QUEUE} is required but not found in configuration or environment variables."
            ))
        })
    }

    /// # Errors
    ///
    /// Returns [`RelayError::Configuration`] if the response queue is not set
    pub fn response_queue(&self) -> RelayResult<&str> {
        non_empty(self.response_queue.as_deref()).ok_or_else(|| {
            RelayError::Configuration(format!(
                "{ENV_RESPONSE_QUEUE} is required but not found in configuration or environment variables."
            ))
        })
    }

    /// The configured session, or a fresh hyphen-less UUID.
    pub fn session_id_or_new(&self) -> String {
        non_empty(self.session_id.as_deref())
            .map(str::to_string)
            .unwrap_or_else(new_session_id)
    }

    /// Resolves the connection string, composing one from the namespace and
    /// shared access key when no full string is configured.
    pub fn connection_string(&self) -> RelayResult<Secret> {
        if let Some(conn) = &self.connection_string {
            if conn.expose().trim().is_empty() {
                return Err(RelayError::Configuration(
                    "Connection string cannot be empty".to_string(),
                ));
            }
            if !conn.expose().contains("Endpoint=") {
                return Err(RelayError::Configuration(
                    "Connection string must contain an Endpoint".to_string(),
                ));
            }
            return Ok(conn.clone());
        }

        let namespace = non_empty(self.namespace.as_deref());
        let key_name = non_empty(self.shared_access_key_name.as_deref());
        let key = self
            .shared_access_key
            .as_ref()
            .filter(|k| !k.expose().trim().is_empty());

        match (namespace, key_name, key) {
            (Some(namespace), Some(key_name), Some(key)) => {
                let host = if namespace.contains('.') {
                    namespace.to_string()
                } else {
                    format!("{namespace}.servicebus.windows.net")
                };
                Ok(Secret(format!(
                    "Endpoint=sb://{host}/;SharedAccessKeyName={key_name};SharedAccessKey={}",
                    key.expose()
                )))
            }
            _ => Err(RelayError::Configuration(format!(
                "Either {ENV_CONNECTION_STRING} or {ENV_NAMESPACE}, {ENV_KEY_NAME} and {ENV_KEY} must be set"
            ))),
        }
    }

    /// Checks everything needed to open a connection.
    pub fn validate(&self) -> RelayResult<()> {
        self.connection_string()?;
        self.request_queue()?;
        self.response_queue()?;
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A fresh session ID: a UUID v4 without hyphens.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Settings for [`RequestProcessor`](crate::processor::RequestProcessor).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorConfig {
    max_response_wait_secs: Option<u64>,
    wait_policy: Option<ReplyWaitPolicy>,
}

impl ProcessorConfig {
    pub fn new(max_response_wait: Duration, wait_policy: ReplyWaitPolicy) -> Self {
        Self {
            max_response_wait_secs: Some(max_response_wait.as_secs()),
            wait_policy: Some(wait_policy),
        }
    }

    /// Zero is treated as unset.
    pub fn max_response_wait(&self) -> Duration {
        self.max_response_wait_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_RESPONSE_WAIT)
    }

    pub fn wait_policy(&self) -> ReplyWaitPolicy {
        self.wait_policy.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queues() -> ConnectionConfig {
        ConnectionConfig {
            request_queue: Some("requests".to_string()),
            response_queue: Some("responses".to_string()),
            ..ConnectionConfig::default()
        }
    }

    #[test]
    fn test_connection_string_from_namespace() {
        let config = ConnectionConfig {
            namespace: Some("contoso".to_string()),
            shared_access_key_name: Some("RootManageSharedAccessKey".to_string()),
            shared_access_key: Some(Secret::new("abc=")),
            ..queues()
        };

        let conn = config.connection_string().unwrap();
        assert_eq!(
            conn.expose(),
            "Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=abc="
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_connection_string_wins() {
        let config = ConnectionConfig {
            connection_string: Some(Secret::new(
                "Endpoint=sb://a.servicebus.windows.net/;SharedAccessKeyName=k;SharedAccessKey=v",
            )),
            namespace: Some("ignored".to_string()),
            ..queues()
        };
        assert!(config.connection_string().unwrap().expose().contains("sb://a."));
    }

    #[test]
    fn test_connection_string_without_endpoint_is_rejected() {
        let config = ConnectionConfig {
            connection_string: Some(Secret::new("SharedAccessKey=v")),
            ..queues()
        };
        assert!(matches!(
            config.validate(),
            Err(RelayError::Configuration(_))
        ));
    }

    #[test]
    fn test_blank_queue_is_missing() {
        let config = ConnectionConfig {
            request_queue: Some("  ".to_string()),
            ..queues()
        };
        assert!(config.request_queue().is_err());
        assert_eq!(config.response_queue().unwrap(), "responses");
    }

    #[test]
    fn test_session_defaults_to_fresh_uuid() {
        let config = queues();
        let a = config.session_id_or_new();
        let b = config.session_id_or_new();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);

        let fixed = ConnectionConfig {
            session_id: Some("fixed".to_string()),
            ..queues()
        };
        assert_eq!(fixed.session_id_or_new(), "fixed");
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = ConnectionConfig {
            shared_access_key: Some(Secret::new("super-secret")),
            ..queues()
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn test_processor_wait_ignores_zero() {
        let config: ProcessorConfig =
            serde_json::from_str(r#"{"max_response_wait_secs":0}"#).unwrap();
        assert_eq!(config.max_response_wait(), DEFAULT_MAX_RESPONSE_WAIT);
        assert_eq!(config.wait_policy(), ReplyWaitPolicy::Deadline);

        let config: ProcessorConfig = serde_json::from_str(
            r#"{"max_response_wait_secs":5,"wait_policy":"per_receive"}"#,
        )
        .unwrap();
        assert_eq!(config.max_response_wait(), Duration::from_secs(5));
        assert_eq!(config.wait_policy(), ReplyWaitPolicy::PerReceive);
    }
}
