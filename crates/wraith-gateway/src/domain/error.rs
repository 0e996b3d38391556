//! Gateway error types.
//!
//! [`RequestError`] is the per-request rejection taxonomy. Each variant maps
//! onto exactly one wire message, and none of them carries internal detail:
//! store and cipher failures are logged where they happen and reach the
//! client as a generic malformed-request error.

use crate::domain::types::ResponseBody;
use std::net::IpAddr;
use wraith_crypto::CryptoError;

/// Wire messages, one per rejection kind.
pub mod messages {
    pub const MALFORMED: &str = "incorrectly formatted request";
    pub const UNSUPPORTED_PROTOCOL: &str = "unsupported protocol version";
    pub const BLOCKED: &str =
        "You have been blocked from accessing this resource. Please try again later.";
    pub const INVALID_SESSION: &str = "invalid session data";
    pub const AUTH_FAILURE: &str = "incorrect credentials";
    pub const NO_RESPONSE: &str = "no response generated";
    pub const UNSUPPORTED_METHOD: &str = "Unsupported method";
}

/// Terminal rejection of a single request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Bad prefix, identification character, ciphertext or payload shape.
    #[error("incorrectly formatted request")]
    Malformed,
    /// Version character not registered.
    #[error("unsupported protocol version")]
    UnsupportedProtocol {
        /// Registered version identifiers.
        supported: Vec<String>,
    },
    /// Source address is under an active ban.
    #[error("address is blocked")]
    Blocked {
        /// Reason recorded with the ban.
        reason: Option<String>,
    },
    /// Unknown session, token mismatch or undecodable inner layer.
    #[error("invalid session data")]
    InvalidSession,
    /// Session is locked to another address.
    #[error("your IP ({ip}) does not match the IP this session is locked to")]
    IpMismatch {
        /// Address the request came from.
        ip: IpAddr,
    },
    /// Autoconf credentials rejected.
    #[error("incorrect credentials")]
    AuthFailure,
    /// The handler returned without responding.
    #[error("no response generated")]
    NoResponse,
}

impl RequestError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnsupportedProtocol { .. } => "unsupported_protocol",
            Self::Blocked { .. } => "blocked",
            Self::InvalidSession => "invalid_session",
            Self::IpMismatch { .. } => "ip_mismatch",
            Self::AuthFailure => "auth_failure",
            Self::NoResponse => "no_response",
        }
    }

    /// The `{status: "ERROR", message, ...}` body sent to the client.
    pub fn to_response(&self) -> ResponseBody {
        match self {
            Self::Malformed => ResponseBody::error(messages::MALFORMED),
            Self::UnsupportedProtocol { supported } => {
                ResponseBody::error(messages::UNSUPPORTED_PROTOCOL)
                    .with("supportedProtocolVersions", supported.clone())
            }
            Self::Blocked { reason: None } => ResponseBody::error(messages::BLOCKED),
            Self::Blocked {
                reason: Some(reason),
            } => ResponseBody::error(format!("{} Reason: {reason}", messages::BLOCKED)),
            Self::InvalidSession => ResponseBody::error(messages::INVALID_SESSION),
            Self::IpMismatch { .. } => ResponseBody::error(self.to_string()),
            Self::AuthFailure => ResponseBody::error(messages::AUTH_FAILURE),
            Self::NoResponse => ResponseBody::error(messages::NO_RESPONSE),
        }
    }
}

impl From<StoreError> for RequestError {
    fn from(error: StoreError) -> Self {
        tracing::error!(error = %error, "state store failure, rejecting request");
        Self::Malformed
    }
}

impl From<CryptoError> for RequestError {
    fn from(error: CryptoError) -> Self {
        tracing::error!(error = %error, "cipher failure, rejecting request");
        Self::Malformed
    }
}

/// Request result alias.
pub type RequestResult<T> = Result<T, RequestError>;

/// State store failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Backend could not be reached.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
    /// A required setting has never been seeded.
    #[error("setting {0} is missing")]
    MissingSetting(&'static str),
    /// A stored setting does not parse as the expected type.
    #[error("setting {key} is invalid: {value:?}")]
    InvalidSetting {
        /// Setting name.
        key: &'static str,
        /// Stored value.
        value: String,
    },
    /// Insert collided with an existing record.
    #[error("record already exists: {0}")]
    Conflict(String),
}

/// Store result alias.
pub type StoreResult<T> = Result<T, StoreError>;

/// Protocol registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Version identifier already has a handler.
    #[error("protocol version '{0}' is already registered")]
    DuplicateVersion(char),
    /// Version identifiers are single ASCII characters.
    #[error("protocol version {0:?} is not a single printable ASCII character")]
    InvalidVersion(char),
}

/// A handler tried to transmit twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RespondError {
    #[error("a response has already been transmitted for this request")]
    AlreadyResponded,
}

/// Server-level errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration rejected.
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),
    /// Listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// Server loop failed.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
    /// Seeding the store failed.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_messages() {
        assert_eq!(
            RequestError::Malformed.to_response().message(),
            Some("incorrectly formatted request")
        );
        assert_eq!(
            RequestError::InvalidSession.to_response().message(),
            Some("invalid session data")
        );
        assert_eq!(
            RequestError::AuthFailure.to_response().message(),
            Some("incorrect credentials")
        );
        assert_eq!(
            RequestError::NoResponse.to_response().message(),
            Some("no response generated")
        );
    }

    #[test]
    fn test_unsupported_protocol_lists_versions() {
        let body = RequestError::UnsupportedProtocol {
            supported: vec!["1".into(), "4".into()],
        }
        .to_response();
        assert_eq!(body.status(), Some("ERROR"));
        assert_eq!(body.get("supportedProtocolVersions"), Some(&json!(["1", "4"])));
    }

    #[test]
    fn test_blocked_message_carries_reason() {
        let plain = RequestError::Blocked { reason: None }.to_response();
        assert_eq!(plain.message(), Some(messages::BLOCKED));

        let reasoned = RequestError::Blocked {
            reason: Some("too many failed login attempts".into()),
        }
        .to_response();
        assert_eq!(
            reasoned.message(),
            Some(
                "You have been blocked from accessing this resource. Please try again later. \
                 Reason: too many failed login attempts"
            )
        );
    }

    #[test]
    fn test_ip_mismatch_names_requester() {
        let body = RequestError::IpMismatch {
            ip: "198.51.100.4".parse().unwrap(),
        }
        .to_response();
        assert_eq!(
            body.message(),
            Some("your IP (198.51.100.4) does not match the IP this session is locked to")
        );
    }

    #[test]
    fn test_internal_failures_surface_as_malformed() {
        let from_store: RequestError = StoreError::Unavailable("down".into()).into();
        assert_eq!(from_store, RequestError::Malformed);

        let from_cipher: RequestError = CryptoError::DecryptionFailed("tag".into()).into();
        assert_eq!(from_cipher, RequestError::Malformed);
    }
}
