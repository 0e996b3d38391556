//! Response encoding.
//!
//! The key a response is sealed with is whatever the key resolver managed to
//! establish for the request. Before that point there is no key and the
//! response goes out as plain JSON.

use crate::domain::error::RequestError;
use crate::domain::types::ResponseBody;
use crate::ports::outbound::Cipher;
use std::sync::Arc;
use tracing::error;

/// Serializes, seals and frames responses for one request.
pub struct ResponseEncoder {
    cipher: Arc<dyn Cipher>,
    prefix: Option<String>,
    key: Option<String>,
}

impl ResponseEncoder {
    /// Encoder with no key and no framing.
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        Self {
            cipher,
            prefix: None,
            key: None,
        }
    }

    /// Prepend `prefix` to sealed responses (protocol channel only).
    pub fn frame_with_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = Some(prefix.into());
    }

    /// Seal every later response with `key`.
    pub fn establish_key(&mut self, key: impl Into<String>) {
        self.key = Some(key.into());
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Produce the response body text.
    pub fn encode(&self, body: &ResponseBody) -> String {
        let json = match serde_json::to_string(body) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "response serialization failed");
                return fallback_json();
            }
        };

        let Some(key) = self.key.as_deref() else {
            return json;
        };

        match self.cipher.encrypt(json.as_bytes(), key) {
            Ok(sealed) => match &self.prefix {
                Some(prefix) => format!("{prefix}{sealed}"),
                None => sealed,
            },
            Err(e) => {
                error!(error = %e, "response encryption failed, sending generic error");
                fallback_json()
            }
        }
    }
}

fn fallback_json() -> String {
    serde_json::to_string(&RequestError::Malformed.to_response())
        .unwrap_or_else(|_| String::from(r#"{"status":"ERROR"}"#))
}
