//! Key resolution and payload decoding.
//!
//! # Agents
//!
//! Tried against the rotating switch key first, then the initial key. The key
//! that produced a JSON object becomes the response key.
//!
//! # Managers
//!
//! ```text
//! first-layer key  ->  ["<sessionID>", "<inner ciphertext>"]
//! session token    ->  {"reqType": ..., "sessionToken": ..., ...}
//! ```
//!
//! The session named by the outer layer must exist and accept the
//! requester's address before the inner layer is even attempted. Once the
//! inner layer decodes, the session token is the response key.

use crate::domain::error::{RequestError, RequestResult, StoreResult};
use crate::domain::settings::{self, SettingKey, GENERATED_SECRET_BYTES};
use crate::domain::types::{DecodedPayload, RequesterClass};
use crate::pipeline::response::ResponseEncoder;
use crate::ports::outbound::{Cipher, IdleScope, StateStore};
use crate::registry::SessionRegistry;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use wraith_crypto::random_secret;

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Decrypts payloads and decides which key a response is sealed with.
#[derive(Clone)]
pub struct KeyResolver {
    store: Arc<dyn StateStore>,
    cipher: Arc<dyn Cipher>,
    sessions: SessionRegistry,
}

impl KeyResolver {
    pub fn new(
        store: Arc<dyn StateStore>,
        cipher: Arc<dyn Cipher>,
        sessions: SessionRegistry,
    ) -> Self {
        Self {
            store,
            cipher,
            sessions,
        }
    }

    /// Replace the switch key if no agent is online.
    pub async fn rotate_switch_key(&self) -> StoreResult<bool> {
        self.rotate(SettingKey::WraithSwitchCryptKey, IdleScope::NoAgents)
            .await
    }

    /// Replace the first-layer key if no manager session exists.
    pub async fn rotate_first_layer_key(&self) -> StoreResult<bool> {
        self.rotate(
            SettingKey::ManagementFirstLayerEncryptionKey,
            IdleScope::NoSessions,
        )
        .await
    }

    async fn rotate(&self, key: SettingKey, scope: IdleScope) -> StoreResult<bool> {
        let rotated = self
            .store
            .rotate_setting_if_idle(key, random_secret(GENERATED_SECRET_BYTES), scope)
            .await?;
        if rotated {
            debug!(setting = %key, "rotated idle key");
        }
        Ok(rotated)
    }

    /// Decode `ciphertext` for `requester`, establishing the response key on
    /// `encoder` as soon as it is known.
    pub async fn resolve(
        &self,
        requester: RequesterClass,
        ciphertext: &str,
        requester_ip: IpAddr,
        encoder: &mut ResponseEncoder,
    ) -> RequestResult<DecodedPayload> {
        match requester {
            RequesterClass::Agent => self.resolve_agent(ciphertext, encoder).await,
            RequesterClass::Manager => {
                self.resolve_manager(ciphertext, requester_ip, encoder)
                    .await
            }
        }
    }

    async fn resolve_agent(
        &self,
        ciphertext: &str,
        encoder: &mut ResponseEncoder,
    ) -> RequestResult<DecodedPayload> {
        let store = self.store.as_ref();
        let switch_key = settings::require(store, SettingKey::WraithSwitchCryptKey).await?;

        let (value, key) = match self.decode_json(ciphertext, &switch_key) {
            Some(value) => (value, switch_key),
            None => {
                let initial_key =
                    settings::require(store, SettingKey::WraithInitialCryptKey).await?;
                match self.decode_json(ciphertext, &initial_key) {
                    Some(value) => (value, initial_key),
                    None => {
                        debug!("agent payload matched neither switch nor initial key");
                        return Err(RequestError::Malformed);
                    }
                }
            }
        };
        encoder.establish_key(key);

        DecodedPayload::from_value(value)
            .filter(|payload| payload.contains(DecodedPayload::REQ_TYPE))
            .ok_or(RequestError::Malformed)
    }

    async fn resolve_manager(
        &self,
        ciphertext: &str,
        requester_ip: IpAddr,
        encoder: &mut ResponseEncoder,
    ) -> RequestResult<DecodedPayload> {
        let first_layer = settings::require(
            self.store.as_ref(),
            SettingKey::ManagementFirstLayerEncryptionKey,
        )
        .await?;

        let outer = self
            .decode_json(ciphertext, &first_layer)
            .ok_or(RequestError::Malformed)?;
        let (session_id, inner) = match outer {
            Value::Array(mut parts) if parts.len() == 2 => {
                let inner = parts.pop().unwrap_or(Value::Null);
                let session_id = parts.pop().unwrap_or(Value::Null);
                (session_id, inner)
            }
            _ => {
                debug!("manager outer layer is not a two-element array");
                return Err(RequestError::Malformed);
            }
        };
        let session_id = session_id.as_str().ok_or(RequestError::InvalidSession)?;

        let session = self
            .sessions
            .lookup(session_id)
            .await?
            .ok_or(RequestError::InvalidSession)?;

        if !session.creator_ip.permits(requester_ip) {
            warn!(
                session_id,
                ip = %requester_ip,
                locked_to = %session.creator_ip,
                "session used from foreign address"
            );
            return Err(RequestError::IpMismatch { ip: requester_ip });
        }

        let inner_value = inner
            .as_str()
            .and_then(|inner| self.decode_json(inner, &session.session_token))
            .ok_or(RequestError::InvalidSession)?;
        encoder.establish_key(session.session_token.clone());

        let mut payload =
            DecodedPayload::from_value(inner_value).ok_or(RequestError::InvalidSession)?;
        if !payload.contains(DecodedPayload::REQ_TYPE)
            || !payload.contains(DecodedPayload::SESSION_TOKEN)
        {
            return Err(RequestError::Malformed);
        }

        let token_matches = payload
            .str_field(DecodedPayload::SESSION_TOKEN)
            .is_some_and(|supplied| constant_time_compare(supplied, &session.session_token));
        if !token_matches {
            warn!(session_id, ip = %requester_ip, "session token mismatch");
            return Err(RequestError::InvalidSession);
        }

        payload.insert(DecodedPayload::SESSION_ID, session_id);
        if !self.sessions.renew(session_id).await? {
            // Reaped between lookup and renewal
            info!(session_id, "session vanished during request");
            return Err(RequestError::InvalidSession);
        }
        Ok(payload)
    }

    /// Decrypt and parse as JSON. Any failure is `None`; JSON `null` counts
    /// as a failure too.
    fn decode_json(&self, ciphertext: &str, key: &str) -> Option<Value> {
        let plaintext = self.cipher.decrypt(ciphertext, key).ok()?;
        match serde_json::from_slice::<Value>(&plaintext) {
            Ok(Value::Null) | Err(_) => None,
            Ok(value) => Some(value),
        }
    }
}
