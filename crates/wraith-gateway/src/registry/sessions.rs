//! Manager session lifecycle.

use crate::domain::error::{StoreError, StoreResult};
use crate::domain::settings::{self, SettingKey};
use crate::domain::types::{IpLock, Session};
use crate::ports::outbound::{StateStore, TimeSource};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use wraith_crypto::random_secret;

/// Entropy, in bytes, of a session token.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Creates, renews and reaps manager sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn TimeSource>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn TimeSource>) -> Self {
        Self { store, clock }
    }

    /// Create and persist a session with a fresh id and token.
    pub async fn create(&self, username: &str, creator_ip: IpLock) -> StoreResult<Session> {
        let now = self.clock.now();
        // A v4 collision is practically impossible, but an id must never be
        // handed out twice.
        let mut attempts = 0;
        loop {
            let session = Session {
                assigned_id: Uuid::new_v4().simple().to_string(),
                username: username.to_string(),
                session_token: random_secret(SESSION_TOKEN_BYTES),
                creator_ip,
                created_at: now,
                last_seen_at: now,
            };
            match self.store.insert_session(session.clone()).await {
                Ok(()) => {
                    info!(
                        session_id = %session.assigned_id,
                        username,
                        creator_ip = %creator_ip,
                        "manager session created"
                    );
                    return Ok(session);
                }
                Err(StoreError::Conflict(_)) if attempts < 3 => attempts += 1,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn lookup(&self, session_id: &str) -> StoreResult<Option<Session>> {
        self.store.session(session_id).await
    }

    /// Mark the session as used now. Returns false if it no longer exists.
    pub async fn renew(&self, session_id: &str) -> StoreResult<bool> {
        self.store.touch_session(session_id, self.clock.now()).await
    }

    pub async fn remove(&self, session_id: &str) -> StoreResult<bool> {
        let removed = self.store.remove_session(session_id).await?;
        if removed {
            info!(session_id, "manager session removed");
        }
        Ok(removed)
    }

    /// Purge sessions idle for longer than `managementSessionExpiryDelay`.
    pub async fn expire_stale(&self) -> StoreResult<usize> {
        let delay = self.expiry_delay().await?;
        let cutoff = self.clock.now().saturating_sub(delay);
        let purged = self.store.remove_sessions_seen_before(cutoff).await?;
        if purged > 0 {
            debug!(purged, "expired stale manager sessions");
        }
        Ok(purged)
    }

    pub async fn active_count(&self) -> StoreResult<usize> {
        self.store.session_count().await
    }

    /// Seconds a session may stay idle before it is reaped.
    pub async fn expiry_delay(&self) -> StoreResult<u64> {
        settings::require_u64(self.store.as_ref(), SettingKey::ManagementSessionExpiryDelay).await
    }
}

/// Heartbeat interval advertised to managers: a third of the expiry delay,
/// so two heartbeats can be missed before the session is reaped.
///
/// Whole numbers stay integers on the wire; anything else is sent as a
/// fraction.
pub fn update_interval(expiry_delay: u64) -> Value {
    if expiry_delay % 3 == 0 {
        Value::from(expiry_delay / 3)
    } else {
        Value::from(expiry_delay as f64 / 3.0)
    }
}
