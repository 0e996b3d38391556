//! The request engine behind the HTTP surface.
//!
//! [`Gateway`] owns the registries, the key resolver and the protocol
//! registry and runs the three request channels:
//!
//! - **admission**: ban expiry and the blocked check, ahead of everything
//! - **autoconf** (`PUT`): manager login, answers with session config
//! - **protocol channel** (`POST`): classify, resolve keys, dispatch
//!
//! Every cycle purges stale agents, sessions and bans before any
//! authentication decision is taken.

use crate::credentials::{hash_password, reveal, verify_password};
use crate::domain::config::{AutoconfConfig, GatewayConfig};
use crate::domain::error::{GatewayError, RequestError, RequestResult, StoreResult};
use crate::domain::settings::{self, SettingKey};
use crate::domain::types::{IpLock, ManagerAccount, ResponseBody};
use crate::pipeline::classifier::classify;
use crate::pipeline::dispatch::{HandlerContext, ProtocolRegistry};
use crate::pipeline::keys::KeyResolver;
use crate::pipeline::response::ResponseEncoder;
use crate::ports::outbound::{Cipher, StateStore, TimeSource};
use crate::registry::{update_interval, AgentRegistry, BanRegistry, SessionRegistry};
use crate::API_VERSION;
use rand::Rng;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use wraith_crypto::random_secret;

type PasswordCheck = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Authentication and dispatch engine.
pub struct Gateway {
    store: Arc<dyn StateStore>,
    cipher: Arc<dyn Cipher>,
    clock: Arc<dyn TimeSource>,
    protocols: ProtocolRegistry,
    sessions: SessionRegistry,
    bans: BanRegistry,
    agents: AgentRegistry,
    keys: KeyResolver,
    autoconf_delay: AutoconfConfig,
    lock_sessions_to_ip: bool,
    password_check: PasswordCheck,
    /// Hash checked when the account does not exist.
    decoy_hash: OnceCell<String>,
}

impl Gateway {
    pub fn new(
        config: &GatewayConfig,
        store: Arc<dyn StateStore>,
        cipher: Arc<dyn Cipher>,
        clock: Arc<dyn TimeSource>,
        protocols: ProtocolRegistry,
    ) -> Self {
        let sessions = SessionRegistry::new(Arc::clone(&store), Arc::clone(&clock));
        let bans = BanRegistry::new(Arc::clone(&store), Arc::clone(&clock));
        let agents = AgentRegistry::new(Arc::clone(&store), Arc::clone(&clock));
        let keys = KeyResolver::new(Arc::clone(&store), Arc::clone(&cipher), sessions.clone());

        Self {
            store,
            cipher,
            clock,
            protocols,
            sessions,
            bans,
            agents,
            keys,
            autoconf_delay: config.autoconf.clone(),
            lock_sessions_to_ip: config.sessions.ip_lock,
            password_check: Arc::new(verify_password),
            decoy_hash: OnceCell::new(),
        }
    }

    /// Seed missing settings and provision configured manager accounts.
    pub async fn initialize(&self, config: &GatewayConfig) -> Result<(), GatewayError> {
        config.validate()?;

        let seeded = settings::seed(self.store.as_ref(), &config.defaults).await?;
        if self.decoy_hash().await.is_none() {
            warn!("decoy password hash unavailable, unknown usernames skip verification");
        }
        for manager in &config.managers {
            self.store
                .put_manager_account(ManagerAccount {
                    username: manager.username.clone(),
                    password_hash: manager.password_hash.clone(),
                })
                .await?;
        }

        info!(
            seeded_settings = seeded,
            managers = config.managers.len(),
            protocols = ?self.protocols.supported_versions(),
            "gateway state initialized"
        );
        Ok(())
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn bans(&self) -> &BanRegistry {
        &self.bans
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Admission check run before any other processing, whatever the verb.
    pub async fn admit(&self, ip: IpAddr) -> RequestResult<()> {
        self.bans.expire_stale().await?;
        if let Some(block) = self.bans.active_block(ip).await? {
            warn!(ip = %ip, blocked_until = block.blocked_until, "rejected blocked address");
            return Err(RequestError::Blocked {
                reason: block.reason,
            });
        }
        Ok(())
    }

    /// Purge everything that went stale. Runs at the top of every cycle and
    /// from the housekeeping task.
    pub async fn purge_stale(&self) -> StoreResult<()> {
        self.agents.expire_stale().await?;
        self.sessions.expire_stale().await?;
        self.bans.expire_stale().await?;
        Ok(())
    }

    /// Manager login. `body` is `username|sealed(password)`.
    ///
    /// Successful responses are sealed with the plaintext password and never
    /// prefixed; failures go out as plain JSON.
    pub async fn autoconf(&self, body: &[u8], ip: IpAddr) -> String {
        // Before any credential work, so valid and invalid usernames take
        // the same time.
        self.equalize_timing().await;

        let mut encoder = ResponseEncoder::new(Arc::clone(&self.cipher));
        let response = match self.try_autoconf(body, ip, &mut encoder).await {
            Ok(response) => response,
            Err(e) => {
                debug!(ip = %ip, kind = e.kind(), "autoconf rejected");
                e.to_response()
            }
        };
        encoder.encode(&response)
    }

    async fn try_autoconf(
        &self,
        body: &[u8],
        ip: IpAddr,
        encoder: &mut ResponseEncoder,
    ) -> RequestResult<ResponseBody> {
        self.purge_stale().await?;
        self.keys.rotate_first_layer_key().await?;

        let body = std::str::from_utf8(body).map_err(|_| RequestError::Malformed)?;
        if body.matches('|').count() != 1 {
            return Err(RequestError::Malformed);
        }
        let (username, sealed_password) = body.split_once('|').ok_or(RequestError::Malformed)?;

        let password = reveal(self.cipher.as_ref(), username, sealed_password);
        let verified = self
            .verify_credentials(username, password.as_deref().unwrap_or_default())
            .await?;
        let Some(password) = password.filter(|_| verified) else {
            let entry = self.bans.record_login_failure(ip).await?;
            warn!(
                ip = %ip,
                username,
                attempts_remaining = entry.attempts_remaining,
                "manager login failed"
            );
            return Err(RequestError::AuthFailure);
        };

        let creator_ip = if self.lock_sessions_to_ip {
            IpLock::Address(ip)
        } else {
            IpLock::Any
        };
        let session = self.sessions.create(username, creator_ip).await?;
        self.bans.clear(ip).await?;

        let store = self.store.as_ref();
        let config = serde_json::json!({
            "sessionID": session.assigned_id,
            "sessionToken": session.session_token,
            "updateInterval": update_interval(self.sessions.expiry_delay().await?),
            "APIPrefix": settings::require(store, SettingKey::ApiPrefix).await?,
            "firstLayerEncryptionKey":
                settings::require(store, SettingKey::ManagementFirstLayerEncryptionKey).await?,
            "APIVersion": API_VERSION,
            "APIFingerprint": settings::require(store, SettingKey::ApiFingerprint).await?,
        });

        encoder.establish_key(password);
        info!(ip = %ip, username, session_id = %session.assigned_id, "manager logged in");
        Ok(ResponseBody::success().with("config", config))
    }

    /// Every outcome runs exactly one Argon2 verification: unknown
    /// usernames are checked against the decoy hash and never match.
    async fn verify_credentials(&self, username: &str, password: &str) -> StoreResult<bool> {
        let (phc, known) = match self.store.manager_account(username).await? {
            Some(account) => (account.password_hash, true),
            None => match self.decoy_hash().await {
                Some(decoy) => (decoy.to_string(), false),
                None => return Ok(false),
            },
        };

        let check = Arc::clone(&self.password_check);
        let password = password.to_string();
        // Argon2 is slow; keep it off the async workers.
        match tokio::task::spawn_blocking(move || check(&password, &phc)).await {
            Ok(verified) => Ok(known && verified),
            Err(e) => {
                warn!(error = %e, "password verification task failed");
                Ok(false)
            }
        }
    }

    async fn decoy_hash(&self) -> Option<&str> {
        let hashed = self
            .decoy_hash
            .get_or_try_init(|| async {
                let secret = random_secret(32);
                match tokio::task::spawn_blocking(move || hash_password(&secret)).await {
                    Ok(hashed) => hashed.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
            })
            .await;
        match hashed {
            Ok(phc) => Some(phc.as_str()),
            Err(e) => {
                warn!(error = %e, "failed to build decoy password hash");
                None
            }
        }
    }

    async fn equalize_timing(&self) {
        let AutoconfConfig {
            min_delay,
            max_delay,
        } = self.autoconf_delay;
        let delay = if max_delay > min_delay {
            rand::thread_rng().gen_range(min_delay..=max_delay)
        } else {
            min_delay
        };
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
    }

    /// General protocol channel.
    pub async fn protocol_channel(&self, body: &[u8], ip: IpAddr) -> String {
        let mut encoder = ResponseEncoder::new(Arc::clone(&self.cipher));
        match self.admit_protocol_request(body, ip, &mut encoder).await {
            Ok((version, context)) => self.protocols.dispatch(version, context, encoder).await,
            Err(e) => {
                debug!(ip = %ip, kind = e.kind(), "protocol request rejected");
                encoder.encode(&e.to_response())
            }
        }
    }

    async fn admit_protocol_request(
        &self,
        body: &[u8],
        ip: IpAddr,
        encoder: &mut ResponseEncoder,
    ) -> RequestResult<(char, HandlerContext)> {
        self.purge_stale().await?;
        self.keys.rotate_switch_key().await?;

        let prefix = settings::require(self.store.as_ref(), SettingKey::ApiPrefix).await?;
        encoder.frame_with_prefix(prefix.clone());

        let body = std::str::from_utf8(body).map_err(|_| RequestError::Malformed)?;
        let classified = classify(body, &prefix, &self.protocols)?;
        let payload = self
            .keys
            .resolve(classified.requester, classified.ciphertext, ip, encoder)
            .await?;

        debug!(
            ip = %ip,
            requester = %classified.requester,
            version = %classified.version,
            req_type = ?payload.req_type(),
            "protocol request authenticated"
        );

        Ok((
            classified.version,
            HandlerContext {
                store: Arc::clone(&self.store),
                clock: Arc::clone(&self.clock),
                requester: classified.requester,
                requester_ip: ip,
                payload,
            },
        ))
    }
}
