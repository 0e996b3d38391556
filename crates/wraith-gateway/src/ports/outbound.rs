//! Outbound ports for the gateway.
//!
//! The engine never touches storage, cryptography or the wall clock
//! directly; it goes through these traits so each can be swapped out and
//! the time-dependent rules can be tested with a manual clock.

use crate::domain::error::StoreResult;
use crate::domain::settings::SettingKey;
use crate::domain::types::{BanEntry, ManagerAccount, Session, Timestamp};
use async_trait::async_trait;
use std::net::IpAddr;
use wraith_crypto::CryptoError;

/// Which population must be empty for a key rotation to go ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleScope {
    /// No manager session exists.
    NoSessions,
    /// No agent is marked online.
    NoAgents,
}

/// Computes the replacement for an existing (or absent) ban entry.
///
/// Runs while the store holds the entry, so the read-modify-write is atomic.
pub type BanUpdate = Box<dyn FnOnce(Option<BanEntry>) -> BanEntry + Send>;

/// Shared state behind every request: settings, sessions, bans, agent
/// presence and manager accounts.
///
/// Implementations must make each method atomic with respect to every other
/// method. In particular [`rotate_setting_if_idle`](Self::rotate_setting_if_idle)
/// checks the population and writes the key as one step.
#[async_trait]
pub trait StateStore: Send + Sync {
    // Settings

    async fn setting(&self, key: SettingKey) -> StoreResult<Option<String>>;

    async fn put_setting(&self, key: SettingKey, value: String) -> StoreResult<()>;

    /// Write `value` only if the key is absent. Returns whether it was written.
    async fn seed_setting(&self, key: SettingKey, value: String) -> StoreResult<bool>;

    /// Replace `key` with `value` only while `scope` is empty. Returns whether
    /// the key was replaced.
    async fn rotate_setting_if_idle(
        &self,
        key: SettingKey,
        value: String,
        scope: IdleScope,
    ) -> StoreResult<bool>;

    // Sessions

    /// Insert a new session. Fails with `Conflict` if the id is taken.
    async fn insert_session(&self, session: Session) -> StoreResult<()>;

    async fn session(&self, assigned_id: &str) -> StoreResult<Option<Session>>;

    /// Set `last_seen_at`. Returns false if the session is gone.
    async fn touch_session(&self, assigned_id: &str, at: Timestamp) -> StoreResult<bool>;

    async fn remove_session(&self, assigned_id: &str) -> StoreResult<bool>;

    /// Drop sessions last seen strictly before `cutoff`.
    async fn remove_sessions_seen_before(&self, cutoff: Timestamp) -> StoreResult<usize>;

    async fn session_count(&self) -> StoreResult<usize>;

    // Bans

    async fn ban(&self, ip: IpAddr) -> StoreResult<Option<BanEntry>>;

    /// Atomically replace the entry for `ip` with `update(existing)`.
    async fn update_ban(&self, ip: IpAddr, update: BanUpdate) -> StoreResult<BanEntry>;

    async fn remove_ban(&self, ip: IpAddr) -> StoreResult<bool>;

    /// Drop entries whose block window ended at or before `now`.
    async fn remove_bans_expired_at(&self, now: Timestamp) -> StoreResult<usize>;

    // Agent presence

    async fn touch_agent(&self, agent_id: &str, at: Timestamp) -> StoreResult<()>;

    async fn remove_agents_seen_before(&self, cutoff: Timestamp) -> StoreResult<usize>;

    async fn agent_count(&self) -> StoreResult<usize>;

    // Manager accounts

    async fn manager_account(&self, username: &str) -> StoreResult<Option<ManagerAccount>>;

    async fn put_manager_account(&self, account: ManagerAccount) -> StoreResult<()>;
}

/// Symmetric cipher over string keys.
///
/// `decrypt` must fail, not return garbage, when the key is wrong: the agent
/// path relies on that to try the switch key before the initial key.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], key: &str) -> Result<String, CryptoError>;

    fn decrypt(&self, ciphertext: &str, key: &str) -> Result<Vec<u8>, CryptoError>;
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            // Clock before Unix epoch - return 0 rather than panic
            .unwrap_or(0)
    }
}
