//! Failed-login throttling per source address.
//!
//! An address starts with `maxAttempts` tries. Each failure uses one up and
//! pushes the block window out to `now + timeout`; once none are left the
//! address is rejected outright until the window passes, after which the
//! entry is purged and the address starts over.

use crate::domain::error::StoreResult;
use crate::domain::settings::{self, SettingKey};
use crate::domain::types::BanEntry;
use crate::ports::outbound::{StateStore, TimeSource};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reason attached to bans recorded by autoconf.
pub const FAILED_LOGIN_REASON: &str = "too many failed login attempts";

#[derive(Clone)]
pub struct BanRegistry {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn TimeSource>,
}

impl BanRegistry {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn TimeSource>) -> Self {
        Self { store, clock }
    }

    /// Record one failure for `ip` and return the updated entry.
    pub async fn record_failure(
        &self,
        ip: IpAddr,
        block_duration_secs: u64,
        max_attempts: u32,
        reason: Option<String>,
    ) -> StoreResult<BanEntry> {
        let now = self.clock.now();
        let blocked_until = now.saturating_add(block_duration_secs);

        let entry = self
            .store
            .update_ban(
                ip,
                Box::new(move |existing: Option<BanEntry>| {
                    let attempts_remaining = match existing {
                        Some(entry) if !entry.is_expired(now) => {
                            entry.attempts_remaining.saturating_sub(1)
                        }
                        _ => max_attempts.saturating_sub(1),
                    };
                    BanEntry {
                        ip,
                        attempts_remaining,
                        blocked_until,
                        reason,
                    }
                }),
            )
            .await?;

        if entry.attempts_remaining == 0 {
            warn!(
                ip = %ip,
                blocked_until = entry.blocked_until,
                "address blocked after repeated failures"
            );
        } else {
            info!(
                ip = %ip,
                attempts_remaining = entry.attempts_remaining,
                "failed attempt recorded"
            );
        }
        Ok(entry)
    }

    /// Record a failed autoconf using the brute-force settings.
    pub async fn record_login_failure(&self, ip: IpAddr) -> StoreResult<BanEntry> {
        let store = self.store.as_ref();
        let timeout =
            settings::require_u64(store, SettingKey::ManagementBruteForceTimeoutSeconds).await?;
        let max_attempts =
            settings::require_u64(store, SettingKey::ManagementBruteForceMaxAttempts).await?;
        let max_attempts = u32::try_from(max_attempts).unwrap_or(u32::MAX);

        self.record_failure(ip, timeout, max_attempts, Some(FAILED_LOGIN_REASON.to_string()))
            .await
    }

    /// Forget every failure for `ip`.
    pub async fn clear(&self, ip: IpAddr) -> StoreResult<bool> {
        let cleared = self.store.remove_ban(ip).await?;
        if cleared {
            debug!(ip = %ip, "ban entry cleared");
        }
        Ok(cleared)
    }

    /// Purge entries whose block window has passed.
    pub async fn expire_stale(&self) -> StoreResult<usize> {
        self.store.remove_bans_expired_at(self.clock.now()).await
    }

    /// The entry currently blocking `ip`, if any.
    pub async fn active_block(&self, ip: IpAddr) -> StoreResult<Option<BanEntry>> {
        let now = self.clock.now();
        Ok(self
            .store
            .ban(ip)
            .await?
            .filter(|entry| entry.is_blocking(now)))
    }

    pub async fn is_blocked(&self, ip: IpAddr) -> StoreResult<bool> {
        Ok(self.active_block(ip).await?.is_some())
    }
}
