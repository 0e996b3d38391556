//! Named settings held in the state store.

use crate::domain::config::SettingsDefaults;
use crate::domain::error::{StoreError, StoreResult};
use crate::ports::outbound::StateStore;
use std::fmt;
use wraith_crypto::random_secret;

/// Entropy, in bytes, of generated keys and fingerprints.
pub const GENERATED_SECRET_BYTES: usize = 32;

/// Every setting the gateway reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    ApiPrefix,
    ApiFingerprint,
    WraithInitialCryptKey,
    WraithSwitchCryptKey,
    ManagementFirstLayerEncryptionKey,
    ManagementSessionExpiryDelay,
    ManagementBruteForceTimeoutSeconds,
    ManagementBruteForceMaxAttempts,
    WraithMarkOfflineDelay,
}

impl SettingKey {
    pub const ALL: [SettingKey; 9] = [
        Self::ApiPrefix,
        Self::ApiFingerprint,
        Self::WraithInitialCryptKey,
        Self::WraithSwitchCryptKey,
        Self::ManagementFirstLayerEncryptionKey,
        Self::ManagementSessionExpiryDelay,
        Self::ManagementBruteForceTimeoutSeconds,
        Self::ManagementBruteForceMaxAttempts,
        Self::WraithMarkOfflineDelay,
    ];

    /// Stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiPrefix => "APIPrefix",
            Self::ApiFingerprint => "APIFingerprint",
            Self::WraithInitialCryptKey => "wraithInitialCryptKey",
            Self::WraithSwitchCryptKey => "wraithSwitchCryptKey",
            Self::ManagementFirstLayerEncryptionKey => "managementFirstLayerEncryptionKey",
            Self::ManagementSessionExpiryDelay => "managementSessionExpiryDelay",
            Self::ManagementBruteForceTimeoutSeconds => "managementBruteForceTimeoutSeconds",
            Self::ManagementBruteForceMaxAttempts => "managementBruteForceMaxAttempts",
            Self::WraithMarkOfflineDelay => "wraithMarkOfflineDelay",
        }
    }

    /// Keys whose values must never appear in logs.
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            Self::WraithInitialCryptKey
                | Self::WraithSwitchCryptKey
                | Self::ManagementFirstLayerEncryptionKey
        )
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read a setting that must exist.
pub async fn require(store: &dyn StateStore, key: SettingKey) -> StoreResult<String> {
    store
        .setting(key)
        .await?
        .ok_or(StoreError::MissingSetting(key.as_str()))
}

/// Read a numeric setting (seconds or counts).
pub async fn require_u64(store: &dyn StateStore, key: SettingKey) -> StoreResult<u64> {
    let raw = require(store, key).await?;
    raw.trim()
        .parse()
        .map_err(|_| StoreError::InvalidSetting {
            key: key.as_str(),
            value: raw,
        })
}

/// Seed every missing setting from `defaults`, generating absent secrets.
///
/// Returns how many settings were written. Existing values are left alone.
pub async fn seed(store: &dyn StateStore, defaults: &SettingsDefaults) -> StoreResult<usize> {
    let mut seeded = 0;
    for key in SettingKey::ALL {
        let value = match key {
            SettingKey::ApiPrefix => defaults.api_prefix.clone(),
            SettingKey::ApiFingerprint => defaults
                .api_fingerprint
                .clone()
                .unwrap_or_else(|| random_secret(GENERATED_SECRET_BYTES)),
            SettingKey::WraithInitialCryptKey => defaults
                .wraith_initial_crypt_key
                .clone()
                .unwrap_or_else(|| random_secret(GENERATED_SECRET_BYTES)),
            SettingKey::WraithSwitchCryptKey | SettingKey::ManagementFirstLayerEncryptionKey => {
                random_secret(GENERATED_SECRET_BYTES)
            }
            SettingKey::ManagementSessionExpiryDelay => {
                defaults.session_expiry.as_secs().to_string()
            }
            SettingKey::ManagementBruteForceTimeoutSeconds => {
                defaults.brute_force_timeout.as_secs().to_string()
            }
            SettingKey::ManagementBruteForceMaxAttempts => {
                defaults.brute_force_max_attempts.to_string()
            }
            SettingKey::WraithMarkOfflineDelay => defaults.agent_offline_delay.as_secs().to_string(),
        };

        if store.seed_setting(key, value).await? {
            if key.is_secret() {
                tracing::info!(setting = %key, "seeded setting with generated secret");
            } else {
                tracing::debug!(setting = %key, "seeded setting");
            }
            seeded += 1;
        }
    }
    Ok(seeded)
}
