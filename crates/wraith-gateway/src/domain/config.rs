//! Gateway configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Client address resolution
    pub security: SecurityConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Autoconf timing equalization
    pub autoconf: AutoconfConfig,
    /// Manager session policy
    pub sessions: SessionConfig,
    /// Initial values for settings missing from the store
    pub defaults: SettingsDefaults,
    /// Discovery URL reconstruction
    pub discovery: DiscoveryConfig,
    /// Background purge task
    pub housekeeping: HousekeepingConfig,
    /// Manager accounts provisioned at start-up
    pub managers: Vec<ManagerAccountConfig>,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.defaults.api_prefix;
        if prefix.is_empty() {
            return Err(ConfigError::InvalidPrefix("prefix cannot be empty".into()));
        }
        if prefix.contains('|') {
            return Err(ConfigError::InvalidPrefix(
                "prefix cannot contain '|'".into(),
            ));
        }

        if self.defaults.session_expiry.as_secs() == 0 {
            return Err(ConfigError::InvalidSetting(
                "session_expiry must be at least one second".into(),
            ));
        }
        if self.defaults.brute_force_max_attempts == 0 {
            return Err(ConfigError::InvalidSetting(
                "brute_force_max_attempts cannot be 0".into(),
            ));
        }
        if self.defaults.agent_offline_delay.as_secs() == 0 {
            return Err(ConfigError::InvalidSetting(
                "agent_offline_delay must be at least one second".into(),
            ));
        }

        if self.autoconf.min_delay > self.autoconf.max_delay {
            return Err(ConfigError::InvalidDelay(format!(
                "min_delay ({:?}) exceeds max_delay ({:?})",
                self.autoconf.min_delay, self.autoconf.max_delay
            )));
        }

        if self.housekeeping.enabled && self.housekeeping.interval.is_zero() {
            return Err(ConfigError::InvalidDelay(
                "housekeeping interval cannot be 0".into(),
            ));
        }

        for manager in &self.managers {
            if manager.username.is_empty() || manager.username.contains('|') {
                return Err(ConfigError::InvalidManager(format!(
                    "username {:?} must be non-empty and free of '|'",
                    manager.username
                )));
            }
            if manager.password_hash.is_empty() {
                return Err(ConfigError::InvalidManager(format!(
                    "manager {:?} has no password hash",
                    manager.username
                )));
            }
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
}

impl HttpConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Which peers may set `X-Forwarded-For`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Explicitly trusted reverse proxies
    pub trusted_proxies: Vec<IpAddr>,
    /// Trust loopback peers
    pub trust_localhost: bool,
    /// Trust RFC 1918 / unique-local peers
    pub trust_private_ranges: bool,
    /// Number of proxies between the client and the gateway
    pub proxy_count: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            trust_localhost: true,
            trust_private_ranges: false,
            proxy_count: 1,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Emit CORS headers at all
    pub enabled: bool,
    /// Allowed origins (`*` for any)
    pub allowed_origins: Vec<String>,
    /// Max age for preflight cache
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            max_age: Duration::from_secs(3600),
        }
    }
}

/// Randomized delay applied to every autoconf attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoconfConfig {
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl AutoconfConfig {
    /// No delay at all. Only meant for tests.
    pub fn immediate() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

impl Default for AutoconfConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1000),
        }
    }
}

/// Manager session policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lock new sessions to the address that created them
    pub ip_lock: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ip_lock: true }
    }
}

/// Values written for settings the store does not hold yet.
///
/// Secrets left as `None` are generated randomly at seeding time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDefaults {
    pub api_prefix: String,
    pub api_fingerprint: Option<String>,
    pub wraith_initial_crypt_key: Option<String>,
    #[serde(with = "humantime_serde")]
    pub session_expiry: Duration,
    #[serde(with = "humantime_serde")]
    pub brute_force_timeout: Duration,
    pub brute_force_max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub agent_offline_delay: Duration,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            api_prefix: "WRAITH".to_string(),
            api_fingerprint: None,
            wraith_initial_crypt_key: None,
            session_expiry: Duration::from_secs(12),
            brute_force_timeout: Duration::from_secs(300),
            brute_force_max_attempts: 3,
            agent_offline_delay: Duration::from_secs(16),
        }
    }
}

/// Discovery URL reconstruction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Scheme clients reach the gateway with (TLS usually ends at a proxy)
    pub scheme: String,
    /// Host used when the request names none
    pub server_name: String,
    /// Port used with `server_name`
    pub port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            server_name: "localhost".to_string(),
            port: 8080,
        }
    }
}

/// Background purge task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeepingConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
        }
    }
}

/// Manager account provisioned at start-up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerAccountConfig {
    pub username: String,
    /// Argon2 PHC string (`gateway-runtime hash-password`)
    pub password_hash: String,
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Unusable API prefix
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),
    /// Unusable settings default
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
    /// Unusable delay or interval
    #[error("invalid delay: {0}")]
    InvalidDelay(String),
    /// Unusable manager account
    #[error("invalid manager account: {0}")]
    InvalidManager(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s", or "500ms" would parse as "500m" seconds
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
