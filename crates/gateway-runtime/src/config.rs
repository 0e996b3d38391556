//! Configuration loading: optional JSON file, then `WRAITH_*` environment
//! overrides, then validation.

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};
use wraith_gateway::GatewayConfig;

/// Load the gateway configuration.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: GatewayConfig = serde_json::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            info!(path = %path.display(), "Loaded configuration file");
            config
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
        .validate()
        .context("invalid gateway configuration")?;
    Ok(config)
}

/// Apply `WRAITH_*` overrides. Unparsable values are ignored with a warning.
pub fn apply_env_overrides(config: &mut GatewayConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = parse_override(&var, "WRAITH_HOST") {
        config.http.host = host;
    }
    if let Some(port) = parse_override(&var, "WRAITH_PORT") {
        config.http.port = port;
    }
    if let Some(prefix) = var("WRAITH_API_PREFIX") {
        config.defaults.api_prefix = prefix;
    }
    if let Some(fingerprint) = var("WRAITH_API_FINGERPRINT") {
        config.defaults.api_fingerprint = Some(fingerprint);
    }
    if let Some(key) = var("WRAITH_INITIAL_CRYPT_KEY") {
        info!("Loaded initial agent key from environment");
        config.defaults.wraith_initial_crypt_key = Some(key);
    }
    if let Some(name) = var("WRAITH_SERVER_NAME") {
        config.discovery.server_name = name;
    }
    if let Some(scheme) = var("WRAITH_PUBLIC_SCHEME") {
        config.discovery.scheme = scheme;
    }
    if let Some(lock) = parse_override(&var, "WRAITH_SESSION_IP_LOCK") {
        config.sessions.ip_lock = lock;
    }
}

fn parse_override<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
