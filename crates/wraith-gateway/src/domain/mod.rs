//! Domain types for the gateway.
//!
//! Configuration, the rejection taxonomy, named settings and the records
//! kept in the state store.

pub mod config;
pub mod error;
pub mod settings;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, GatewayConfig};
pub use error::{
    GatewayError, RegistryError, RequestError, RequestResult, RespondError, StoreError,
    StoreResult,
};
pub use settings::SettingKey;
pub use types::*;
