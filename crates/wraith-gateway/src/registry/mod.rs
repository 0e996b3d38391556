//! Registries over the shared state: manager sessions, bans and agent
//! presence.

pub mod agents;
pub mod bans;
pub mod sessions;

pub use agents::AgentRegistry;
pub use bans::{BanRegistry, FAILED_LOGIN_REASON};
pub use sessions::{update_interval, SessionRegistry};
