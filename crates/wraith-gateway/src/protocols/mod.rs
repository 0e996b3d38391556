//! Protocol modules shipped with the gateway.

pub mod baseline;

pub use baseline::{register_baseline, BaselineProtocol, BASELINE_VERSION};
