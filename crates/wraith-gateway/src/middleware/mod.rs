//! Middleware stack for the gateway.
//!
//! Layer order: Request → Tracing → ClientAddress → BanGuard → CORS → Handler

pub mod ban_guard;
pub mod client_address;
pub mod cors;
pub mod tracing;

pub use ban_guard::BanGuardLayer;
pub use client_address::{
    forwarded_scheme, resolve_client_ip, ClientAddressLayer, ClientIp, ForwardedScheme,
};
pub use cors::{create_cors_layer, GATEWAY_METHODS};
pub use tracing::TracingLayer;
