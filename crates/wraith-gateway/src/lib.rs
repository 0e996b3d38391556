// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Wraith Gateway - inbound entry point of the fleet's command-and-control
//! server.
//!
//! Every agent ("wraith") and every manager console talks to the server
//! through this gateway. It authenticates the request, decrypts it, decides
//! which protocol version handles it and hands it over.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         WRAITH GATEWAY                            │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  Middleware: Tracing → ClientAddress → BanGuard → CORS            │
//! │                                                                   │
//! │   GET  discovery      PUT  autoconf        POST  protocol channel │
//! │        (own URL)           (manager login)       │                │
//! │                                                  ▼                │
//! │                          classify (prefix, requester, version)    │
//! │                                                  │                │
//! │                          resolve keys (agent / manager layers)    │
//! │                                                  │                │
//! │                          dispatch (ProtocolRegistry → handler)    │
//! │                                                  │                │
//! │                          encode (encrypt + prefix)                │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  Registries: sessions · bans · agents      Port: StateStore       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use wraith_gateway::{
//!     register_baseline, EnvelopeCipher, GatewayConfig, GatewayService,
//!     InMemoryStateStore, ProtocolRegistry,
//! };
//!
//! let mut protocols = ProtocolRegistry::new();
//! register_baseline(&mut protocols)?;
//! let service = GatewayService::new(
//!     GatewayConfig::default(),
//!     Arc::new(InMemoryStateStore::new()),
//!     Arc::new(EnvelopeCipher),
//!     protocols,
//! )?;
//! service.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod credentials;
pub mod discovery;
pub mod domain;
pub mod gateway;
pub mod middleware;
pub mod pipeline;
pub mod ports;
pub mod protocols;
pub mod registry;
pub mod service;

/// Version reported to managers in the autoconf configuration.
pub const API_VERSION: &str = "4.0.0";

// Re-exports
pub use adapters::{EnvelopeCipher, InMemoryStateStore, ManualClock};
pub use credentials::{hash_password, obfuscate, reveal, verify_password, CredentialError};
pub use domain::config::{ConfigError, GatewayConfig};
pub use domain::error::{GatewayError, RequestError, StoreError};
pub use domain::types::{RequesterClass, ResponseBody, Session};
pub use gateway::Gateway;
pub use pipeline::dispatch::{HandlerContext, ProtocolHandler, ProtocolRegistry, Responder};
pub use ports::outbound::{Cipher, StateStore, SystemTimeSource, TimeSource};
pub use protocols::register_baseline;
pub use service::{build_router, GatewayService};
