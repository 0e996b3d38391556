//! Gateway service - HTTP surface and lifecycle.
//!
//! | Verb      | Channel                                   |
//! |-----------|-------------------------------------------|
//! | `GET`     | discovery, the gateway's own URL          |
//! | `PUT`     | autoconf, manager login                   |
//! | `POST`    | protocol channel                          |
//! | `OPTIONS` | preflight, empty success                  |
//! | other     | `405 Method Not Allowed` with `Allow`     |
//!
//! Every path is served the same way; the gateway may be mounted anywhere.

use crate::discovery::document_url;
use crate::domain::config::{DiscoveryConfig, GatewayConfig};
use crate::domain::error::{messages, GatewayError};
use crate::gateway::Gateway;
use crate::middleware::{
    create_cors_layer, BanGuardLayer, ClientAddressLayer, ClientIp, ForwardedScheme, TracingLayer,
};
use crate::pipeline::dispatch::ProtocolRegistry;
use crate::ports::outbound::{Cipher, StateStore, SystemTimeSource};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Extension, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower::ServiceBuilder;
use tracing::{info, warn};

/// `Allow` header sent with 405 responses.
pub const ALLOWED_METHODS: &str = "GET, PUT, POST";

/// Gateway service state
pub struct GatewayService {
    config: GatewayConfig,
    gateway: Arc<Gateway>,
}

impl GatewayService {
    /// Create a new gateway service on the system clock
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn StateStore>,
        cipher: Arc<dyn Cipher>,
        protocols: ProtocolRegistry,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let gateway = Arc::new(Gateway::new(
            &config,
            store,
            cipher,
            Arc::new(SystemTimeSource),
            protocols,
        ));
        Ok(Self { config, gateway })
    }

    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::clone(&self.gateway)
    }

    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.gateway), &self.config)
    }

    /// Seed state, bind and serve until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.gateway.initialize(&self.config).await?;

        let addr = self.config.http.socket_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;

        let housekeeping = self.start_housekeeping();
        info!(
            addr = %addr,
            protocols = ?self.gateway.protocols().supported_versions(),
            "Gateway listening"
        );

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        if let Some(task) = housekeeping {
            task.abort();
        }
        info!("Gateway stopped");
        result.map_err(GatewayError::Server)
    }

    /// Start background purge of stale sessions, bans and agents
    fn start_housekeeping(&self) -> Option<JoinHandle<()>> {
        let settings = &self.config.housekeeping;
        if !settings.enabled {
            return None;
        }

        let gateway = Arc::clone(&self.gateway);
        let period = settings.interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = gateway.purge_stale().await {
                    warn!(error = %e, "housekeeping purge failed");
                }
            }
        }))
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    discovery: Arc<DiscoveryConfig>,
}

/// Build the gateway router with its middleware stack.
pub fn build_router(gateway: Arc<Gateway>, config: &GatewayConfig) -> Router {
    let state = AppState {
        gateway: Arc::clone(&gateway),
        discovery: Arc::new(config.discovery.clone()),
    };

    // Build middleware stack (outermost first)
    let middleware = ServiceBuilder::new()
        .layer(TracingLayer::new())
        .layer(ClientAddressLayer::new(config.security.clone()))
        .layer(BanGuardLayer::new(gateway))
        .layer(create_cors_layer(&config.cors));

    let endpoint = get(discover)
        .put(autoconf)
        .post(protocol_channel)
        .options(preflight)
        .fallback(unsupported_method);

    Router::new()
        .route("/", endpoint.clone())
        .route("/*path", endpoint)
        .layer(middleware)
        .layer(DefaultBodyLimit::max(config.http.max_body_bytes))
        .with_state(state)
}

pub(crate) fn plain_text(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn discover(
    State(state): State<AppState>,
    scheme: Option<Extension<ForwardedScheme>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let scheme = scheme.as_ref().map(|Extension(ForwardedScheme(s))| s.as_str());
    plain_text(document_url(&headers, &uri, scheme, &state.discovery))
}

async fn autoconf(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    body: Bytes,
) -> Response {
    plain_text(state.gateway.autoconf(&body, ip).await)
}

async fn protocol_channel(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    body: Bytes,
) -> Response {
    plain_text(state.gateway.protocol_channel(&body, ip).await)
}

async fn preflight() -> Response {
    plain_text(String::new())
}

async fn unsupported_method() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, ALLOWED_METHODS)],
        messages::UNSUPPORTED_METHOD,
    )
        .into_response()
}
