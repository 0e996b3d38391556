//! Client address resolution.
//!
//! Bans, IP-locked sessions and the logs all key on the requester's address,
//! so it is resolved once here and stored as a [`ClientIp`] extension.
//! `X-Forwarded-For` is honoured only when the direct peer is a trusted
//! proxy; anyone else could forge it to dodge a ban. The same goes for
//! `X-Forwarded-Proto`, surfaced as [`ForwardedScheme`].

use crate::domain::config::SecurityConfig;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    response::Response,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

const FORWARDED_FOR: &str = "x-forwarded-for";
const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Resolved requester address, available to every inner layer and handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Scheme the client used, as reported by a trusted proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedScheme(pub String);

/// Client address layer
#[derive(Clone)]
pub struct ClientAddressLayer {
    config: Arc<SecurityConfig>,
}

impl ClientAddressLayer {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for ClientAddressLayer {
    type Service = ClientAddressService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientAddressService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// Client address service
#[derive(Clone)]
pub struct ClientAddressService<S> {
    inner: S,
    config: Arc<SecurityConfig>,
}

impl<S> Service<Request<Body>> for ClientAddressService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let client_ip = resolve_client_ip(req.headers(), peer, &self.config);
        if let Some(scheme) = forwarded_scheme(req.headers(), peer, &self.config) {
            req.extensions_mut().insert(scheme);
        }
        req.extensions_mut().insert(ClientIp(client_ip));

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(req).await?;
            // Surfaced to the tracing layer, which sits outside this one
            response.extensions_mut().insert(ClientIp(client_ip));
            Ok(response)
        })
    }
}

/// Address the request is attributed to.
pub fn resolve_client_ip(headers: &HeaderMap, peer: IpAddr, config: &SecurityConfig) -> IpAddr {
    let Some(forwarded) = headers.get(FORWARDED_FOR) else {
        return peer;
    };

    if !is_trusted_proxy(peer, config) {
        warn!(
            peer = %peer,
            forwarded = ?forwarded,
            "ignoring X-Forwarded-For from untrusted peer"
        );
        return peer;
    }

    let Ok(chain) = forwarded.to_str() else {
        return peer;
    };

    // client, proxy1, proxy2: skip the known proxies from the right
    let hops: Vec<&str> = chain.split(',').map(str::trim).collect();
    let index = hops.len().saturating_sub(config.proxy_count + 1);
    match hops.get(index).and_then(|hop| hop.parse::<IpAddr>().ok()) {
        Some(ip) => {
            debug!(peer = %peer, client_ip = %ip, "client address taken from X-Forwarded-For");
            ip
        }
        None => peer,
    }
}

/// `X-Forwarded-Proto` from a trusted proxy, if it names `http` or `https`.
pub fn forwarded_scheme(
    headers: &HeaderMap,
    peer: IpAddr,
    config: &SecurityConfig,
) -> Option<ForwardedScheme> {
    let value = headers.get(FORWARDED_PROTO)?.to_str().ok()?;
    if !is_trusted_proxy(peer, config) {
        return None;
    }
    let scheme = value.split(',').next()?.trim().to_ascii_lowercase();
    matches!(scheme.as_str(), "http" | "https").then(|| ForwardedScheme(scheme))
}

fn is_trusted_proxy(ip: IpAddr, config: &SecurityConfig) -> bool {
    config.trusted_proxies.contains(&ip)
        || (config.trust_localhost && ip.is_loopback())
        || (config.trust_private_ranges && is_private_ip(ip))
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local(),
        // Unique local addresses (fc00::/7)
        IpAddr::V6(ipv6) => (ipv6.octets()[0] & 0xfe) == 0xfc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::net::Ipv6Addr;

    fn headers(forwarded: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_str(forwarded).unwrap());
        headers
    }

    fn public_peer() -> IpAddr {
        "203.0.113.7".parse().unwrap()
    }

    #[test]
    fn test_no_header_uses_peer() {
        let config = SecurityConfig::default();
        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), public_peer(), &config),
            public_peer()
        );
    }

    #[test]
    fn test_untrusted_peer_cannot_spoof() {
        let config = SecurityConfig::default();
        assert_eq!(
            resolve_client_ip(&headers("1.2.3.4"), public_peer(), &config),
            public_peer()
        );
    }

    #[test]
    fn test_trusted_proxy_forwards_client() {
        let config = SecurityConfig::default();
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(
            resolve_client_ip(&headers("198.51.100.1"), loopback, &config),
            "198.51.100.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_proxy_chain_depth() {
        let config = SecurityConfig {
            trusted_proxies: vec![public_peer()],
            proxy_count: 2,
            ..SecurityConfig::default()
        };
        assert_eq!(
            resolve_client_ip(
                &headers("198.51.100.1, 10.0.0.2, 10.0.0.3"),
                public_peer(),
                &config
            ),
            "198.51.100.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_garbage_header_falls_back() {
        let config = SecurityConfig::default();
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(
            resolve_client_ip(&headers("not-an-ip"), loopback, &config),
            loopback
        );
    }

    #[test]
    fn test_private_ranges() {
        assert!(is_private_ip(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
        assert!(is_private_ip(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1))));
        assert!(is_private_ip(IpAddr::V6(Ipv6Addr::new(
            0xfd00, 0, 0, 0, 0, 0, 0, 1
        ))));
        assert!(!is_private_ip(public_peer()));

        let config = SecurityConfig {
            trust_localhost: false,
            trust_private_ranges: true,
            ..SecurityConfig::default()
        };
        assert!(is_trusted_proxy(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), &config));
        assert!(!is_trusted_proxy(IpAddr::V4(Ipv4Addr::LOCALHOST), &config));
    }

    #[test]
    fn test_forwarded_scheme_needs_trusted_peer() {
        let config = SecurityConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("HTTPS, http"));

        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(
            forwarded_scheme(&headers, loopback, &config),
            Some(ForwardedScheme("https".into()))
        );
        assert_eq!(forwarded_scheme(&headers, public_peer(), &config), None);

        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("gopher"));
        assert_eq!(forwarded_scheme(&headers, loopback, &config), None);
    }
}
