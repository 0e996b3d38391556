//! Discovery: the gateway's own canonical URL.
//!
//! Agents fetch it to confirm the endpoint they were configured with. The
//! host comes from `X-Forwarded-Host`, then `Host`, then the configured
//! server name (with its port unless it is the scheme default). The scheme
//! is the one a trusted proxy forwarded, else the configured one. The query
//! string is never included.

use crate::domain::config::DiscoveryConfig;
use axum::http::{header, HeaderMap, Uri};

const FORWARDED_HOST: &str = "x-forwarded-host";

/// Absolute URL of the requested document, without its query.
///
/// `forwarded_scheme` must only carry a value vouched for by a trusted proxy.
pub fn document_url(
    headers: &HeaderMap,
    uri: &Uri,
    forwarded_scheme: Option<&str>,
    config: &DiscoveryConfig,
) -> String {
    let host = header_host(headers, FORWARDED_HOST)
        .or_else(|| header_host(headers, header::HOST.as_str()))
        .unwrap_or_else(|| configured_host(config));
    let scheme = forwarded_scheme.unwrap_or(&config.scheme);
    format!("{scheme}://{host}{}", uri.path())
}

fn header_host(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    // Proxies may append: take the first hop
    let host = value.split(',').next()?.trim();
    (!host.is_empty()).then(|| host.to_string())
}

fn configured_host(config: &DiscoveryConfig) -> String {
    let default_port = match config.scheme.as_str() {
        "https" => 443,
        _ => 80,
    };
    if config.port == default_port {
        config.server_name.clone()
    } else {
        format!("{}:{}", config.server_name, config.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_host_header_and_query_stripped() {
        let uri: Uri = "/c2/gateway.php?probe=1&x=2".parse().unwrap();
        let url = document_url(
            &headers(&[("host", "c2.example:8443")]),
            &uri,
            None,
            &DiscoveryConfig::default(),
        );
        assert_eq!(url, "http://c2.example:8443/c2/gateway.php");
    }

    #[test]
    fn test_forwarded_host_wins() {
        let uri: Uri = "/".parse().unwrap();
        let config = DiscoveryConfig {
            scheme: "https".into(),
            ..DiscoveryConfig::default()
        };
        let url = document_url(
            &headers(&[
                ("host", "10.0.0.5:8080"),
                ("x-forwarded-host", "c2.example, proxy.internal"),
            ]),
            &uri,
            None,
            &config,
        );
        assert_eq!(url, "https://c2.example/");
    }

    #[test]
    fn test_configured_fallback() {
        let uri: Uri = "/api".parse().unwrap();
        assert_eq!(
            document_url(&HeaderMap::new(), &uri, None, &DiscoveryConfig::default()),
            "http://localhost:8080/api"
        );

        let config = DiscoveryConfig {
            scheme: "https".into(),
            server_name: "c2.example".into(),
            port: 443,
        };
        assert_eq!(
            document_url(&HeaderMap::new(), &uri, None, &config),
            "https://c2.example/api"
        );
    }

    #[test]
    fn test_forwarded_scheme_overrides_config() {
        let uri: Uri = "/gate?x=1".parse().unwrap();
        let url = document_url(
            &headers(&[("host", "c2.example")]),
            &uri,
            Some("https"),
            &DiscoveryConfig::default(),
        );
        assert_eq!(url, "https://c2.example/gate");
    }
}
