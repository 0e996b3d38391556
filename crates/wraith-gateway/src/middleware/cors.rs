//! CORS middleware.
//!
//! Agents and managers may be served from anywhere, so by default every
//! origin may use the three gateway verbs.

use crate::domain::config::CorsConfig;
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Verbs the gateway answers.
pub const GATEWAY_METHODS: [Method; 3] = [Method::GET, Method::PUT, Method::POST];

/// Create CORS layer from gateway config
pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        // No origin is allowed, browsers see no CORS grant at all
        return CorsLayer::new();
    }

    let cors = CorsLayer::new()
        .allow_methods(GATEWAY_METHODS.to_vec())
        .allow_headers([header::CONTENT_TYPE])
        .max_age(config.max_age);

    if config.allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::post, Router};
    use tower::ServiceExt;

    fn app(config: &CorsConfig) -> Router {
        Router::new()
            .route("/", post(|| async { "ok" }))
            .layer(create_cors_layer(config))
    }

    #[tokio::test]
    async fn test_any_origin_allowed_by_default() {
        let response = app(&CorsConfig::default())
            .oneshot(
                Request::post("/")
                    .header(header::ORIGIN, "https://ops.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_preflight_lists_gateway_methods() {
        let response = app(&CorsConfig::default())
            .oneshot(
                Request::options("/")
                    .header(header::ORIGIN, "https://ops.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_success());
        let allowed = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap();
        for method in ["GET", "PUT", "POST"] {
            assert!(allowed.contains(method));
        }
    }

    #[tokio::test]
    async fn test_explicit_origin_list() {
        let config = CorsConfig {
            allowed_origins: vec!["https://ops.example".into()],
            ..CorsConfig::default()
        };
        let response = app(&config)
            .oneshot(
                Request::post("/")
                    .header(header::ORIGIN, "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
