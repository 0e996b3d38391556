//! Ban guard.
//!
//! Runs before routing, for every verb: purges expired bans and turns away
//! a blocked address before any other processing happens.

use super::client_address::ClientIp;
use crate::gateway::Gateway;
use crate::service::plain_text;
use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    response::Response,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Ban guard layer
#[derive(Clone)]
pub struct BanGuardLayer {
    gateway: Arc<Gateway>,
}

impl BanGuardLayer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

impl<S> Layer<S> for BanGuardLayer {
    type Service = BanGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BanGuardService {
            inner,
            gateway: Arc::clone(&self.gateway),
        }
    }
}

/// Ban guard service
#[derive(Clone)]
pub struct BanGuardService<S> {
    inner: S,
    gateway: Arc<Gateway>,
}

impl<S> Service<Request<Body>> for BanGuardService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let gateway = Arc::clone(&self.gateway);
        let mut inner = self.inner.clone();
        let ip = req
            .extensions()
            .get::<ClientIp>()
            .map(|ClientIp(ip)| *ip)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        Box::pin(async move {
            if let Err(rejection) = gateway.admit(ip).await {
                let mut response = plain_text(serde_json::to_string(&rejection.to_response())
                    .unwrap_or_default());
                // Answered ahead of the CORS layer, so grant it here
                response.headers_mut().insert(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                );
                return Ok(response);
            }
            inner.call(req).await
        })
    }
}
