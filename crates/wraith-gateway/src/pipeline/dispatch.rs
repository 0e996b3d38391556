//! Protocol dispatch.
//!
//! Protocol modules register a handler factory under a single-character
//! version identifier at start-up. For each authenticated request the
//! dispatcher builds one handler, hands it a [`Responder`] and waits for it
//! to finish. A handler that returns without responding gets a
//! "no response generated" error sent on its behalf.

use crate::domain::error::{RegistryError, RequestError, RespondError};
use crate::domain::types::{DecodedPayload, RequesterClass, ResponseBody};
use crate::pipeline::response::ResponseEncoder;
use crate::ports::outbound::{StateStore, TimeSource};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;

/// Everything a handler gets to see about its request.
pub struct HandlerContext {
    pub store: Arc<dyn StateStore>,
    pub clock: Arc<dyn TimeSource>,
    pub requester: RequesterClass,
    pub requester_ip: IpAddr,
    pub payload: DecodedPayload,
}

/// One request's worth of protocol logic.
#[async_trait]
pub trait ProtocolHandler: Send {
    /// Handle the request. Must call [`Responder::respond`] exactly once.
    async fn handle_request(self: Box<Self>, responder: &mut Responder);
}

/// Builds a handler per request.
pub trait HandlerFactory: Send + Sync {
    fn create(&self, context: HandlerContext) -> Box<dyn ProtocolHandler>;
}

impl<F> HandlerFactory for F
where
    F: Fn(HandlerContext) -> Box<dyn ProtocolHandler> + Send + Sync,
{
    fn create(&self, context: HandlerContext) -> Box<dyn ProtocolHandler> {
        self(context)
    }
}

/// Single-use response channel given to a handler.
pub struct Responder {
    encoder: ResponseEncoder,
    transmitted: Option<String>,
}

impl Responder {
    pub(crate) fn new(encoder: ResponseEncoder) -> Self {
        Self {
            encoder,
            transmitted: None,
        }
    }

    /// Encode and transmit `body`. Only the first call has any effect.
    pub fn respond(&mut self, body: ResponseBody) -> Result<(), RespondError> {
        if self.transmitted.is_some() {
            return Err(RespondError::AlreadyResponded);
        }
        self.transmitted = Some(self.encoder.encode(&body));
        Ok(())
    }

    /// Shorthand for responding with a rejection.
    pub fn reject(&mut self, error: RequestError) -> Result<(), RespondError> {
        self.respond(error.to_response())
    }

    pub fn has_responded(&self) -> bool {
        self.transmitted.is_some()
    }

    fn into_transmission(self) -> String {
        match self.transmitted {
            Some(text) => text,
            None => self.encoder.encode(&RequestError::NoResponse.to_response()),
        }
    }
}

/// Version identifier to handler factory.
#[derive(Default, Clone)]
pub struct ProtocolRegistry {
    factories: BTreeMap<char, Arc<dyn HandlerFactory>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `version`.
    pub fn register(
        &mut self,
        version: char,
        factory: impl HandlerFactory + 'static,
    ) -> Result<(), RegistryError> {
        if !version.is_ascii_graphic() {
            return Err(RegistryError::InvalidVersion(version));
        }
        if self.factories.contains_key(&version) {
            return Err(RegistryError::DuplicateVersion(version));
        }
        self.factories.insert(version, Arc::new(factory));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_protocol(
        mut self,
        version: char,
        factory: impl HandlerFactory + 'static,
    ) -> Result<Self, RegistryError> {
        self.register(version, factory)?;
        Ok(self)
    }

    pub fn supports(&self, version: char) -> bool {
        self.factories.contains_key(&version)
    }

    /// Registered identifiers in ascending order.
    pub fn supported_versions(&self) -> Vec<String> {
        self.factories.keys().map(char::to_string).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Run the handler registered for `version` and return the transmitted
    /// response text.
    pub async fn dispatch(
        &self,
        version: char,
        context: HandlerContext,
        encoder: ResponseEncoder,
    ) -> String {
        let Some(factory) = self.factories.get(&version) else {
            // Classification already checked the version
            return encoder.encode(
                &RequestError::UnsupportedProtocol {
                    supported: self.supported_versions(),
                }
                .to_response(),
            );
        };

        let requester = context.requester;
        let req_type = context.payload.req_type().map(str::to_owned);
        let handler = factory.create(context);
        let mut responder = Responder::new(encoder);
        handler.handle_request(&mut responder).await;

        if !responder.has_responded() {
            warn!(
                version = %version,
                requester = %requester,
                req_type = ?req_type,
                "handler finished without responding"
            );
        }
        responder.into_transmission()
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("versions", &self.supported_versions())
            .finish()
    }
}
