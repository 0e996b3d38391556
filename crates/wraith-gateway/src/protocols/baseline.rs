//! Protocol version `1`: the minimal command set needed to keep agents and
//! managers connected.
//!
//! | Requester | `reqType`   | Effect                                       |
//! |-----------|-------------|----------------------------------------------|
//! | agent     | `handshake` | registers presence, returns id + switch key  |
//! | agent     | `heartbeat` | refreshes presence of `agentID`              |
//! | manager   | `heartbeat` | acknowledges (the session is already renewed)|
//! | manager   | `logout`    | removes the session                          |

use crate::domain::error::{RegistryError, RequestError, StoreResult};
use crate::domain::settings::{self, SettingKey};
use crate::domain::types::{RequesterClass, ResponseBody};
use crate::pipeline::dispatch::{
    HandlerContext, HandlerFactory, ProtocolHandler, ProtocolRegistry, Responder,
};
use crate::registry::{AgentRegistry, SessionRegistry};
use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

/// Version identifier of this protocol.
pub const BASELINE_VERSION: char = '1';

/// Message for commands this protocol does not know.
pub const UNKNOWN_REQUEST_TYPE: &str = "unknown request type";

/// Register the baseline protocol under [`BASELINE_VERSION`].
pub fn register_baseline(registry: &mut ProtocolRegistry) -> Result<(), RegistryError> {
    registry.register(BASELINE_VERSION, BaselineProtocol)
}

/// Factory for baseline handlers.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaselineProtocol;

impl HandlerFactory for BaselineProtocol {
    fn create(&self, context: HandlerContext) -> Box<dyn ProtocolHandler> {
        Box::new(BaselineHandler { context })
    }
}

struct BaselineHandler {
    context: HandlerContext,
}

impl BaselineHandler {
    fn agents(&self) -> AgentRegistry {
        AgentRegistry::new(self.context.store.clone(), self.context.clock.clone())
    }

    fn sessions(&self) -> SessionRegistry {
        SessionRegistry::new(self.context.store.clone(), self.context.clock.clone())
    }

    async fn handshake(&self) -> StoreResult<ResponseBody> {
        let agent_id = Uuid::new_v4().to_string();
        self.agents().touch(&agent_id).await?;
        let switch_key =
            settings::require(self.context.store.as_ref(), SettingKey::WraithSwitchCryptKey)
                .await?;

        info!(agent_id = %agent_id, ip = %self.context.requester_ip, "agent handshake");
        Ok(ResponseBody::success()
            .with("agentID", agent_id)
            .with("switchKey", switch_key))
    }

    async fn agent_heartbeat(&self) -> StoreResult<ResponseBody> {
        let Some(agent_id) = self.context.payload.str_field("agentID") else {
            return Ok(RequestError::Malformed.to_response());
        };
        self.agents().touch(agent_id).await?;
        Ok(ResponseBody::success())
    }

    async fn logout(&self) -> StoreResult<ResponseBody> {
        if let Some(session_id) = self.context.payload.session_id() {
            self.sessions().remove(session_id).await?;
        }
        Ok(ResponseBody::success())
    }

    async fn execute(&self) -> StoreResult<ResponseBody> {
        let req_type = self.context.payload.req_type().unwrap_or_default();
        match (self.context.requester, req_type) {
            (RequesterClass::Agent, "handshake") => self.handshake().await,
            (RequesterClass::Agent, "heartbeat") => self.agent_heartbeat().await,
            (RequesterClass::Manager, "heartbeat") => Ok(ResponseBody::success()),
            (RequesterClass::Manager, "logout") => self.logout().await,
            _ => Ok(ResponseBody::error(UNKNOWN_REQUEST_TYPE)),
        }
    }
}

#[async_trait]
impl ProtocolHandler for BaselineHandler {
    async fn handle_request(self: Box<Self>, responder: &mut Responder) {
        let sent = match self.execute().await {
            Ok(response) => responder.respond(response),
            Err(e) => responder.reject(RequestError::from(e)),
        };
        if let Err(e) = sent {
            warn!(error = %e, "baseline handler responded twice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EnvelopeCipher, InMemoryStateStore, ManualClock};
    use crate::domain::types::{DecodedPayload, IpLock};
    use crate::pipeline::response::ResponseEncoder;
    use crate::ports::outbound::StateStore;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryStateStore>,
        clock: Arc<ManualClock>,
        registry: ProtocolRegistry,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStateStore::new());
        store
            .put_setting(SettingKey::WraithSwitchCryptKey, "switch".into())
            .await
            .unwrap();
        store
            .put_setting(SettingKey::ManagementSessionExpiryDelay, "12".into())
            .await
            .unwrap();
        let mut registry = ProtocolRegistry::new();
        register_baseline(&mut registry).unwrap();
        Fixture {
            store,
            clock: Arc::new(ManualClock::new(50)),
            registry,
        }
    }

    async fn run(fx: &Fixture, requester: RequesterClass, payload: Value) -> Value {
        let context = HandlerContext {
            store: fx.store.clone(),
            clock: fx.clock.clone(),
            requester,
            requester_ip: "127.0.0.1".parse().unwrap(),
            payload: DecodedPayload::from_value(payload).unwrap(),
        };
        let encoder = ResponseEncoder::new(Arc::new(EnvelopeCipher));
        let text = fx
            .registry
            .dispatch(BASELINE_VERSION, context, encoder)
            .await;
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_registers_agent() {
        let fx = fixture().await;
        let response = run(&fx, RequesterClass::Agent, json!({"reqType": "handshake"})).await;
        assert_eq!(response["status"], "SUCCESS");
        assert_eq!(response["switchKey"], "switch");
        assert!(response["agentID"].is_string());
        assert_eq!(fx.store.agent_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_agent_heartbeat() {
        let fx = fixture().await;
        let ok = run(
            &fx,
            RequesterClass::Agent,
            json!({"reqType": "heartbeat", "agentID": "a-1"}),
        )
        .await;
        assert_eq!(ok, json!({"status": "SUCCESS"}));

        let missing = run(&fx, RequesterClass::Agent, json!({"reqType": "heartbeat"})).await;
        assert_eq!(missing["message"], "incorrectly formatted request");
    }

    #[tokio::test]
    async fn test_manager_logout_removes_session() {
        let fx = fixture().await;
        let sessions = SessionRegistry::new(fx.store.clone(), fx.clock.clone());
        let session = sessions.create("alice", IpLock::Any).await.unwrap();

        let response = run(
            &fx,
            RequesterClass::Manager,
            json!({"reqType": "logout", "sessionID": session.assigned_id}),
        )
        .await;
        assert_eq!(response, json!({"status": "SUCCESS"}));
        assert!(sessions.lookup(&session.assigned_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_request_type() {
        let fx = fixture().await;
        let response = run(&fx, RequesterClass::Manager, json!({"reqType": "handshake"})).await;
        assert_eq!(
            response,
            json!({"status": "ERROR", "message": "unknown request type"})
        );
    }
}
