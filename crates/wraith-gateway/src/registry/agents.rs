//! Agent presence.
//!
//! An agent counts as online while it keeps checking in within
//! `wraithMarkOfflineDelay` seconds. The online count guards switch-key
//! rotation.

use crate::domain::error::StoreResult;
use crate::domain::settings::{self, SettingKey};
use crate::ports::outbound::{StateStore, TimeSource};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AgentRegistry {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn TimeSource>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn TimeSource>) -> Self {
        Self { store, clock }
    }

    /// Mark `agent_id` as seen now.
    pub async fn touch(&self, agent_id: &str) -> StoreResult<()> {
        self.store.touch_agent(agent_id, self.clock.now()).await
    }

    /// Drop agents that missed the offline window.
    pub async fn expire_stale(&self) -> StoreResult<usize> {
        let delay =
            settings::require_u64(self.store.as_ref(), SettingKey::WraithMarkOfflineDelay).await?;
        let purged = self
            .store
            .remove_agents_seen_before(self.clock.now().saturating_sub(delay))
            .await?;
        if purged > 0 {
            debug!(purged, "marked agents offline");
        }
        Ok(purged)
    }

    pub async fn active_count(&self) -> StoreResult<usize> {
        self.store.agent_count().await
    }
}
