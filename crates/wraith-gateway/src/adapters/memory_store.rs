//! In-memory [`StateStore`].
//!
//! All state sits behind one `parking_lot::Mutex`, so every trait method,
//! including conditional key rotation and ban updates, is a single critical
//! section. Nothing is awaited while the lock is held.

use crate::domain::error::{StoreError, StoreResult};
use crate::domain::settings::SettingKey;
use crate::domain::types::{BanEntry, ManagerAccount, Session, Timestamp};
use crate::ports::outbound::{BanUpdate, IdleScope, StateStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Default)]
struct State {
    settings: HashMap<SettingKey, String>,
    sessions: HashMap<String, Session>,
    bans: HashMap<IpAddr, BanEntry>,
    agents: HashMap<String, Timestamp>,
    accounts: HashMap<String, ManagerAccount>,
}

impl State {
    fn is_idle(&self, scope: IdleScope) -> bool {
        match scope {
            IdleScope::NoSessions => self.sessions.is_empty(),
            IdleScope::NoAgents => self.agents.is_empty(),
        }
    }
}

/// Process-local state store.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: Mutex<State>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn setting(&self, key: SettingKey) -> StoreResult<Option<String>> {
        Ok(self.state.lock().settings.get(&key).cloned())
    }

    async fn put_setting(&self, key: SettingKey, value: String) -> StoreResult<()> {
        self.state.lock().settings.insert(key, value);
        Ok(())
    }

    async fn seed_setting(&self, key: SettingKey, value: String) -> StoreResult<bool> {
        let mut state = self.state.lock();
        if state.settings.contains_key(&key) {
            return Ok(false);
        }
        state.settings.insert(key, value);
        Ok(true)
    }

    async fn rotate_setting_if_idle(
        &self,
        key: SettingKey,
        value: String,
        scope: IdleScope,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        if !state.is_idle(scope) {
            return Ok(false);
        }
        state.settings.insert(key, value);
        Ok(true)
    }

    async fn insert_session(&self, session: Session) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.sessions.contains_key(&session.assigned_id) {
            return Err(StoreError::Conflict(format!(
                "session {}",
                session.assigned_id
            )));
        }
        state.sessions.insert(session.assigned_id.clone(), session);
        Ok(())
    }

    async fn session(&self, assigned_id: &str) -> StoreResult<Option<Session>> {
        Ok(self.state.lock().sessions.get(assigned_id).cloned())
    }

    async fn touch_session(&self, assigned_id: &str, at: Timestamp) -> StoreResult<bool> {
        match self.state.lock().sessions.get_mut(assigned_id) {
            Some(session) => {
                session.last_seen_at = session.last_seen_at.max(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_session(&self, assigned_id: &str) -> StoreResult<bool> {
        Ok(self.state.lock().sessions.remove(assigned_id).is_some())
    }

    async fn remove_sessions_seen_before(&self, cutoff: Timestamp) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.last_seen_at >= cutoff);
        Ok(before - state.sessions.len())
    }

    async fn session_count(&self) -> StoreResult<usize> {
        Ok(self.state.lock().sessions.len())
    }

    async fn ban(&self, ip: IpAddr) -> StoreResult<Option<BanEntry>> {
        Ok(self.state.lock().bans.get(&ip).cloned())
    }

    async fn update_ban(&self, ip: IpAddr, update: BanUpdate) -> StoreResult<BanEntry> {
        let mut state = self.state.lock();
        let entry = update(state.bans.remove(&ip));
        state.bans.insert(ip, entry.clone());
        Ok(entry)
    }

    async fn remove_ban(&self, ip: IpAddr) -> StoreResult<bool> {
        Ok(self.state.lock().bans.remove(&ip).is_some())
    }

    async fn remove_bans_expired_at(&self, now: Timestamp) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let before = state.bans.len();
        state.bans.retain(|_, entry| !entry.is_expired(now));
        Ok(before - state.bans.len())
    }

    async fn touch_agent(&self, agent_id: &str, at: Timestamp) -> StoreResult<()> {
        let mut state = self.state.lock();
        let seen = state.agents.entry(agent_id.to_string()).or_insert(at);
        *seen = (*seen).max(at);
        Ok(())
    }

    async fn remove_agents_seen_before(&self, cutoff: Timestamp) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let before = state.agents.len();
        state.agents.retain(|_, seen| *seen >= cutoff);
        Ok(before - state.agents.len())
    }

    async fn agent_count(&self) -> StoreResult<usize> {
        Ok(self.state.lock().agents.len())
    }

    async fn manager_account(&self, username: &str) -> StoreResult<Option<ManagerAccount>> {
        Ok(self.state.lock().accounts.get(username).cloned())
    }

    async fn put_manager_account(&self, account: ManagerAccount) -> StoreResult<()> {
        self.state
            .lock()
            .accounts
            .insert(account.username.clone(), account);
        Ok(())
    }
}
