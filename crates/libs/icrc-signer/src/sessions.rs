//! Per-(origin, owner) permission sessions.
//!
//! Storage problems never reach the caller: a session that cannot be read is
//! treated as absent and a write that fails is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use icrc_rpc::{Clock, PermissionState, Principal, Scope, ScopeMethod, ScopedMethod};
use serde::{Deserialize, Serialize};

use crate::store::KeyValueStore;

pub const DEFAULT_SESSION_VALIDITY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredScope {
    pub scope: ScopeMethod,
    pub state: PermissionState,
    pub created_at: u64,
    pub updated_at: u64,
}

impl StoredScope {
    pub fn to_scope(&self) -> Scope {
        Scope { scope: self.scope, state: self.state }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPermissions {
    pub scopes: Vec<StoredScope>,
    pub created_at: u64,
    pub updated_at: u64,
}

pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn key(origin: &str, owner: &Principal) -> String {
        format!("icrc_signer_{origin}_{owner}")
    }

    pub fn read(&self, origin: &str, owner: &Principal) -> Option<SessionPermissions> {
        let key = Self::key(origin, owner);
        let raw = match self.store.get(&key) {
            Ok(raw) => raw?,
            Err(err) => {
                log::warn!("signer(sessions): read {key} failed: {err}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                log::warn!("signer(sessions): {key} holds an unreadable session: {err}");
                None
            }
        }
    }

    /// Merges `scopes` into the stored session. An empty list leaves storage
    /// untouched.
    pub fn save(&self, origin: &str, owner: &Principal, scopes: &[Scope]) {
        if scopes.is_empty() {
            return;
        }
        let now = self.clock.now_ms();
        let mut session = self.read(origin, owner).unwrap_or(SessionPermissions {
            scopes: Vec::new(),
            created_at: now,
            updated_at: now,
        });

        for scope in scopes {
            match session.scopes.iter_mut().find(|stored| stored.scope == scope.scope) {
                Some(stored) => {
                    stored.state = scope.state;
                    stored.updated_at = now;
                }
                None => session.scopes.push(StoredScope {
                    scope: scope.scope,
                    state: scope.state,
                    created_at: now,
                    updated_at: now,
                }),
            }
        }
        session.updated_at = now;

        let key = Self::key(origin, owner);
        let raw = match serde_json::to_string(&session) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("signer(sessions): cannot serialize {key}: {err}");
                return;
            }
        };
        if let Err(err) = self.store.set(&key, &raw) {
            log::warn!("signer(sessions): write {key} failed: {err}");
        }
    }

    /// Stored scopes, or an empty list once the session is older than
    /// `validity`. The boundary itself is still valid.
    pub fn read_valid(
        &self,
        origin: &str,
        owner: &Principal,
        validity: Duration,
    ) -> Option<Vec<StoredScope>> {
        let session = self.read(origin, owner)?;
        let age = self.clock.now_ms().saturating_sub(session.updated_at);
        if u128::from(age) > validity.as_millis() {
            return Some(Vec::new());
        }
        Some(session.scopes)
    }

    pub fn scope_state(
        &self,
        origin: &str,
        owner: &Principal,
        method: &str,
        validity: Duration,
    ) -> PermissionState {
        let Some(method) = ScopedMethod::parse(method) else {
            return PermissionState::AskOnUse;
        };
        self.read_valid(origin, owner, validity)
            .and_then(|scopes| scopes.into_iter().find(|stored| stored.scope.method == method))
            .map_or(PermissionState::AskOnUse, |stored| stored.state)
    }

    /// One entry per scoped method, absent ones as `ask_on_use`.
    pub fn current_scopes(&self, origin: &str, owner: &Principal, validity: Duration) -> Vec<Scope> {
        let stored = self.read_valid(origin, owner, validity).unwrap_or_default();
        ScopedMethod::ALL
            .into_iter()
            .map(|method| {
                stored
                    .iter()
                    .find(|entry| entry.scope.method == method)
                    .map_or(Scope::new(method, PermissionState::AskOnUse), StoredScope::to_scope)
            })
            .collect()
    }

    pub fn clear(&self, origin: &str, owner: &Principal) {
        let key = Self::key(origin, owner);
        if let Err(err) = self.store.remove(&key) {
            log::warn!("signer(sessions): remove {key} failed: {err}");
        }
    }
}
