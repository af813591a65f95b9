//! Session store implementations: in-process map and database-backed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::state::SessionState;
use crate::error::BotError;
use crate::store::Database;

/// Keyed store of per-identity session state.
///
/// Setting `SessionState::None` removes the entry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current state for an identity; `None` when no entry exists.
    async fn get(&self, identity: &str) -> Result<SessionState, BotError>;

    /// Replace the state for an identity.
    async fn set(&self, identity: &str, state: SessionState) -> Result<(), BotError>;

    /// Drop the entry for an identity.
    async fn clear(&self, identity: &str) -> Result<(), BotError>;
}

/// Process-local session store. Lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities with a pending state.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, identity: &str) -> Result<SessionState, BotError> {
        Ok(self
            .entries
            .read()
            .await
            .get(identity)
            .copied()
            .unwrap_or_default())
    }

    async fn set(&self, identity: &str, state: SessionState) -> Result<(), BotError> {
        let mut entries = self.entries.write().await;
        if state == SessionState::None {
            entries.remove(identity);
        } else {
            entries.insert(identity.to_string(), state);
        }
        Ok(())
    }

    async fn clear(&self, identity: &str) -> Result<(), BotError> {
        self.entries.write().await.remove(identity);
        Ok(())
    }
}

/// Session store persisted in the `sessions` table; survives restarts.
pub struct DbSessionStore {
    db: Arc<dyn Database>,
}

impl DbSessionStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn get(&self, identity: &str) -> Result<SessionState, BotError> {
        match self.db.get_session(identity).await? {
            Some(raw) => raw.parse().map_err(|_| BotError::CorruptSession {
                identity: identity.to_string(),
                raw,
            }),
            None => Ok(SessionState::None),
        }
    }

    async fn set(&self, identity: &str, state: SessionState) -> Result<(), BotError> {
        if state == SessionState::None {
            return self.clear(identity).await;
        }
        self.db.set_session(identity, state.as_str()).await?;
        Ok(())
    }

    async fn clear(&self, identity: &str) -> Result<(), BotError> {
        self.db.clear_session(identity).await?;
        Ok(())
    }
}
