use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use async_trait::async_trait;
use shared::domain::SessionToken;
use storage::Storage;
use tracing::{info, warn};

use crate::error::ClientError;

/// Well-known key the bearer token is persisted under.
pub const TOKEN_KEY: &str = "token";

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl CredentialStore for Storage {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.load_credential(key).await?.map(|stored| stored.value))
    }

    async fn save(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.save_credential(key, value).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.delete_credential(key).await.map(|_| ())
    }
}

/// Process-local store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory credential store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory credential store poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory credential store poisoned"))?
            .remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    Authenticated,
}

/// Sole owner of the current credential. Writes go through `&mut self`.
pub struct SessionStore {
    backend: Arc<dyn CredentialStore>,
    token: Option<SessionToken>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn CredentialStore>) -> Self {
        Self {
            backend,
            token: None,
        }
    }

    /// Loads whatever credential survived the last run.
    pub async fn restore(backend: Arc<dyn CredentialStore>) -> Result<Self, ClientError> {
        let token = backend
            .load(TOKEN_KEY)
            .await
            .map_err(ClientError::Storage)?
            .and_then(SessionToken::new);
        info!(authenticated = token.is_some(), "session: restored");
        Ok(Self { backend, token })
    }

    pub async fn set_session(&mut self, token: SessionToken) -> Result<(), ClientError> {
        self.backend
            .save(TOKEN_KEY, token.expose())
            .await
            .map_err(ClientError::Storage)?;
        self.token = Some(token);
        info!("session: authenticated");
        Ok(())
    }

    /// Memory is cleared even when the durable delete fails.
    pub async fn clear_session(&mut self) -> Result<(), ClientError> {
        let had_token = self.token.take().is_some();
        if let Err(err) = self.backend.delete(TOKEN_KEY).await {
            warn!(error = %err, "session: failed to remove persisted credential");
            return Err(ClientError::Storage(err));
        }
        if had_token {
            info!("session: cleared");
        }
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|token| !token.expose().is_empty())
    }

    pub fn status(&self) -> AuthStatus {
        if self.is_authenticated() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        }
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
