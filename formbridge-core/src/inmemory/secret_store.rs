use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::ports::SecretStore;

/// A fixed map of `secret_ref -> secret bytes`, for local development and tests.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, secret_ref: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        self.secrets
            .write()
            .expect("secret store lock poisoned")
            .insert(secret_ref.into(), secret.into());
        self
    }

    pub fn insert(&self, secret_ref: impl Into<String>, secret: impl Into<Vec<u8>>) {
        self.secrets
            .write()
            .expect("secret store lock poisoned")
            .insert(secret_ref.into(), secret.into());
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn resolve(&self, secret_ref: &str) -> Result<Vec<u8>> {
        self.secrets
            .read()
            .expect("secret store lock poisoned")
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("secret ref '{secret_ref}' not found")))
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_known_secret() {
        let store = InMemorySecretStore::new().with_secret("tenant_1.hmac", b"topsecret".to_vec());
        let resolved = store.resolve("tenant_1.hmac").await.unwrap();
        assert_eq!(resolved, b"topsecret");
    }

    #[tokio::test]
    async fn test_resolve_unknown_secret() {
        let store = InMemorySecretStore::new();
        assert!(store.resolve("missing").await.is_err());
    }
}
