//! SecretStore port (spec §4.4): resolves a destination's signing/auth
//! secret reference to the secret material, with an optional TTL cache in
//! front of the backing store.

use async_trait::async_trait;

use crate::error::Result;

/// Resolves opaque secret references to secret material.
///
/// Implementations are free to cache resolved secrets for up to
/// [`crate::config::SecretStoreConfig::cache_ttl_seconds`]; callers must not
/// assume freshness stronger than that.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Resolves `secret_ref` (as stored on a [`crate::domain::Destination`]
    /// or a tenant's HMAC key reference) to the raw secret bytes.
    async fn resolve(&self, secret_ref: &str) -> Result<Vec<u8>>;

    /// Returns `true` if the store is reachable and able to serve reads.
    async fn is_ready(&self) -> bool;
}
