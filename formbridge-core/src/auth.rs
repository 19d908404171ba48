//! HMAC request authentication (spec §4.1).
//!
//! A request is authentic when all three hold:
//! 1. `X-Tenant-Id` names an active tenant.
//! 2. `X-Timestamp` (RFC 3339 UTC) is within [`crate::config::AuthConfig::replay_window`] of now.
//! 3. `X-Signature` is the lowercase-hex HMAC-SHA256 of `"{timestamp}\n{body}"` keyed
//!    on the tenant's resolved secret, compared in constant time.
//!
//! Unknown tenant and bad signature are deliberately indistinguishable: both
//! the HTTP response and the cost of reaching it must look the same, so a
//! caller probing for valid tenant ids learns nothing. To that end this
//! module always resolves a secret and computes an HMAC before branching on
//! which failure to report, even when the tenant doesn't exist.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::domain::Tenant;
use crate::error::{Error, Result};
use crate::ports::{SecretStore, SubmissionStore};

type HmacSha256 = Hmac<Sha256>;

/// Used in place of a real secret when the tenant or its secret can't be
/// resolved, so signing still runs and costs the same as the happy path.
const DECOY_SECRET: &[u8] = b"formbridge-decoy-signing-key-unknown-tenant";

/// Headers a caller must supply alongside the ingest body.
#[derive(Debug, Clone)]
pub struct AuthHeaders<'a> {
    pub tenant_id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

/// Verifies inbound request authenticity against a tenant's signing secret.
pub struct Authenticator<'a> {
    config: &'a AuthConfig,
    secrets: &'a dyn SecretStore,
    store: &'a dyn SubmissionStore,
}

impl<'a> Authenticator<'a> {
    pub fn new(config: &'a AuthConfig, secrets: &'a dyn SecretStore, store: &'a dyn SubmissionStore) -> Self {
        Self { config, secrets, store }
    }

    /// Verifies `headers` and `body`, returning the resolved, active tenant
    /// on success (spec §4.1 error table).
    pub async fn authenticate(&self, headers: &AuthHeaders<'_>, body: &[u8]) -> Result<Tenant> {
        if headers.tenant_id.is_empty() {
            return Err(Error::AuthMissingHeader("X-Tenant-Id".to_string()));
        }
        if headers.timestamp.is_empty() {
            return Err(Error::AuthMissingHeader("X-Timestamp".to_string()));
        }
        if headers.signature.is_empty() {
            return Err(Error::AuthMissingHeader("X-Signature".to_string()));
        }

        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(headers.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| Error::AuthMissingHeader("X-Timestamp".to_string()))?;

        let now = Utc::now();
        let window = self.config.replay_window();
        if (now - timestamp).abs() > window {
            return Err(Error::AuthStaleTimestamp);
        }

        let tenant_lookup = self.store.get_tenant(headers.tenant_id).await?;
        let tenant_known_active = tenant_lookup.as_ref().is_some_and(|t| t.active);

        let secret_ref = format!("{}.hmac", headers.tenant_id);
        let secret = self.secrets.resolve(&secret_ref).await.unwrap_or_else(|_| DECOY_SECRET.to_vec());

        let expected = sign(&secret, headers.timestamp, body);
        let provided = hex::decode(headers.signature).unwrap_or_default();
        let signature_matches = expected.len() == provided.len() && expected.ct_eq(&provided).unwrap_u8() == 1;

        // Both branches below run only after the lookup, secret resolution,
        // and HMAC computation above have already happened unconditionally,
        // so an unknown tenant costs exactly what a known one does.
        if !tenant_known_active {
            return Err(Error::AuthUnknownTenant);
        }
        if !signature_matches {
            return Err(Error::AuthBadSignature);
        }

        Ok(tenant_lookup.expect("tenant_known_active implies Some"))
    }
}

/// Computes the HMAC-SHA256 over `"{timestamp}\n{body}"`.
fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts key of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b"\n");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Produces the lowercase-hex signature a client would send, for tests,
/// documentation examples, and outbound HMAC-signed destinations.
pub fn sign_hex(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    hex::encode(sign(secret, timestamp, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;
    use crate::inmemory::{InMemorySecretStore, InMemorySubmissionStore};

    fn config() -> AuthConfig {
        AuthConfig { replay_window_seconds: 300 }
    }

    fn rfc3339_now() -> String {
        Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    async fn setup() -> (InMemorySecretStore, InMemorySubmissionStore) {
        let secrets = InMemorySecretStore::new().with_secret("tenant_1.hmac", b"shh".to_vec());
        let store = InMemorySubmissionStore::new();
        store.insert_tenant(Tenant {
            tenant_id: "tenant_1".to_string(),
            name: "Acme".to_string(),
            tier: Tier::Free,
            active: true,
            created_at: Utc::now(),
        });
        (secrets, store)
    }

    #[tokio::test]
    async fn test_valid_signature_authenticates() {
        let (secrets, store) = setup().await;
        let config = config();
        let auth = Authenticator::new(&config, &secrets, &store);

        let body = br#"{"name":"Jane"}"#;
        let ts = rfc3339_now();
        let sig = sign_hex(b"shh", &ts, body);

        let headers = AuthHeaders { tenant_id: "tenant_1", timestamp: &ts, signature: &sig };
        let tenant = auth.authenticate(&headers, body).await.unwrap();
        assert_eq!(tenant.tenant_id, "tenant_1");
    }

    #[tokio::test]
    async fn test_signature_is_64_lowercase_hex_chars() {
        let sig = sign_hex(b"shh", &rfc3339_now(), b"{}");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let (secrets, store) = setup().await;
        let config = config();
        let auth = Authenticator::new(&config, &secrets, &store);

        let body = br#"{"name":"Jane"}"#;
        let ts = rfc3339_now();
        let sig = sign_hex(b"wrong-secret", &ts, body);

        let headers = AuthHeaders { tenant_id: "tenant_1", timestamp: &ts, signature: &sig };
        let err = auth.authenticate(&headers, body).await.unwrap_err();
        assert!(matches!(err, Error::AuthBadSignature));
    }

    #[tokio::test]
    async fn test_stale_timestamp_rejected() {
        let (secrets, store) = setup().await;
        let config = config();
        let auth = Authenticator::new(&config, &secrets, &store);

        let body = br#"{}"#;
        let ts = (Utc::now() - chrono::Duration::seconds(400)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let sig = sign_hex(b"shh", &ts, body);

        let headers = AuthHeaders { tenant_id: "tenant_1", timestamp: &ts, signature: &sig };
        let err = auth.authenticate(&headers, body).await.unwrap_err();
        assert!(matches!(err, Error::AuthStaleTimestamp));
    }

    #[tokio::test]
    async fn test_unknown_tenant_rejected() {
        let (secrets, store) = setup().await;
        let config = config();
        let auth = Authenticator::new(&config, &secrets, &store);

        let body = br#"{}"#;
        let ts = rfc3339_now();
        let sig = sign_hex(b"shh", &ts, body);

        let headers = AuthHeaders { tenant_id: "nope", timestamp: &ts, signature: &sig };
        let err = auth.authenticate(&headers, body).await.unwrap_err();
        assert!(matches!(err, Error::AuthUnknownTenant));
    }

    #[tokio::test]
    async fn test_unknown_tenant_and_bad_signature_produce_same_user_message() {
        let (secrets, store) = setup().await;
        let config = config();
        let auth = Authenticator::new(&config, &secrets, &store);

        let body = br#"{}"#;
        let ts = rfc3339_now();

        let unknown_tenant_err = auth
            .authenticate(&AuthHeaders { tenant_id: "nope", timestamp: &ts, signature: &sign_hex(b"shh", &ts, body) }, body)
            .await
            .unwrap_err();
        let bad_signature_err = auth
            .authenticate(
                &AuthHeaders { tenant_id: "tenant_1", timestamp: &ts, signature: &sign_hex(b"wrong", &ts, body) },
                body,
            )
            .await
            .unwrap_err();

        assert_eq!(unknown_tenant_err.user_message(), bad_signature_err.user_message());
    }
}
