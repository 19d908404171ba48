//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: FORMBRIDGE_)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/formbridge/{service_name}/config.toml
//! 4. System directory: /etc/formbridge/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Root configuration structure, assembled once at process boot and passed
/// explicitly to every component (spec.md §9: no global mutable configuration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service-level settings (bind address, timeouts, log level).
    pub service: ServiceConfig,

    /// HMAC authenticator settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Ingest handler settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Delivery orchestrator settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Retry controller settings (delivery attempts).
    #[serde(default)]
    pub retry: RetryConfig,

    /// Persister's own retry policy (spec §4.6), independent of delivery retry.
    #[serde(default)]
    pub persister: PersisterConfig,

    /// Query API settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// SecretStore cache settings.
    #[serde(default)]
    pub secret_store: SecretStoreConfig,

    /// Middleware configuration (HTTP-layer ambient concerns).
    #[serde(default)]
    pub middleware: MiddlewareConfig,

    /// NATS configuration, used only when the `nats` EventBus adapter is selected.
    #[serde(default)]
    pub nats: Option<NatsConfig>,

    /// Redis configuration, used only when the `redis-cache` SecretStore cache is selected.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Graceful shutdown drain window (spec.md §5)
    #[serde(default = "default_graceful_shutdown_timeout_secs")]
    pub graceful_shutdown_timeout_secs: u64,

    /// Whether metrics emission is enabled (spec.md §6.4 `metrics.enabled`)
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl ServiceConfig {
    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_secs)
    }
}

/// HMAC authenticator configuration (spec.md §4.1, §6.4)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Symmetric tolerance, in seconds, around "now" for `X-Timestamp` (default 300)
    #[serde(default = "default_replay_window_seconds")]
    pub replay_window_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            replay_window_seconds: default_replay_window_seconds(),
        }
    }
}

impl AuthConfig {
    pub fn replay_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.replay_window_seconds)
    }
}

/// SecretStore caching configuration (spec.md §4.4)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretStoreConfig {
    /// Default TTL, in seconds, for cached secrets (default 300)
    #[serde(default = "default_secret_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_secret_cache_ttl_seconds(),
        }
    }
}

impl SecretStoreConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

/// Ingest handler configuration (spec.md §4.2, §6.4)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum serialized payload size in bytes (default 262144, i.e. 256 KiB)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Requests-per-minute limits by tenant tier (spec.md §4.10)
    #[serde(default)]
    pub tier_limits: TierLimits,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            tier_limits: TierLimits::default(),
        }
    }
}

/// Per-tier default ingest rate limits (requests per minute)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierLimits {
    #[serde(default = "default_free_tier_rpm")]
    pub free: u32,
    #[serde(default = "default_starter_tier_rpm")]
    pub starter: u32,
    #[serde(default = "default_pro_tier_rpm")]
    pub pro: u32,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            free: default_free_tier_rpm(),
            starter: default_starter_tier_rpm(),
            pro: default_pro_tier_rpm(),
        }
    }
}

/// Delivery orchestrator configuration (spec.md §4.9, §5, §6.4)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Bound on concurrently-processed `submission.received` events (default 32)
    #[serde(default = "default_max_concurrent_events")]
    pub max_concurrent_events: usize,

    /// Per-submission fan-out concurrency bound (default 10)
    #[serde(default = "default_per_submission_fanout")]
    pub per_submission_fanout: usize,

    /// Per-tenant global fan-out cap across all in-flight submissions (default 50)
    #[serde(default = "default_per_tenant_cap")]
    pub per_tenant_cap: usize,

    /// Default per-destination rate limit, requests per second, absent an override
    /// on the Destination record (default 10, i.e. 600/min)
    #[serde(default = "default_destination_rps")]
    pub default_destination_rps: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_events: default_max_concurrent_events(),
            per_submission_fanout: default_per_submission_fanout(),
            per_tenant_cap: default_per_tenant_cap(),
            default_destination_rps: default_destination_rps(),
        }
    }
}

/// Retry controller configuration (spec.md §4.9, §4.11, §6.4)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum delivery attempts per destination (default 6)
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds for exponential backoff (default 1000)
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on the per-attempt delay in milliseconds (default 60000)
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Hard wall-clock ceiling, in milliseconds, across all attempts for one
    /// destination before the delivery is terminally failed (default 3600000)
    #[serde(default = "default_retry_max_event_age_ms")]
    pub max_event_age_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            max_event_age_ms: default_retry_max_event_age_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_event_age(&self) -> Duration {
        Duration::from_millis(self.max_event_age_ms)
    }
}

/// Persister retry configuration (spec.md §4.3, §4.6): a fixed 8-attempt
/// backoff independent of the delivery orchestrator's own retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersisterConfig {
    #[serde(default = "default_persister_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_persister_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_persister_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_persister_max_attempts(),
            base_delay_ms: default_persister_base_delay_ms(),
            max_delay_ms: default_persister_max_delay_ms(),
        }
    }
}

impl PersisterConfig {
    /// Borrows as a [`RetryConfig`] so [`crate::retry`]'s backoff math can be
    /// reused as-is; `max_event_age_ms` is unused by the persister, which
    /// bounds retries purely by attempt count.
    pub fn as_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            max_event_age_ms: u64::MAX,
        }
    }
}

/// Query API configuration (spec.md §4.12, §6.4)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default page size when `limit` is absent or zero (default 50)
    #[serde(default = "default_query_default_limit")]
    pub default_limit: u32,

    /// Maximum page size; larger requests are clamped (default 200)
    #[serde(default = "default_query_max_limit")]
    pub max_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_query_default_limit(),
            max_limit: default_query_max_limit(),
        }
    }
}

/// Redis configuration (optional; backs the `redis-cache` SecretStore adapter)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (redis://host:port or cluster URLs)
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing the Redis connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

/// NATS configuration (optional; backs the `nats` EventBus adapter)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,

    /// Connection name
    #[serde(default)]
    pub name: Option<String>,

    /// Max reconnection attempts
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: usize,

    /// Maximum retry attempts for initial connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

/// Middleware configuration (HTTP-layer ambient concerns, all optional)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Request tracking configuration (request IDs, header propagation)
    #[serde(default)]
    pub request_tracking: RequestTrackingConfig,

    /// Local (governor) rate limiting, belt-and-suspenders alongside the
    /// store-backed per-tenant limiter of spec.md §4.10.
    #[serde(default)]
    pub governor: Option<LocalRateLimitConfig>,

    /// Request body size limit in MB
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,

    /// Enable panic recovery middleware
    #[serde(default = "default_true")]
    pub catch_panic: bool,

    /// Enable compression
    #[serde(default = "default_true")]
    pub compression: bool,

    /// CORS mode: "permissive", "restrictive", or "disabled"
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            request_tracking: RequestTrackingConfig::default(),
            governor: None,
            body_limit_mb: default_body_limit_mb(),
            catch_panic: true,
            compression: true,
            cors_mode: default_cors_mode(),
        }
    }
}

/// Request tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrackingConfig {
    /// Enable request ID generation
    #[serde(default = "default_true")]
    pub request_id_enabled: bool,

    /// Enable header propagation
    #[serde(default = "default_true")]
    pub propagate_headers: bool,

    /// Enable sensitive header masking in logs
    #[serde(default = "default_true")]
    pub mask_sensitive_headers: bool,
}

impl Default for RequestTrackingConfig {
    fn default() -> Self {
        Self {
            request_id_enabled: true,
            propagate_headers: true,
            mask_sensitive_headers: true,
        }
    }
}

/// Local rate limiting configuration (governor-based)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRateLimitConfig {
    /// Maximum requests per period
    #[serde(default = "default_governor_requests")]
    pub requests_per_period: u32,

    /// Time period in seconds
    #[serde(default = "default_governor_period_secs")]
    pub period_secs: u64,

    /// Burst size (allow temporary spikes)
    #[serde(default = "default_governor_burst")]
    pub burst_size: u32,
}

impl LocalRateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

// Default value functions

fn default_service_name() -> String {
    "formbridge".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_graceful_shutdown_timeout_secs() -> u64 {
    30
}

fn default_replay_window_seconds() -> i64 {
    300
}

fn default_secret_cache_ttl_seconds() -> u64 {
    300
}

fn default_max_payload_bytes() -> usize {
    262_144
}

fn default_free_tier_rpm() -> u32 {
    60
}

fn default_starter_tier_rpm() -> u32 {
    300
}

fn default_pro_tier_rpm() -> u32 {
    1000
}

fn default_max_concurrent_events() -> usize {
    32
}

fn default_per_submission_fanout() -> usize {
    10
}

fn default_per_tenant_cap() -> usize {
    50
}

fn default_destination_rps() -> u32 {
    10
}

fn default_retry_max_attempts() -> u32 {
    6
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

fn default_retry_max_event_age_ms() -> u64 {
    3_600_000
}

fn default_persister_max_attempts() -> u32 {
    8
}

fn default_persister_base_delay_ms() -> u64 {
    1000
}

fn default_persister_max_delay_ms() -> u64 {
    60_000
}

fn default_query_default_limit() -> u32 {
    50
}

fn default_query_max_limit() -> u32 {
    200
}

fn default_redis_max_connections() -> usize {
    20
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_max_reconnects() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

fn default_body_limit_mb() -> usize {
    1 // ingest payload is capped well below 1 MB; this guards the raw body reader
}

fn default_cors_mode() -> String {
    "permissive".to_string()
}

fn default_governor_requests() -> u32 {
    100
}

fn default_governor_period_secs() -> u64 {
    60
}

fn default_governor_burst() -> u32 {
    10
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/formbridge/{service_name}/config.toml
    /// 3. System directory: /etc/formbridge/{service_name}/config.toml
    ///
    /// Environment variables (`FORMBRIDGE_` prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| default_service_name());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("FORMBRIDGE_").split("_"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file, bypassing XDG directories.
    /// Useful for testing or non-standard deployments.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FORMBRIDGE_").split("_"))
            .extract()?;

        Ok(config)
    }

    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("formbridge");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/formbridge").join(service_name).join("config.toml"));

        paths
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: default_service_name(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
                graceful_shutdown_timeout_secs: default_graceful_shutdown_timeout_secs(),
                metrics_enabled: true,
            },
            auth: AuthConfig::default(),
            ingest: IngestConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            retry: RetryConfig::default(),
            persister: PersisterConfig::default(),
            query: QueryConfig::default(),
            secret_store: SecretStoreConfig::default(),
            middleware: MiddlewareConfig::default(),
            nats: None,
            redis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.ingest.max_payload_bytes, 262_144);
        assert_eq!(config.ingest.tier_limits.free, 60);
        assert_eq!(config.ingest.tier_limits.starter, 300);
        assert_eq!(config.ingest.tier_limits.pro, 1000);
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.query.default_limit, 50);
        assert_eq!(config.query.max_limit, 200);
        assert_eq!(config.orchestrator.max_concurrent_events, 32);
        assert_eq!(config.orchestrator.per_submission_fanout, 10);
        assert_eq!(config.orchestrator.per_tenant_cap, 50);
    }

    #[test]
    fn test_load_from_env_overrides_defaults() {
        std::env::set_var("FORMBRIDGE_RETRY_MAX_ATTEMPTS", "9");
        let config = Config::load_from("/nonexistent/config.toml").unwrap();
        assert_eq!(config.retry.max_attempts, 9);
        std::env::remove_var("FORMBRIDGE_RETRY_MAX_ATTEMPTS");
    }
}
