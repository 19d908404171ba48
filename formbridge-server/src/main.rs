//! Form-Bridge HTTP entrypoint: wires port adapters, builds the router, and
//! runs the delivery orchestrator alongside the HTTP server.

mod health;
mod http;
mod middleware;
mod server;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;

use formbridge_core::config::Config;
use formbridge_core::connectors::{Connector, RestConnector};
use formbridge_core::inmemory::{InMemoryEventBus, InMemorySecretStore, InMemorySubmissionStore};
use formbridge_core::observability::init_tracing;
use formbridge_core::orchestrator::Orchestrator;
use formbridge_core::persister::Persister;
use formbridge_core::ports::{EventBus, SecretStore, SubmissionStore};

use middleware::GovernorRateLimit;
use server::Server;
use state::AppState;

#[tokio::main]
async fn main() -> formbridge_core::error::Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    let secrets: Arc<dyn SecretStore> = build_secret_store(&config).await?;
    let store: Arc<dyn SubmissionStore> = Arc::new(InMemorySubmissionStore::new());
    let bus: Arc<dyn EventBus> = build_event_bus(&config).await?;
    let connector: Arc<dyn Connector> = Arc::new(RestConnector::new(Duration::from_secs(10)));

    let app_state = AppState::new(config.clone(), secrets.clone(), store.clone(), bus.clone(), connector.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        secrets.clone(),
        bus.clone(),
        connector.clone(),
        config.orchestrator.clone(),
        config.retry.clone(),
    ));
    let orchestrator_handle = tokio::spawn(orchestrator.run());

    let persister = Arc::new(Persister::new(store.clone(), bus.clone(), config.persister.clone()));
    let persister_handle = tokio::spawn(persister.run());

    let mut app = Router::new()
        .route("/ingest", post(http::ingest::ingest))
        .route("/submissions", get(http::query::list))
        .route("/health", get(health::health))
        .route("/ready", get(health::readiness))
        .with_state(app_state);

    if let Some(ref governor_config) = config.middleware.governor {
        let limiter = GovernorRateLimit::new(governor_config);
        app = app.layer(axum::middleware::from_fn_with_state(limiter, middleware::governor_middleware));
    }

    Server::new(config).serve(app).await?;

    orchestrator_handle.abort();
    persister_handle.abort();
    Ok(())
}

async fn build_secret_store(config: &Config) -> formbridge_core::error::Result<Arc<dyn SecretStore>> {
    #[cfg(feature = "redis-cache")]
    if let Some(ref redis_config) = config.redis {
        let inner: Box<dyn SecretStore> = Box::new(InMemorySecretStore::new());
        let cached = formbridge_core::cache::RedisSecretStore::connect(redis_config, &config.secret_store, inner).await?;
        return Ok(Arc::new(cached));
    }

    let _ = config;
    Ok(Arc::new(InMemorySecretStore::new()))
}

async fn build_event_bus(config: &Config) -> formbridge_core::error::Result<Arc<dyn EventBus>> {
    #[cfg(feature = "nats")]
    if let Some(ref nats_config) = config.nats {
        let bus = formbridge_core::events::NatsEventBus::connect(nats_config).await?;
        return Ok(Arc::new(bus));
    }

    let _ = config;
    Ok(Arc::new(InMemoryEventBus::default()))
}
