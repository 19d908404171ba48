//! NATS-backed EventBus adapter (`nats` feature): production backing for
//! [`crate::ports::EventBus`], grounded on the same connect-with-retry
//! idiom used elsewhere in this crate for external dependencies.

#[cfg(feature = "nats")]
use async_nats::Client;
use std::time::Duration;

use crate::config::NatsConfig;
use crate::error::{Error, Result};

#[cfg(feature = "nats")]
pub use adapter::NatsEventBus;

/// Create a NATS client with retry logic, per `config.max_retries`.
#[cfg(feature = "nats")]
pub(crate) async fn create_client(config: &NatsConfig) -> Result<Client> {
    create_client_with_retries(config, config.max_retries).await
}

#[cfg(feature = "nats")]
async fn create_client_with_retries(config: &NatsConfig, max_retries: u32) -> Result<Client> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_client(config).await {
            Ok(client) => {
                if attempt > 0 {
                    tracing::info!("NATS connection established after {} attempt(s)", attempt + 1);
                } else {
                    tracing::info!("NATS client connected to {}", config.url);
                }
                return Ok(client);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!("Failed to connect to NATS after {} attempts: {}", max_retries + 1, e);
                    return Err(e);
                }

                let delay_multiplier = 2_u32.pow(attempt.saturating_sub(1));
                let delay = base_delay * delay_multiplier;

                tracing::warn!("NATS connection attempt {} failed: {}. Retrying in {:?}...", attempt, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(feature = "nats")]
async fn try_create_client(config: &NatsConfig) -> Result<Client> {
    let mut opts = async_nats::ConnectOptions::new();

    if let Some(name) = &config.name {
        opts = opts.name(name);
    }

    opts = opts.max_reconnects(Some(config.max_reconnects));

    opts.connect(&config.url)
        .await
        .map_err(|e| Error::Nats(format!("failed to connect to NATS server at '{}': {e}", config.url)))
}

#[cfg(feature = "nats")]
mod adapter {
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use futures::StreamExt;

    use super::{create_client, Client};
    use crate::config::NatsConfig;
    use crate::domain::CanonicalEvent;
    use crate::error::{Error, Result};
    use crate::ports::event_bus::{
        DeliverDlqEntry, PersistDlqEntry, SubmissionClosed, DELIVER_DLQ_SUBJECT, PERSIST_DLQ_SUBJECT,
        SUBMISSION_CLOSED_SUBJECT, SUBMISSION_RECEIVED_SUBJECT,
    };
    use crate::ports::EventBus;

    /// EventBus backed by a live NATS connection.
    pub struct NatsEventBus {
        client: Client,
    }

    impl NatsEventBus {
        pub async fn connect(config: &NatsConfig) -> Result<Self> {
            Ok(Self { client: create_client(config).await? })
        }
    }

    #[async_trait]
    impl EventBus for NatsEventBus {
        async fn publish_submission_received(&self, event: &CanonicalEvent) -> Result<()> {
            let payload = serde_json::to_vec(event).map_err(|e| Error::Internal(e.to_string()))?;
            self.client
                .publish(SUBMISSION_RECEIVED_SUBJECT, payload.into())
                .await
                .map_err(|e| Error::BusPublishFailed(e.to_string()))
        }

        async fn subscribe_submission_received(&self) -> Result<BoxStream<'static, CanonicalEvent>> {
            let subscriber = self
                .client
                .subscribe(SUBMISSION_RECEIVED_SUBJECT)
                .await
                .map_err(|e| Error::BusPublishFailed(e.to_string()))?;

            let stream = subscriber.filter_map(|message| async move {
                serde_json::from_slice::<CanonicalEvent>(&message.payload).ok()
            });

            Ok(Box::pin(stream))
        }

        async fn publish_persist_dlq(&self, entry: &PersistDlqEntry) -> Result<()> {
            let payload = serde_json::to_vec(entry).map_err(|e| Error::Internal(e.to_string()))?;
            self.client
                .publish(PERSIST_DLQ_SUBJECT, payload.into())
                .await
                .map_err(|e| Error::BusPublishFailed(e.to_string()))
        }

        async fn publish_deliver_dlq(&self, entry: &DeliverDlqEntry) -> Result<()> {
            let payload = serde_json::to_vec(entry).map_err(|e| Error::Internal(e.to_string()))?;
            self.client
                .publish(DELIVER_DLQ_SUBJECT, payload.into())
                .await
                .map_err(|e| Error::BusPublishFailed(e.to_string()))
        }

        async fn publish_submission_closed(&self, event: &SubmissionClosed) -> Result<()> {
            let payload = serde_json::to_vec(event).map_err(|e| Error::Internal(e.to_string()))?;
            self.client
                .publish(SUBMISSION_CLOSED_SUBJECT, payload.into())
                .await
                .map_err(|e| Error::BusPublishFailed(e.to_string()))
        }

        async fn is_ready(&self) -> bool {
            matches!(self.client.connection_state(), async_nats::connection::State::Connected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nats_config_fields() {
        let config = NatsConfig {
            url: "nats://localhost:4222".to_string(),
            name: Some("formbridge".to_string()),
            max_reconnects: 10,
            max_retries: 5,
            retry_delay_secs: 2,
        };

        assert_eq!(config.max_reconnects, 10);
        assert_eq!(config.name, Some("formbridge".to_string()));
    }
}
