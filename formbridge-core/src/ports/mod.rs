//! Ports: the trait boundaries between domain logic and backing infrastructure.
//!
//! Every production adapter (NATS, Redis-backed cache, in-memory reference
//! implementations) implements one of these traits. Components depend on
//! `Arc<dyn Trait>`, never on a concrete adapter, so swapping backends never
//! touches [`crate::auth`], [`crate::ingest`], [`crate::orchestrator`], etc.

pub mod event_bus;
pub mod secret_store;
pub mod submission_store;

pub use event_bus::EventBus;
pub use secret_store::SecretStore;
pub use submission_store::SubmissionStore;
