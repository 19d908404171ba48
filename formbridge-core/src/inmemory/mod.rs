//! Reference in-memory adapters for the three ports.
//!
//! These back local development, tests, and the default (no production
//! feature enabled) build. They are fully functional, not stubs: the fixed
//! window rate limiter, idempotent submission creation, and pub/sub fan-out
//! semantics are real, just backed by a `Mutex`-guarded in-process map
//! instead of a network store.

pub mod event_bus;
pub mod secret_store;
pub mod submission_store;

pub use event_bus::InMemoryEventBus;
pub use secret_store::InMemorySecretStore;
pub use submission_store::InMemorySubmissionStore;
