//! HTTP-layer ambient middleware: request tracking and a local rate-limit
//! backstop. Authentication and the tenant-scoped rate limit both live in
//! `formbridge_core` (spec §4.1, §4.10), not here.

pub mod governor;
pub mod request_tracking;

pub use governor::{governor_middleware, GovernorRateLimit};
pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
