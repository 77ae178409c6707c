//! Endpoint registry data model and configuration store for Toolgate.
//!
//! The persisted document is JSON with camelCase field names. A legacy
//! single-URL document is detected and upgraded to the endpoint-list form
//! the first time it is loaded; the upgrade is one-way.

/// Endpoint records, patches, and the service configuration document.
pub mod endpoint;
/// Load/save of the service configuration document.
pub mod store;

pub use endpoint::{
    redact_url, Endpoint, EndpointDraft, EndpointPatch, EndpointStatus, LoadBalancing,
    ReconnectPolicy, ServiceConfig, SmartRoutingConfig, MIGRATED_ENDPOINT_ID, REDACTED_TOKEN,
};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
