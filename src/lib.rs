//! Confluent Cloud reconciliation client
//!
//! Declarative create/read/update/delete of Confluent Cloud clusters,
//! topics and API keys:
//! - [`session::SessionManager`] logs in once and caches the credential triple
//! - [`control_plane::ControlPlaneClient`] manages clusters and API keys
//! - [`data_plane::DataPlaneClient`] manages topics on one cluster
//! - [`retry::RetryPolicy`] retries mutating calls with backoff
//! - [`reconciler`] maps attribute maps to remote calls and back

pub mod config;
pub mod control_plane;
pub mod data_plane;
pub mod error;
pub mod reconciler;
pub mod retry;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::ProviderConfig;
pub use error::{Error, Result};
pub use reconciler::{
    Applied, AttrValue, Attributes, DataSourceKind, LifecycleState, Provider, ReadOutcome,
    Reconciler, ResourceKind,
};
pub use transport::CallContext;
