//! idlegrid-core — shared pieces of every idlegrid scaling provider.
//!
//! A provider turns an identity token handed over by the proxy layer into
//! scale mutations and readiness checks against some backend. This crate
//! holds everything that does not depend on a particular backend:
//!
//! - [`identity`]: the delimited token format and its structured form
//! - [`provider`]: the `Provider` contract (scale up, scale down, is up)
//! - [`config`]: `ProviderConfig`, loaded from TOML
//! - [`backoff`]: reconnect backoff every provider honors
//! - [`throttle`]: client-side token bucket for control-plane calls
//! - [`error`]: the shared error taxonomy

pub mod backoff;
pub mod config;
pub mod error;
pub mod identity;
pub mod provider;
pub mod throttle;

pub use backoff::ReconnectBackoff;
pub use config::ProviderConfig;
pub use error::{ConfigError, ControlPlaneError, IdentityError, ScaleError, ScaleResult};
pub use identity::{IdentityCodec, WorkloadIdentity, WorkloadKind};
pub use provider::Provider;
pub use throttle::RequestThrottle;
