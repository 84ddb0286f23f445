//! Error types shared by idlegrid providers.

use std::time::Duration;

use thiserror::Error;

use crate::identity::{WorkloadIdentity, WorkloadKind};

/// Result type alias for provider operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

/// Errors produced while encoding or decoding an identity token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("malformed identity token {token:?}: expected 4 components, found {found}")]
    Malformed { token: String, found: usize },

    #[error("invalid replica count {0:?}: expected a non-negative base-10 integer")]
    InvalidReplicaCount(String),

    #[error("unsupported workload kind {0:?}")]
    UnsupportedKind(String),

    #[error("identity {0} is empty")]
    EmptyField(&'static str),

    #[error("identity {field} {value:?} contains the delimiter {delimiter:?}")]
    DelimiterInField {
        field: &'static str,
        value: String,
        delimiter: String,
    },
}

/// Failures talking to the remote control plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The write carried a stale resource version.
    #[error("conflicting update to {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("control plane rejected request ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("control plane unreachable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("control plane call timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode request: {0}")]
    Encode(String),

    /// Local client failure (config, auth plugin, response decoding).
    #[error("client error: {0}")]
    Client(String),
}

impl ControlPlaneError {
    /// Whether the error came from the connection rather than the API.
    ///
    /// Only transport failures are subject to the reconnect policy.
    pub fn is_transport(&self) -> bool {
        matches!(self, ControlPlaneError::Transport(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ControlPlaneError::Conflict { .. })
    }
}

/// Errors surfaced by `Provider` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("control plane error for {kind} {namespace}/{name}: {source}")]
    ControlPlane {
        kind: WorkloadKind,
        namespace: String,
        name: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("no service in namespace {namespace} selects {key}={value}")]
    NoMatchingService {
        namespace: String,
        key: String,
        value: String,
    },

    #[error("no endpoints reported in namespace {namespace}")]
    NoEndpoints { namespace: String },

    #[error("{kind} {namespace}/{name} has no {key:?} label on its pod template")]
    MissingSelectorLabel {
        kind: WorkloadKind,
        namespace: String,
        name: String,
        key: String,
    },
}

impl ScaleError {
    /// Wrap a control-plane failure with the workload it concerned.
    pub fn control_plane(identity: &WorkloadIdentity, source: ControlPlaneError) -> Self {
        ScaleError::ControlPlane {
            kind: identity.kind,
            namespace: identity.namespace.clone(),
            name: identity.name.clone(),
            source,
        }
    }
}

/// Invalid `ProviderConfig` values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("client_qps must be a positive finite number, got {0}")]
    InvalidQps(f64),

    #[error("client_burst must be at least 1")]
    InvalidBurst,

    #[error("identity_delimiter must not be empty")]
    EmptyDelimiter,

    #[error("selector_label must not be empty")]
    EmptySelectorLabel,

    #[error("reconnect_initial_delay ({initial:?}) exceeds reconnect_max_delay ({max:?})")]
    DelayOrder { initial: Duration, max: Duration },

    #[error("reconnect_initial_delay must be non-zero")]
    ZeroInitialDelay,

    #[error("request_timeout must be non-zero")]
    ZeroTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_plane_error_carries_workload_context() {
        let identity = WorkloadIdentity::new(WorkloadKind::Deployment, "shop", "api", 2);
        let err = ScaleError::control_plane(
            &identity,
            ControlPlaneError::NotFound {
                resource: "deployments/api".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "control plane error for deployment shop/api: deployments/api not found"
        );
    }

    #[test]
    fn identity_errors_name_the_field() {
        assert_eq!(
            IdentityError::EmptyField("namespace").to_string(),
            "identity namespace is empty"
        );
        let err = IdentityError::DelimiterInField {
            field: "name",
            value: "my_app".to_string(),
            delimiter: "_".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "identity name \"my_app\" contains the delimiter \"_\""
        );
    }

    #[test]
    fn only_transport_errors_are_transport() {
        assert!(ControlPlaneError::Transport("reset".into()).is_transport());
        assert!(!ControlPlaneError::Timeout(Duration::from_secs(5)).is_transport());
        assert!(
            !ControlPlaneError::Api {
                code: 403,
                message: "forbidden".into()
            }
            .is_transport()
        );
    }
}
