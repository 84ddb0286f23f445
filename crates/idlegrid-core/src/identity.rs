//! Workload identity tokens.
//!
//! The proxy layer refers to a workload by a single delimited string:
//!
//! ```text
//! <kind><delim><namespace><delim><name><delim><replicas>
//! deployment_shop_api_3
//! ```
//!
//! Tokens are parsed into a [`WorkloadIdentity`] once, at the provider
//! boundary, and never re-parsed afterwards. A token must split into exactly
//! four components; namespaces and names containing the delimiter are
//! refused at encode time so every token produced here decodes back to the
//! identity it came from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = "_";

/// Workload kinds a cluster provider can scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// Token spelling of the kind (lowercase, case-sensitive).
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "statefulset",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deployment" => Ok(WorkloadKind::Deployment),
            "statefulset" => Ok(WorkloadKind::StatefulSet),
            other => Err(IdentityError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Structured form of an identity token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    /// Replica count to restore on scale-up. Scale-down always targets 0.
    pub target_replicas: u32,
}

impl WorkloadIdentity {
    pub fn new(
        kind: WorkloadKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        target_replicas: u32,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            target_replicas,
        }
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Encodes and decodes identity tokens with a fixed delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCodec {
    delimiter: String,
}

impl Default for IdentityCodec {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl IdentityCodec {
    /// Create a codec. The delimiter must be non-empty; `ProviderConfig`
    /// validation guarantees this for configured codecs.
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Join the identity into a token.
    pub fn encode(&self, identity: &WorkloadIdentity) -> Result<String, IdentityError> {
        self.check_field("namespace", &identity.namespace)?;
        self.check_field("name", &identity.name)?;

        let d = &self.delimiter;
        Ok(format!(
            "{kind}{d}{ns}{d}{name}{d}{replicas}",
            kind = identity.kind,
            ns = identity.namespace,
            name = identity.name,
            replicas = identity.target_replicas,
        ))
    }

    /// Parse a token into its structured form.
    pub fn decode(&self, token: &str) -> Result<WorkloadIdentity, IdentityError> {
        let parts: Vec<&str> = token.split(self.delimiter.as_str()).collect();
        let [kind, namespace, name, replicas] = parts.as_slice() else {
            return Err(IdentityError::Malformed {
                token: token.to_string(),
                found: parts.len(),
            });
        };

        let target_replicas = parse_replicas(replicas)?;
        let kind = kind.parse::<WorkloadKind>()?;

        if namespace.is_empty() {
            return Err(IdentityError::EmptyField("namespace"));
        }
        if name.is_empty() {
            return Err(IdentityError::EmptyField("name"));
        }

        Ok(WorkloadIdentity {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            target_replicas,
        })
    }

    fn check_field(&self, field: &'static str, value: &str) -> Result<(), IdentityError> {
        if value.is_empty() {
            return Err(IdentityError::EmptyField(field));
        }
        if value.contains(self.delimiter.as_str()) {
            return Err(IdentityError::DelimiterInField {
                field,
                value: value.to_string(),
                delimiter: self.delimiter.clone(),
            });
        }
        Ok(())
    }
}

/// Plain base-10 digits only: no sign, no whitespace.
fn parse_replicas(s: &str) -> Result<u32, IdentityError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentityError::InvalidReplicaCount(s.to_string()));
    }
    s.parse::<u32>()
        .map_err(|_| IdentityError::InvalidReplicaCount(s.to_string()))
}
