//! Provider configuration.
//!
//! Built once at process start, then shared read-only by every provider.
//! Durations are written as human strings in TOML:
//!
//! ```toml
//! client_qps = 5.0
//! client_burst = 10
//! identity_delimiter = "_"
//! reconnect_initial_delay = "1s"
//! reconnect_max_delay = "30s"
//! reconnect_max_attempts = 0
//! selector_label = "app"
//! request_timeout = "5s"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::ReconnectBackoff;
use crate::error::ConfigError;
use crate::identity::{DEFAULT_DELIMITER, IdentityCodec};
use crate::throttle::RequestThrottle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Sustained request rate towards the control plane.
    pub client_qps: f64,
    /// Requests allowed above `client_qps` in a burst.
    pub client_burst: u32,
    /// Separator between identity token fields.
    pub identity_delimiter: String,
    #[serde(with = "duration_str")]
    pub reconnect_initial_delay: Duration,
    #[serde(with = "duration_str")]
    pub reconnect_max_delay: Duration,
    /// Consecutive failed attempts before giving up. 0 retries forever.
    pub reconnect_max_attempts: u32,
    /// Pod template label whose value services select on.
    pub selector_label: String,
    /// Deadline for a whole provider operation.
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_qps: 5.0,
            client_burst: 10,
            identity_delimiter: DEFAULT_DELIMITER.to_string(),
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_max_attempts: 0,
            selector_label: "app".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ProviderConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ProviderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.client_qps.is_finite() || self.client_qps <= 0.0 {
            return Err(ConfigError::InvalidQps(self.client_qps));
        }
        if self.client_burst == 0 {
            return Err(ConfigError::InvalidBurst);
        }
        if self.identity_delimiter.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        if self.selector_label.is_empty() {
            return Err(ConfigError::EmptySelectorLabel);
        }
        if self.reconnect_initial_delay.is_zero() {
            return Err(ConfigError::ZeroInitialDelay);
        }
        if self.reconnect_initial_delay > self.reconnect_max_delay {
            return Err(ConfigError::DelayOrder {
                initial: self.reconnect_initial_delay,
                max: self.reconnect_max_delay,
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn identity_codec(&self) -> IdentityCodec {
        IdentityCodec::new(self.identity_delimiter.clone())
    }

    /// A fresh backoff sequence following the reconnect settings.
    pub fn reconnect_backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(
            self.reconnect_initial_delay,
            self.reconnect_max_delay,
            self.reconnect_max_attempts,
        )
    }

    pub fn request_throttle(&self) -> RequestThrottle {
        RequestThrottle::new(self.client_qps, self.client_burst)
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Render a duration in the form `parse_duration` reads back.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 && d.as_secs() > 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid duration {s:?}")))
    }
}
