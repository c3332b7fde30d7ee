//! Static configuration for the SkyWalking tracer integration.
//!
//! Values are layered figment-style: serde defaults, then an optional YAML
//! file, then `SKYTRACE_`-prefixed environment variables, with later sources
//! winning. The result arrives at the tracer and reporter already resolved;
//! nothing here is re-validated downstream.
#![deny(warnings)]
#![deny(missing_docs)]

use std::path::Path;

use figment::providers::{Env, Format as _, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};

/// Capacity of the delayed-segment cache when none is configured.
const DEFAULT_MAX_CACHE_SIZE: usize = 1024;

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "SKYTRACE_";

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Configuration sources could not be read or deserialized.
    #[snafu(display("Failed to resolve tracer configuration."))]
    Resolve {
        /// Error source.
        source: figment::Error,
    },
}

/// Resolved configuration for the tracer and its segment reporter.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TracerConfiguration {
    /// Service name reported on every segment.
    service_name: String,

    /// Service instance name reported on every segment.
    instance_name: String,

    /// Inline token attached as `authentication` metadata on collector calls.
    ///
    /// Inline strings are the only supported token source.
    authentication: Option<String>,

    /// Reuse the upstream endpoint for requests that continue a trace.
    pass_endpoint: bool,

    /// Maximum number of finished segments buffered while the collector
    /// stream is unavailable.
    max_cache_size: usize,

    /// Endpoint the segment reporter connects to.
    collector_address: String,
}

impl Default for TracerConfiguration {
    fn default() -> Self {
        Self {
            service_name: "skytrace".to_string(),
            instance_name: "skytrace-instance".to_string(),
            authentication: None,
            pass_endpoint: false,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            collector_address: "http://127.0.0.1:11800".to_string(),
        }
    }
}

impl TracerConfiguration {
    /// Resolves configuration from defaults and environment variables.
    pub fn from_environment() -> Result<Self, ConfigurationError> {
        Self::resolve(Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Resolves configuration from defaults, the given YAML file, and
    /// environment variables, in that precedence order.
    pub fn from_yaml<P>(path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        Self::resolve(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Builds a configuration from an inline YAML document, ignoring the
    /// process environment.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        Self::resolve(Figment::from(Serialized::defaults(Self::default())).merge(Yaml::string(yaml)))
    }

    fn resolve(figment: Figment) -> Result<Self, ConfigurationError> {
        figment.extract().context(Resolve)
    }

    /// Service name reported on every segment.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Service instance name reported on every segment.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Inline authentication token for collector calls, if configured.
    pub fn authentication(&self) -> Option<&str> {
        self.authentication.as_deref()
    }

    /// Whether requests that continue a trace reuse the upstream endpoint.
    pub fn pass_endpoint(&self) -> bool {
        self.pass_endpoint
    }

    /// Maximum number of finished segments buffered while the collector
    /// stream is unavailable.
    pub fn max_cache_size(&self) -> usize {
        self.max_cache_size
    }

    /// Endpoint the segment reporter connects to.
    pub fn collector_address(&self) -> &str {
        &self.collector_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TracerConfiguration::default();

        assert_eq!(config.service_name(), "skytrace");
        assert_eq!(config.instance_name(), "skytrace-instance");
        assert_eq!(config.authentication(), None);
        assert!(!config.pass_endpoint());
        assert_eq!(config.max_cache_size(), 1024);
        assert_eq!(config.collector_address(), "http://127.0.0.1:11800");
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = r#"
            service_name: edge-gateway
            instance_name: edge-gateway-0
            authentication: "token-token-token"
            pass_endpoint: true
            max_cache_size: 2333
        "#;

        let config = TracerConfiguration::from_yaml_str(yaml).expect("configuration should resolve");

        assert_eq!(config.service_name(), "edge-gateway");
        assert_eq!(config.instance_name(), "edge-gateway-0");
        assert_eq!(config.authentication(), Some("token-token-token"));
        assert!(config.pass_endpoint());
        assert_eq!(config.max_cache_size(), 2333);
        // Untouched fields keep their defaults.
        assert_eq!(config.collector_address(), "http://127.0.0.1:11800");
    }

    #[test]
    fn rejects_mistyped_field() {
        let result = TracerConfiguration::from_yaml_str("max_cache_size: twenty");

        assert!(result.is_err());
    }
}
