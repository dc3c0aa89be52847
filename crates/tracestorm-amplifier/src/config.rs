// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Amplifier run configuration.
//!
//! All fields are validated at construction and immutable afterwards;
//! configuration errors are fatal before any worker starts.

use reqwest::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid collector endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("{0} must be a positive integer")]
    NonPositive(&'static str),

    #[error("amplifier constructed with an already cancelled token")]
    AlreadyCancelled,

    #[error("failed to build http transport: {0}")]
    Transport(String),
}

/// Immutable configuration for one amplifier run.
#[derive(Debug, Clone)]
pub struct AmplifierConfig {
    /// Target collector endpoint receiving the amplified traffic.
    pub endpoint: Url,
    /// Number of concurrent dispatch workers.
    pub threads: usize,
    /// Resend attempts per worker.
    pub repeat: usize,
    /// Accumulated span count that triggers dispatch.
    pub expected_spans: usize,
}

impl AmplifierConfig {
    pub fn new(
        endpoint: &str,
        threads: usize,
        repeat: usize,
        expected_spans: usize,
    ) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(format!(
                "{endpoint}: scheme must be http or https"
            )));
        }
        if threads == 0 {
            return Err(ConfigError::NonPositive("threads"));
        }
        if repeat == 0 {
            return Err(ConfigError::NonPositive("repeat"));
        }
        if expected_spans == 0 {
            return Err(ConfigError::NonPositive("expected_spans"));
        }
        Ok(AmplifierConfig {
            endpoint,
            threads,
            repeat,
            expected_spans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = AmplifierConfig::new("http://127.0.0.1:9529/v0.4/traces", 3, 5, 10).unwrap();
        assert_eq!(config.endpoint.as_str(), "http://127.0.0.1:9529/v0.4/traces");
        assert_eq!(config.threads, 3);
        assert_eq!(config.repeat, 5);
        assert_eq!(config.expected_spans, 10);
    }

    #[test]
    fn test_malformed_endpoint_rejected() {
        let err = AmplifierConfig::new("not a url", 1, 1, 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let err = AmplifierConfig::new("ftp://127.0.0.1/traces", 1, 1, 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_zero_counts_rejected() {
        let url = "http://127.0.0.1:9529/v0.4/traces";
        assert!(matches!(
            AmplifierConfig::new(url, 0, 5, 10).unwrap_err(),
            ConfigError::NonPositive("threads")
        ));
        assert!(matches!(
            AmplifierConfig::new(url, 3, 0, 10).unwrap_err(),
            ConfigError::NonPositive("repeat")
        ));
        assert!(matches!(
            AmplifierConfig::new(url, 3, 5, 0).unwrap_err(),
            ConfigError::NonPositive("expected_spans")
        ));
    }
}
