//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, ceiling covers at least one poll)
//! - Check that endpoints and bind addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::MonitorConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("monitor.poll_ceiling_secs must cover at least one poll interval")]
    CeilingShorterThanInterval,

    #[error("explorer.api_key is required when the explorer is enabled")]
    MissingApiKey,

    #[error("observability.metrics_address is not a socket address: {0}")]
    InvalidMetricsAddress(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.blockchain.rpc_url.parse::<url::Url>().is_err() {
        errors.push(ValidationError::InvalidUrl {
            field: "blockchain.rpc_url",
            value: config.blockchain.rpc_url.clone(),
        });
    }
    for failover in &config.blockchain.failover_urls {
        if failover.parse::<url::Url>().is_err() {
            errors.push(ValidationError::InvalidUrl {
                field: "blockchain.failover_urls",
                value: failover.clone(),
            });
        }
    }
    if config.blockchain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::Zero("blockchain.rpc_timeout_secs"));
    }
    if config.blockchain.block_poll_interval_ms == 0 {
        errors.push(ValidationError::Zero("blockchain.block_poll_interval_ms"));
    }

    if config.explorer.enabled {
        if config.explorer.api_url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::InvalidUrl {
                field: "explorer.api_url",
                value: config.explorer.api_url.clone(),
            });
        }
        if config.explorer.api_key.is_empty() {
            errors.push(ValidationError::MissingApiKey);
        }
    }

    if config.monitor.network_id.is_empty() {
        errors.push(ValidationError::Empty("monitor.network_id"));
    }
    if config.monitor.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero("monitor.poll_interval_ms"));
    } else if config.monitor.poll_ceiling() < config.monitor.poll_interval() {
        errors.push(ValidationError::CeilingShorterThanInterval);
    }

    if config.persistence.path.is_empty() {
        errors.push(ValidationError::Empty("persistence.path"));
    }
    if config.persistence.key.is_empty() {
        errors.push(ValidationError::Empty("persistence.key"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&MonitorConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = MonitorConfig::default();
        config.blockchain.rpc_url = "not a url".to_string();
        config.monitor.poll_interval_ms = 0;
        config.explorer.enabled = true;
        config.persistence.key = String::new();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::MissingApiKey));
        assert!(errors.contains(&ValidationError::Zero("monitor.poll_interval_ms")));
    }

    #[test]
    fn test_ceiling_shorter_than_interval() {
        let mut config = MonitorConfig::default();
        config.monitor.poll_interval_ms = 5_000;
        config.monitor.poll_ceiling_secs = 1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::CeilingShorterThanInterval]);
    }
}
