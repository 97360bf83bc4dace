//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check that addresses are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {value:?} is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("backend.address: {0:?} must be host:port")]
    InvalidBackend(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("buffers.max_header_bytes: {0} is smaller than the header terminator")]
    HeaderLimitTooSmall(usize),

    #[error("observability.log_level: unknown level {0:?}")]
    UnknownLogLevel(String),

    #[error("observability.log_format: unknown format {0:?}")]
    UnknownLogFormat(String),
}

/// Check every semantic rule and collect all violations.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    if !is_host_port(&config.backend.address) {
        errors.push(ValidationError::InvalidBackend(config.backend.address.clone()));
    }

    let buffers = &config.buffers;
    if buffers.initial_capacity == 0 {
        errors.push(ValidationError::Zero("buffers.initial_capacity"));
    }
    if buffers.max_header_bytes < 4 {
        errors.push(ValidationError::HeaderLimitTooSmall(buffers.max_header_bytes));
    }
    if buffers.response_high_water == 0 {
        errors.push(ValidationError::Zero("buffers.response_high_water"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.idle_secs"));
    }

    if config.reactor.poll_timeout_ms == 0 {
        errors.push(ValidationError::Zero("reactor.poll_timeout_ms"));
    }
    if config.reactor.events_capacity == 0 {
        errors.push(ValidationError::Zero("reactor.events_capacity"));
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(obs.log_level.clone()));
    }
    if !LOG_FORMATS.contains(&obs.log_format.as_str()) {
        errors.push(ValidationError::UnknownLogFormat(obs.log_format.clone()));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: obs.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a non-empty host and a numeric port.
fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
