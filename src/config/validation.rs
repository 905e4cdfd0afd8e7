//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::AppConfig;
use crate::http::server::HEALTH_PATH;

/// A single semantic problem with a config.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.shutdown.drain_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "shutdown.drain_timeout_ms",
            "must be greater than zero",
        ));
    }

    let db = &config.database;
    if db.max_connections == 0 {
        errors.push(ValidationError::new(
            "database.max_connections",
            "must be greater than zero",
        ));
    }
    if db.connect_attempts == 0 {
        errors.push(ValidationError::new(
            "database.connect_attempts",
            "must be at least 1",
        ));
    }
    if db.retry_base_delay_ms > db.retry_max_delay_ms {
        errors.push(ValidationError::new(
            "database.retry_base_delay_ms",
            "must not exceed retry_max_delay_ms",
        ));
    }

    let metrics_path = &config.observability.metrics_path;
    if !metrics_path.starts_with('/') {
        errors.push(ValidationError::new(
            "observability.metrics_path",
            "must start with '/'",
        ));
    } else if metrics_path == HEALTH_PATH {
        errors.push(ValidationError::new(
            "observability.metrics_path",
            format!("conflicts with {}", HEALTH_PATH),
        ));
    } else if let Some(problem) = static_path_problem(metrics_path) {
        errors.push(ValidationError::new("observability.metrics_path", problem));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Why `path` is not a plain route path, if it isn't.
///
/// The router rejects captures, wildcards, and legacy `:param`/`*rest`
/// segments in a static route by panicking, so they are caught here.
fn static_path_problem(path: &str) -> Option<String> {
    if path.contains(['{', '}']) {
        return Some(format!("'{}' must not contain route captures", path));
    }
    path.split('/')
        .find(|segment| segment.starts_with(':') || segment.starts_with('*'))
        .map(|segment| format!("segment '{}' is not allowed in '{}'", segment, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.shutdown.drain_timeout_ms = 0;
        config.database.connect_attempts = 0;
        config.observability.metrics_path = "metrics".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "shutdown.drain_timeout_ms",
                "database.connect_attempts",
                "observability.metrics_path",
            ]
        );
    }

    #[test]
    fn test_backoff_bounds_checked() {
        let mut config = AppConfig::default();
        config.database.retry_base_delay_ms = 5_000;
        config.database.retry_max_delay_ms = 100;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "database.retry_base_delay_ms");
    }

    #[test]
    fn test_metrics_path_must_be_static() {
        for path in ["/{", "/a/{name}", "/a/*x", "/:id"] {
            let mut config = AppConfig::default();
            config.observability.metrics_path = path.into();
            let errors = validate_config(&config).unwrap_err();
            assert_eq!(errors[0].field, "observability.metrics_path", "{}", path);
        }

        for path in ["/", "/metrics", "/internal/metrics", "/metrics.txt"] {
            let mut config = AppConfig::default();
            config.observability.metrics_path = path.into();
            assert!(validate_config(&config).is_ok(), "{}", path);
        }
    }

    #[test]
    fn test_metrics_path_cannot_shadow_health() {
        let mut config = AppConfig::default();
        config.observability.metrics_path = HEALTH_PATH.into();
        assert!(validate_config(&config).is_err());
    }
}
