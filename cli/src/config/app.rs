use super::{
    LoggingConfig,
    limits::*,
    servicebus::{DestinationsConfig, ServicebusConfig},
    validation::ConfigValidationError,
};
use serde::Deserialize;
use server::destination::validate_name;
use server::listener::ListenerOptions;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppConfig {
    #[serde(default)]
    servicebus: ServicebusConfig,
    #[serde(default)]
    destinations: DestinationsConfig,
    #[serde(default)]
    listener: ListenerConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl AppConfig {
    /// Validate the configuration against defined limits
    pub fn validate(&self) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        let max_messages = self.listener.max_messages();
        if !(1..=MAX_RECEIVE_BATCH_SIZE).contains(&max_messages) {
            errors.push(ConfigValidationError::MaxMessages {
                configured: max_messages,
                limit: MAX_RECEIVE_BATCH_SIZE,
            });
        }

        let receive_timeout_ms = self.listener.receive_timeout_ms();
        if !(1..=MAX_RECEIVE_TIMEOUT_MS).contains(&receive_timeout_ms) {
            errors.push(ConfigValidationError::ReceiveTimeout {
                configured: receive_timeout_ms,
                limit: MAX_RECEIVE_TIMEOUT_MS,
            });
        }

        let error_backoff_ms = self.listener.error_backoff_ms();
        if error_backoff_ms > MAX_ERROR_BACKOFF_MS {
            errors.push(ConfigValidationError::ErrorBackoff {
                configured: error_backoff_ms,
                limit: MAX_ERROR_BACKOFF_MS,
            });
        }

        if self.servicebus.client_id().trim().is_empty() {
            errors.push(ConfigValidationError::EmptyClientId);
        }

        let names = [
            ("queue", self.destinations.queue()),
            ("topic", self.destinations.topic()),
            ("subscription", self.destinations.subscription()),
        ];
        for (field, name) in names {
            if let Err(e) = validate_name(name) {
                errors.push(ConfigValidationError::Destination {
                    field,
                    reason: e.to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    // Configuration section accessors
    pub fn servicebus(&self) -> &ServicebusConfig {
        &self.servicebus
    }

    pub fn destinations(&self) -> &DestinationsConfig {
        &self.destinations
    }

    pub fn listener(&self) -> &ListenerConfig {
        &self.listener
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}

/// Receive loop tuning for the listener container
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ListenerConfig {
    max_messages: Option<u32>,
    receive_timeout_ms: Option<u64>,
    error_backoff_ms: Option<u64>,
}

impl ListenerConfig {
    pub fn max_messages(&self) -> u32 {
        self.max_messages.unwrap_or(10)
    }

    pub fn receive_timeout_ms(&self) -> u64 {
        self.receive_timeout_ms.unwrap_or(5_000)
    }

    pub fn error_backoff_ms(&self) -> u64 {
        self.error_backoff_ms.unwrap_or(1_000)
    }

    pub fn options(&self) -> ListenerOptions {
        ListenerOptions {
            max_messages: self.max_messages(),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms()),
            error_backoff: Duration::from_millis(self.error_backoff_ms()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};

    #[test]
    fn test_defaults_match_listener_defaults() {
        let config = AppConfig::default();

        assert_ok!(config.validate());
        assert_eq!(config.listener().options(), ListenerOptions::default());
        assert_eq!(config.destinations().queue(), "testqueue");
        assert_eq!(config.destinations().topic(), "mytopic");
        assert_eq!(config.destinations().subscription(), "S1");
        assert_eq!(config.servicebus().client_id(), "busline");
        assert_eq!(config.logging().level(), "info");
    }

    #[test]
    fn test_validate_collects_every_error() {
        let config = AppConfig {
            listener: ListenerConfig {
                max_messages: Some(0),
                receive_timeout_ms: Some(MAX_RECEIVE_TIMEOUT_MS + 1),
                error_backoff_ms: Some(MAX_ERROR_BACKOFF_MS + 1),
            },
            ..Default::default()
        };

        let errors = assert_err!(config.validate());

        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ConfigValidationError::MaxMessages { configured: 0, .. }));
    }
}
