/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid listener.max_messages: {configured} (min: 1, max: {limit})")]
    MaxMessages { configured: u32, limit: u32 },
    #[error("Invalid listener.receive_timeout_ms: {configured} (min: 1, max: {limit})")]
    ReceiveTimeout { configured: u64, limit: u64 },
    #[error("Invalid listener.error_backoff_ms: {configured} (limit: {limit})")]
    ErrorBackoff { configured: u64, limit: u64 },
    #[error("Invalid servicebus.client_id: must not be empty")]
    EmptyClientId,
    #[error("Invalid destinations.{field}: {reason}")]
    Destination { field: &'static str, reason: String },
}

/// Failure to produce a usable [`AppConfig`](super::AppConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Configuration loading failed: {0}. Please check your config file and environment variables."
    )]
    Load(#[from] config::ConfigError),
    #[error("Configuration validation failed: {}", join(.0))]
    Validation(Vec<ConfigValidationError>),
    #[error(
        "No Service Bus connection string configured. Set servicebus.connection_string, SERVICEBUS__CONNECTION_STRING or {}",
        super::servicebus::CONNECTION_STRING_ENV_VAR
    )]
    MissingConnectionString,
}

fn join(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
