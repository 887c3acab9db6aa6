use crate::connection::ConnectionStringError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceBusError {
    /// The connection string could not be parsed
    ConnectionString(ConnectionStringError),

    /// Connection related errors
    ConnectionFailed(String),

    /// Producer related errors
    ProducerCreationFailed(String),

    /// Consumer related errors
    ConsumerCreationFailed(String),

    /// Message operation errors
    MessageSendFailed(String),
    MessageReceiveFailed(String),
    MessageCompleteFailed(String),
    MessageAbandonFailed(String),

    /// Payload conversion errors
    SerializationFailed(String),
    DeserializationFailed(String),
    TypeMismatch { expected: String, actual: String },

    /// Destination errors
    InvalidDestination(String),

    /// Configuration errors
    ConfigurationError(String),

    /// The sender, receiver or connection was already disposed
    Disposed(String),
}

impl fmt::Display for ServiceBusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceBusError::ConnectionString(err) => {
                write!(f, "Invalid connection string: {err}")
            }
            ServiceBusError::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),

            ServiceBusError::ProducerCreationFailed(msg) => {
                write!(f, "Producer creation failed: {msg}")
            }
            ServiceBusError::ConsumerCreationFailed(msg) => {
                write!(f, "Consumer creation failed: {msg}")
            }

            ServiceBusError::MessageSendFailed(msg) => write!(f, "Message send failed: {msg}"),
            ServiceBusError::MessageReceiveFailed(msg) => {
                write!(f, "Message receive failed: {msg}")
            }
            ServiceBusError::MessageCompleteFailed(msg) => {
                write!(f, "Message complete failed: {msg}")
            }
            ServiceBusError::MessageAbandonFailed(msg) => {
                write!(f, "Message abandon failed: {msg}")
            }

            ServiceBusError::SerializationFailed(msg) => {
                write!(f, "Message serialization failed: {msg}")
            }
            ServiceBusError::DeserializationFailed(msg) => {
                write!(f, "Message deserialization failed: {msg}")
            }
            ServiceBusError::TypeMismatch { expected, actual } => {
                write!(
                    f,
                    "Message type mismatch: expected {expected}, received {actual}"
                )
            }

            ServiceBusError::InvalidDestination(name) => {
                write!(f, "Invalid destination name: '{name}'")
            }
            ServiceBusError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            ServiceBusError::Disposed(what) => write!(f, "{what} already disposed"),
        }
    }
}

impl std::error::Error for ServiceBusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceBusError::ConnectionString(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConnectionStringError> for ServiceBusError {
    fn from(err: ConnectionStringError) -> Self {
        ServiceBusError::ConnectionString(err)
    }
}

// Result type alias for convenience
pub type ServiceBusResult<T> = Result<T, ServiceBusError>;
