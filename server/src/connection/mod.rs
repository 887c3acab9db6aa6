//! Connection string parsing, transport settings and connection caching.

pub mod caching;
pub mod connection_string;
pub mod factory;
pub mod sas;
pub mod secret;

pub use caching::{AzureConnector, CachingConnectionFactory, Connector, SharedConnection};
pub use connection_string::{ConnectionStringError, ServiceBusConnectionString};
pub use factory::{ConnectionFactory, TransportSettings, UriOptions, remote_uri};
pub use sas::SasTokenGenerator;
pub use secret::Secret;

/// Caching factory over the Azure Service Bus SDK client.
pub type ServiceBusConnectionFactory = CachingConnectionFactory<AzureConnector>;
