use super::factory::{ConnectionFactory, TransportSettings};
use crate::errors::{ServiceBusError, ServiceBusResult};
use async_trait::async_trait;
use azservicebus::{ServiceBusClient, ServiceBusClientOptions, core::BasicRetryPolicy};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Shared handle to one physical connection.
pub type SharedConnection<T> = Arc<Mutex<T>>;

/// Opens and closes physical connections from [`TransportSettings`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self, settings: &TransportSettings) -> ServiceBusResult<Self::Connection>;

    async fn close(&self, connection: Self::Connection) -> ServiceBusResult<()>;
}

/// Connects to Azure Service Bus with the SDK's default client options.
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureConnector;

#[async_trait]
impl Connector for AzureConnector {
    type Connection = ServiceBusClient<BasicRetryPolicy>;

    async fn connect(&self, settings: &TransportSettings) -> ServiceBusResult<Self::Connection> {
        log::info!(
            "Connecting to {} as client '{}'",
            settings.remote_uri,
            settings.client_id
        );
        ServiceBusClient::new_from_connection_string(
            settings.connection_string(),
            ServiceBusClientOptions::default(),
        )
        .await
        .map_err(|e| {
            ServiceBusError::ConnectionFailed(format!(
                "Failed to connect to {}: {e}",
                settings.host()
            ))
        })
    }

    async fn close(&self, connection: Self::Connection) -> ServiceBusResult<()> {
        connection
            .dispose()
            .await
            .map_err(|e| ServiceBusError::ConnectionFailed(format!("Failed to close client: {e}")))
    }
}

/// Hands out one lazily opened connection and reuses it for every caller.
///
/// The first call to [`connection`](Self::connection) connects; concurrent
/// first callers wait on the same lock, so exactly one physical connection is
/// opened until [`reset`](Self::reset) or [`dispose`](Self::dispose).
pub struct CachingConnectionFactory<C: Connector> {
    factory: ConnectionFactory,
    connector: C,
    cached: Mutex<Option<SharedConnection<C::Connection>>>,
    connects: AtomicUsize,
}

impl<C: Connector> CachingConnectionFactory<C> {
    pub fn new(factory: ConnectionFactory, connector: C) -> Self {
        Self {
            factory,
            connector,
            cached: Mutex::new(None),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> &TransportSettings {
        self.factory.settings()
    }

    pub async fn connection(&self) -> ServiceBusResult<SharedConnection<C::Connection>> {
        let mut cached = self.cached.lock().await;
        if let Some(connection) = cached.as_ref() {
            return Ok(Arc::clone(connection));
        }

        let connection = self.connector.connect(self.factory.settings()).await?;
        let count = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Opened connection #{count} to {}", self.factory.remote_uri());

        let shared = Arc::new(Mutex::new(connection));
        *cached = Some(Arc::clone(&shared));
        Ok(shared)
    }

    pub async fn is_connected(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    /// Number of physical connections opened so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Forget the cached connection so the next caller reconnects.
    pub async fn reset(&self) {
        if self.cached.lock().await.take().is_some() {
            log::info!("Reset cached connection to {}", self.factory.remote_uri());
        }
    }

    pub async fn dispose(&self) -> ServiceBusResult<()> {
        let Some(shared) = self.cached.lock().await.take() else {
            return Ok(());
        };

        match Arc::try_unwrap(shared) {
            Ok(connection) => self.connector.close(connection.into_inner()).await,
            Err(_) => {
                log::warn!(
                    "Connection to {} is still in use, dropping cached handle only",
                    self.factory.remote_uri()
                );
                Ok(())
            }
        }
    }
}
