use super::{InboundMessage, MessageSource, Settlement, SourceFactory};
use crate::connection::{CachingConnectionFactory, Connector};
use crate::consumer::{Consumer, ServiceBusClientExt};
use crate::destination::Destination;
use crate::errors::ServiceBusResult;
use async_trait::async_trait;
use azservicebus::{
    ServiceBusClient, ServiceBusReceivedMessage, ServiceBusReceiverOptions,
    core::BasicRetryPolicy,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Opens peek-lock receivers on the cached Service Bus connection.
pub struct ServiceBusSourceFactory<C>
where
    C: Connector<Connection = ServiceBusClient<BasicRetryPolicy>>,
{
    connections: Arc<CachingConnectionFactory<C>>,
}

impl<C> ServiceBusSourceFactory<C>
where
    C: Connector<Connection = ServiceBusClient<BasicRetryPolicy>>,
{
    pub fn new(connections: Arc<CachingConnectionFactory<C>>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl<C> SourceFactory for ServiceBusSourceFactory<C>
where
    C: Connector<Connection = ServiceBusClient<BasicRetryPolicy>>,
{
    type Source = ServiceBusSource;

    async fn open(&self, destination: &Destination) -> ServiceBusResult<ServiceBusSource> {
        let client = self.connections.connection().await?;
        let consumer = client
            .lock()
            .await
            .create_consumer(destination, ServiceBusReceiverOptions::default())
            .await?;
        log::debug!("Opened receiver on {destination}");
        Ok(ServiceBusSource::new(consumer))
    }
}

/// [`MessageSource`] over a [`Consumer`].
///
/// Received SDK messages stay in `locked` until settled, keyed by sequence
/// number, because settlement needs the original lock token.
pub struct ServiceBusSource {
    consumer: Consumer,
    locked: HashMap<i64, ServiceBusReceivedMessage>,
}

impl ServiceBusSource {
    pub fn new(consumer: Consumer) -> Self {
        Self {
            consumer,
            locked: HashMap::new(),
        }
    }

    fn take_locked(
        &mut self,
        message: &InboundMessage,
        settlement: Settlement,
    ) -> ServiceBusResult<ServiceBusReceivedMessage> {
        self.locked
            .remove(&message.sequence_number)
            .ok_or_else(|| settlement.not_locked(message, self.consumer.destination()))
    }
}

fn to_inbound(message: &ServiceBusReceivedMessage) -> InboundMessage {
    let body = match message.body() {
        Ok(body) => body.to_vec(),
        Err(e) => {
            log::warn!(
                "Message {} has no data body: {e}",
                message.sequence_number()
            );
            Vec::new()
        }
    };

    InboundMessage {
        sequence_number: message.sequence_number(),
        message_id: message.message_id().map(|id| id.to_string()),
        delivery_count: message.delivery_count(),
        body,
    }
}

#[async_trait]
impl MessageSource for ServiceBusSource {
    async fn receive(
        &mut self,
        max_messages: u32,
        timeout: Duration,
    ) -> ServiceBusResult<Vec<InboundMessage>> {
        let received = self
            .consumer
            .receive_messages_with_timeout(max_messages, timeout)
            .await?;

        let mut batch = Vec::with_capacity(received.len());
        for message in received {
            let inbound = to_inbound(&message);
            self.locked.insert(inbound.sequence_number, message);
            batch.push(inbound);
        }
        Ok(batch)
    }

    async fn complete(&mut self, message: &InboundMessage) -> ServiceBusResult<()> {
        let locked = self.take_locked(message, Settlement::Complete)?;
        self.consumer.complete_message(&locked).await
    }

    async fn abandon(&mut self, message: &InboundMessage) -> ServiceBusResult<()> {
        let locked = self.take_locked(message, Settlement::Abandon)?;
        self.consumer.abandon_message(&locked).await
    }

    async fn close(&mut self) -> ServiceBusResult<()> {
        for (_, message) in self.locked.drain() {
            if let Err(e) = self.consumer.abandon_message(&message).await {
                log::warn!("{e}");
            }
        }
        self.consumer.dispose().await
    }
}
