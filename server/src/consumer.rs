use crate::destination::Destination;
use crate::errors::{ServiceBusError, ServiceBusResult};
use azservicebus::{
    ServiceBusClient, ServiceBusReceivedMessage, ServiceBusReceiver, ServiceBusReceiverOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A wrapper around a peek-lock Service Bus receiver.
#[derive(Debug)]
pub struct Consumer {
    destination: Destination,
    receiver: Arc<Mutex<Option<ServiceBusReceiver>>>,
}

impl PartialEq for Consumer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.receiver, &other.receiver)
    }
}

impl Consumer {
    pub fn new(destination: Destination, receiver: ServiceBusReceiver) -> Self {
        Self {
            destination,
            receiver: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    fn disposed(&self) -> ServiceBusError {
        ServiceBusError::Disposed(format!("Receiver for {}", self.destination))
    }

    /// Receives up to `max_count` messages, returning an empty batch when
    /// nothing arrives within `timeout`.
    /// The SDK bounds the wait; the receive itself is never cancelled.
    pub async fn receive_messages_with_timeout(
        &self,
        max_count: u32,
        timeout: Duration,
    ) -> ServiceBusResult<Vec<ServiceBusReceivedMessage>> {
        let mut guard = self.receiver.lock().await;
        let Some(receiver) = guard.as_mut() else {
            return Err(self.disposed());
        };

        let messages = receiver
            .receive_messages_with_max_wait_time(max_count, Some(timeout))
            .await
            .map_err(|e| {
                ServiceBusError::MessageReceiveFailed(format!(
                    "Failed to receive from {}: {e}",
                    self.destination
                ))
            })?;
        if messages.is_empty() {
            log::trace!("No messages on {} within {timeout:?}", self.destination);
        }
        Ok(messages)
    }

    pub async fn complete_message(
        &self,
        message: &ServiceBusReceivedMessage,
    ) -> ServiceBusResult<()> {
        let mut guard = self.receiver.lock().await;
        let Some(receiver) = guard.as_mut() else {
            return Err(self.disposed());
        };

        receiver.complete_message(message).await.map_err(|e| {
            ServiceBusError::MessageCompleteFailed(format!(
                "Failed to complete message {} on {}: {e}",
                message.sequence_number(),
                self.destination
            ))
        })
    }

    /// Releases the lock so the broker can redeliver the message.
    pub async fn abandon_message(
        &self,
        message: &ServiceBusReceivedMessage,
    ) -> ServiceBusResult<()> {
        let mut guard = self.receiver.lock().await;
        let Some(receiver) = guard.as_mut() else {
            return Err(self.disposed());
        };

        receiver.abandon_message(message, None).await.map_err(|e| {
            ServiceBusError::MessageAbandonFailed(format!(
                "Failed to abandon message {} on {}: {e}",
                message.sequence_number(),
                self.destination
            ))
        })
    }

    pub async fn dispose(&self) -> ServiceBusResult<()> {
        let mut guard = self.receiver.lock().await;
        if let Some(receiver) = guard.take() {
            receiver.dispose().await.map_err(|e| {
                ServiceBusError::ConnectionFailed(format!(
                    "Failed to dispose receiver for {}: {e}",
                    self.destination
                ))
            })?;
        }
        Ok(())
    }
}

pub trait ServiceBusClientExt {
    fn create_consumer(
        &mut self,
        destination: &Destination,
        options: ServiceBusReceiverOptions,
    ) -> impl Future<Output = ServiceBusResult<Consumer>> + Send;
}

impl<RP> ServiceBusClientExt for ServiceBusClient<RP>
where
    RP: azservicebus::ServiceBusRetryPolicy
        + From<azservicebus::ServiceBusRetryOptions>
        + Send
        + Sync
        + 'static,
{
    async fn create_consumer(
        &mut self,
        destination: &Destination,
        options: ServiceBusReceiverOptions,
    ) -> ServiceBusResult<Consumer> {
        let creation_failed = |e: String| {
            ServiceBusError::ConsumerCreationFailed(format!(
                "Failed to create receiver for {destination}: {e}"
            ))
        };

        let receiver = match destination {
            Destination::Queue(queue) => self
                .create_receiver_for_queue(queue.clone(), options)
                .await
                .map_err(|e| creation_failed(e.to_string()))?,
            Destination::Subscription {
                topic,
                subscription,
            } => self
                .create_receiver_for_subscription(topic.clone(), subscription.clone(), options)
                .await
                .map_err(|e| creation_failed(e.to_string()))?,
        };

        Ok(Consumer::new(destination.clone(), receiver))
    }
}
