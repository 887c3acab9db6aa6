use crate::codec::OutboundMessage;
use crate::errors::{ServiceBusError, ServiceBusResult};
use azservicebus::{ServiceBusClient, ServiceBusMessage, ServiceBusSender, ServiceBusSenderOptions};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A wrapper around an Azure Service Bus sender bound to one queue or topic.
///
/// The underlying sender sits behind a mutex so a producer can be shared
/// across tasks; after [`dispose`](Self::dispose) every operation fails with
/// [`ServiceBusError::Disposed`].
///
/// # Examples
///
/// ```no_run
/// use server::codec::MessageConverter;
/// use server::model::Email;
/// use server::producer::Producer;
/// use azservicebus::ServiceBusSender;
///
/// async fn example(sender: ServiceBusSender) -> Result<(), server::errors::ServiceBusError> {
///     let producer = Producer::new("testqueue", sender);
///     let encoded = MessageConverter::to_message(&Email::new("info@example.com", "Hello"))?;
///     producer.send_message(Producer::create_message(&encoded)?).await?;
///     producer.dispose().await
/// }
/// ```
#[derive(Debug)]
pub struct Producer {
    destination: String,
    sender: Arc<Mutex<Option<ServiceBusSender>>>,
}

impl PartialEq for Producer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sender, &other.sender)
    }
}

impl Producer {
    pub fn new(destination: impl Into<String>, sender: ServiceBusSender) -> Self {
        Self {
            destination: destination.into(),
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Sends a single message and waits for the broker to accept it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceBusError::MessageSendFailed`] if the broker rejects the
    /// message, or [`ServiceBusError::Disposed`] after disposal.
    pub async fn send_message(&self, message: ServiceBusMessage) -> ServiceBusResult<()> {
        let mut guard = self.sender.lock().await;
        let Some(sender) = guard.as_mut() else {
            return Err(ServiceBusError::Disposed(format!(
                "Sender for '{}'",
                self.destination
            )));
        };

        sender.send_message(message).await.map_err(|e| {
            ServiceBusError::MessageSendFailed(format!(
                "Failed to send message to {}: {e}",
                self.destination
            ))
        })
    }

    /// Builds the SDK message for an encoded record, keeping its message id.
    pub fn create_message(message: &OutboundMessage) -> ServiceBusResult<ServiceBusMessage> {
        let mut sb_message = ServiceBusMessage::new(message.body.clone());
        sb_message
            .set_message_id(&message.message_id)
            .map_err(|e| ServiceBusError::SerializationFailed(format!("Invalid message id: {e}")))?;
        Ok(sb_message)
    }

    /// Disposes the underlying sender. Disposing twice is a no-op.
    pub async fn dispose(&self) -> ServiceBusResult<()> {
        let mut guard = self.sender.lock().await;
        if let Some(sender) = guard.take() {
            sender.dispose().await.map_err(|e| {
                ServiceBusError::ConnectionFailed(format!(
                    "Failed to dispose sender for {}: {e}",
                    self.destination
                ))
            })?;
        }
        Ok(())
    }
}

/// Extension trait for ServiceBusClient to create Producer instances.
///
/// Queues and topics share one entity namespace for senders, so the same call
/// serves both.
pub trait ServiceBusClientProducerExt {
    fn create_producer(
        &mut self,
        destination: &str,
        options: ServiceBusSenderOptions,
    ) -> impl std::future::Future<Output = ServiceBusResult<Producer>> + Send;
}

impl<RP> ServiceBusClientProducerExt for ServiceBusClient<RP>
where
    RP: azservicebus::ServiceBusRetryPolicy
        + From<azservicebus::ServiceBusRetryOptions>
        + Send
        + Sync
        + 'static,
{
    async fn create_producer(
        &mut self,
        destination: &str,
        options: ServiceBusSenderOptions,
    ) -> ServiceBusResult<Producer> {
        let sender = self
            .create_sender(destination.to_string(), options)
            .await
            .map_err(|e| {
                ServiceBusError::ProducerCreationFailed(format!(
                    "Failed to create sender for {destination}: {e}"
                ))
            })?;

        Ok(Producer::new(destination, sender))
    }
}
