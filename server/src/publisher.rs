//! Publishing records to a queue or topic.
//!
//! [`MessageTemplate`] encodes records with [`MessageConverter`] and hands them
//! to a [`MessageSink`]. Sends are awaited one at a time; the first failure
//! ends a multi-record send and nothing after it is attempted.

use crate::codec::{MessageConverter, OutboundMessage};
use crate::connection::{CachingConnectionFactory, Connector};
use crate::destination::validate_name;
use crate::errors::{ServiceBusError, ServiceBusResult};
use crate::model::Payload;
use crate::producer::{Producer, ServiceBusClientProducerExt};
use async_trait::async_trait;
use azservicebus::{ServiceBusClient, ServiceBusSenderOptions, core::BasicRetryPolicy};
use std::collections::HashMap;
use std::sync::Arc;

/// Transport that delivers encoded messages to a named destination.
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, destination: &str, message: OutboundMessage) -> ServiceBusResult<()>;

    async fn close(&mut self) -> ServiceBusResult<()>;
}

/// [`MessageSink`] backed by Service Bus senders, one per destination.
pub struct ServiceBusSink<C>
where
    C: Connector<Connection = ServiceBusClient<BasicRetryPolicy>>,
{
    connections: Arc<CachingConnectionFactory<C>>,
    producers: HashMap<String, Producer>,
}

impl<C> ServiceBusSink<C>
where
    C: Connector<Connection = ServiceBusClient<BasicRetryPolicy>>,
{
    pub fn new(connections: Arc<CachingConnectionFactory<C>>) -> Self {
        Self {
            connections,
            producers: HashMap::new(),
        }
    }

    async fn get_or_create_producer(&mut self, destination: &str) -> ServiceBusResult<&Producer> {
        if !self.producers.contains_key(destination) {
            log::debug!("Creating producer for {destination}");
            let client = self.connections.connection().await?;
            let producer = client
                .lock()
                .await
                .create_producer(destination, ServiceBusSenderOptions::default())
                .await?;
            self.producers.insert(destination.to_string(), producer);
        }

        self.producers
            .get(destination)
            .ok_or_else(|| ServiceBusError::ProducerCreationFailed(destination.to_string()))
    }
}

#[async_trait]
impl<C> MessageSink for ServiceBusSink<C>
where
    C: Connector<Connection = ServiceBusClient<BasicRetryPolicy>>,
{
    async fn send(&mut self, destination: &str, message: OutboundMessage) -> ServiceBusResult<()> {
        let sb_message = Producer::create_message(&message)?;
        let producer = self.get_or_create_producer(destination).await?;
        producer.send_message(sb_message).await
    }

    async fn close(&mut self) -> ServiceBusResult<()> {
        for (destination, producer) in self.producers.drain() {
            if let Err(e) = producer.dispose().await {
                log::warn!("Failed to dispose producer for {destination}: {e}");
            }
        }
        Ok(())
    }
}

/// Encodes records and sends them through a [`MessageSink`].
///
/// # Examples
///
/// ```no_run
/// use server::model::Employee;
/// use server::publisher::{MessageSink, MessageTemplate};
///
/// async fn publish<S: MessageSink>(sink: S) -> Result<(), server::errors::ServiceBusError> {
///     let mut template = MessageTemplate::new(sink);
///     template
///         .convert_and_send("mytopic", &Employee::new("exampleName", "10001"))
///         .await
/// }
/// ```
pub struct MessageTemplate<S: MessageSink> {
    sink: S,
}

impl<S: MessageSink> MessageTemplate<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn convert_and_send<T: Payload>(
        &mut self,
        destination: &str,
        record: &T,
    ) -> ServiceBusResult<()> {
        validate_name(destination)?;
        let message = MessageConverter::to_message(record)?;
        let message_id = message.message_id.clone();

        self.sink.send(destination, message).await?;

        log::info!("Sent {} to {destination} (message id: {message_id})", T::TYPE_ID);
        Ok(())
    }

    /// Sends each record in order and returns how many were sent.
    ///
    /// # Errors
    ///
    /// The first failing send aborts the loop and is returned as
    /// [`ServiceBusError::MessageSendFailed`] noting how many records went out
    /// before it.
    pub async fn send_all<T: Payload>(
        &mut self,
        destination: &str,
        records: &[T],
    ) -> ServiceBusResult<usize> {
        validate_name(destination)?;

        for (index, record) in records.iter().enumerate() {
            if let Err(e) = self.convert_and_send(destination, record).await {
                log::error!(
                    "Aborting send to {destination} after {index} of {} records: {e}",
                    records.len()
                );
                return Err(match e {
                    ServiceBusError::MessageSendFailed(reason) => {
                        ServiceBusError::MessageSendFailed(format!(
                            "record {} of {}: {reason}",
                            index + 1,
                            records.len()
                        ))
                    }
                    other => other,
                });
            }
        }

        Ok(records.len())
    }

    pub async fn close(mut self) -> ServiceBusResult<()> {
        self.sink.close().await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;
    use crate::model::{Email, Employee};
    use claims::{assert_err, assert_ok};

    fn employees() -> Vec<Employee> {
        vec![
            Employee::new("exampleName", "10001"),
            Employee::new("secondName", "10002"),
            Employee::new("thirdName", "10003"),
        ]
    }

    #[tokio::test]
    async fn test_send_all_publishes_each_record_once() {
        let mut template = MessageTemplate::new(RecordingSink::default());
        let records = employees();

        let sent = assert_ok!(template.send_all("mailbox", &records).await);

        assert_eq!(sent, records.len());
        assert_eq!(template.sink().sent.len(), records.len());
        for ((destination, message), record) in template.sink().sent.iter().zip(&records) {
            assert_eq!(destination, "mailbox");
            let decoded: Employee = assert_ok!(MessageConverter::from_message(&message.body));
            assert_eq!(&decoded, record);
        }
    }

    #[tokio::test]
    async fn test_send_failure_aborts_remaining_records() {
        let mut template = MessageTemplate::new(RecordingSink {
            fail_on_send: Some(1),
            ..Default::default()
        });

        let err = assert_err!(template.send_all("mailbox", &employees()).await);

        assert!(
            matches!(err, ServiceBusError::MessageSendFailed(ref m) if m.starts_with("record 2 of 3"))
        );
        assert_eq!(template.sink().sent.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_destination_without_sending() {
        let mut template = MessageTemplate::new(RecordingSink::default());

        let err = assert_err!(
            template
                .convert_and_send("", &Email::new("info@example.com", "Hello"))
                .await
        );

        assert!(matches!(err, ServiceBusError::InvalidDestination(_)));
        assert!(template.sink().sent.is_empty());
    }

    #[tokio::test]
    async fn test_close_closes_sink() {
        let template = MessageTemplate::new(RecordingSink::default());
        assert_ok!(template.close().await);
    }
}
