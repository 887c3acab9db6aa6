//! Listener container: explicit handler registration and receive loops.
//!
//! Handlers are registered per [`Destination`] with
//! [`ListenerContainer::subscribe`] before [`ListenerContainer::start`].
//! Each registration gets its own receive loop; messages of one registration
//! are handled one at a time. A message is completed when its handler
//! succeeds and abandoned (so the broker redelivers it) when decoding or the
//! handler fails.

pub mod azure;
mod container;

pub use azure::{ServiceBusSource, ServiceBusSourceFactory};
pub use container::{
    ListenerContainer, ListenerHandle, ListenerOptions, ListenerReport, ListenerStats,
};

use crate::destination::Destination;
use crate::errors::{ServiceBusError, ServiceBusResult};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;

/// A message delivered under a peek-lock, waiting to be settled.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sequence_number: i64,
    pub message_id: Option<String>,
    pub delivery_count: Option<u32>,
    pub body: Vec<u8>,
}

/// How a locked message is released back to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    Complete,
    Abandon,
}

impl Settlement {
    /// Error for settling a message this receiver does not hold a lock on.
    pub(crate) fn not_locked(
        self,
        message: &InboundMessage,
        destination: &Destination,
    ) -> ServiceBusError {
        let reason = format!(
            "Message {} on {destination} is not locked by this receiver",
            message.sequence_number
        );
        match self {
            Settlement::Complete => ServiceBusError::MessageCompleteFailed(reason),
            Settlement::Abandon => ServiceBusError::MessageAbandonFailed(reason),
        }
    }
}

/// Receiving side of one destination.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Returns up to `max_messages`, or an empty batch after `timeout`.
    async fn receive(
        &mut self,
        max_messages: u32,
        timeout: Duration,
    ) -> ServiceBusResult<Vec<InboundMessage>>;

    async fn complete(&mut self, message: &InboundMessage) -> ServiceBusResult<()>;

    async fn abandon(&mut self, message: &InboundMessage) -> ServiceBusResult<()>;

    async fn close(&mut self) -> ServiceBusResult<()>;
}

/// Opens a [`MessageSource`] per destination.
#[async_trait]
pub trait SourceFactory: Send + Sync + 'static {
    type Source: MessageSource;

    async fn open(&self, destination: &Destination) -> ServiceBusResult<Self::Source>;
}

/// Failure reported by a message handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(reason: impl std::fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

/// Callback invoked once per decoded message.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync + 'static {
    async fn on_message(&self, message: T) -> Result<(), HandlerError>;
}

#[async_trait]
impl<T, F> MessageHandler<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn on_message(&self, message: T) -> Result<(), HandlerError> {
        self(message)
    }
}

/// Type-erased decode + handle step for one registration.
#[async_trait]
pub(crate) trait Dispatch: Send + Sync + 'static {
    fn record_type(&self) -> &'static str;

    async fn dispatch(
        &self,
        destination: &Destination,
        body: &[u8],
    ) -> Result<(), DispatchError>;
}

#[derive(Debug, Error)]
pub(crate) enum DispatchError {
    #[error("cannot decode message: {0}")]
    Decode(ServiceBusError),
    #[error("handler failed: {0}")]
    Handler(HandlerError),
}

pub(crate) struct TypedDispatcher<T, H> {
    handler: H,
    _record: PhantomData<fn() -> T>,
}

impl<T, H> TypedDispatcher<T, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T, H> Dispatch for TypedDispatcher<T, H>
where
    T: crate::model::Payload,
    H: MessageHandler<T>,
{
    fn record_type(&self) -> &'static str {
        T::TYPE_ID
    }

    async fn dispatch(
        &self,
        destination: &Destination,
        body: &[u8],
    ) -> Result<(), DispatchError> {
        let record: T =
            crate::codec::MessageConverter::from_message(body).map_err(DispatchError::Decode)?;
        log::info!("Receiving message from {destination}: {record}");
        self.handler
            .on_message(record)
            .await
            .map_err(DispatchError::Handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_locked_error_matches_settlement() {
        let queue = Destination::queue("testqueue");
        let message = InboundMessage {
            sequence_number: 7,
            message_id: None,
            delivery_count: Some(1),
            body: Vec::new(),
        };

        let completed = Settlement::Complete.not_locked(&message, &queue);
        let abandoned = Settlement::Abandon.not_locked(&message, &queue);

        assert!(matches!(completed, ServiceBusError::MessageCompleteFailed(_)));
        assert!(matches!(
            &abandoned,
            ServiceBusError::MessageAbandonFailed(reason) if reason.contains("Message 7")
        ));
    }
}
