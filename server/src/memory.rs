//! In-process broker with queue and topic/subscription semantics.
//!
//! Useful for running the publisher and listeners without a Service Bus
//! namespace. Mirrors the broker behaviour the listener relies on: peek-lock
//! delivery, redelivery after abandon with an increasing delivery count, and
//! dead-lettering once [`MAX_DELIVERY_COUNT`] deliveries were abandoned.

use crate::codec::OutboundMessage;
use crate::destination::Destination;
use crate::errors::{ServiceBusError, ServiceBusResult};
use crate::listener::{InboundMessage, MessageSource, Settlement, SourceFactory};
use crate::publisher::MessageSink;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Service Bus default for `MaxDeliveryCount`.
pub const MAX_DELIVERY_COUNT: u32 = 10;

#[derive(Default)]
struct Entity {
    ready: VecDeque<InboundMessage>,
    /// Locked messages keyed by sequence number, with the id of the
    /// receiver holding the lock
    locked: HashMap<i64, (u64, InboundMessage)>,
    dead_lettered: Vec<InboundMessage>,
    completed: usize,
}

#[derive(Default)]
struct BrokerState {
    next_sequence: i64,
    next_receiver: u64,
    topics: HashMap<String, BTreeSet<String>>,
    entities: HashMap<Destination, Entity>,
}

impl BrokerState {
    fn enqueue(&mut self, destination: Destination, message: &OutboundMessage) {
        self.next_sequence += 1;
        let inbound = InboundMessage {
            sequence_number: self.next_sequence,
            message_id: Some(message.message_id.clone()),
            delivery_count: Some(0),
            body: message.body.clone(),
        };
        self.entities
            .entry(destination)
            .or_default()
            .ready
            .push_back(inbound);
    }
}

/// Shared handle to one in-memory broker; clones see the same state.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declares `topic`; sends to it fan out to its subscriptions.
    pub fn create_topic(&self, topic: &str) {
        self.state().topics.entry(topic.to_string()).or_default();
    }

    /// Declares a durable subscription, creating the topic if needed.
    pub fn create_subscription(&self, topic: &str, subscription: &str) {
        let mut state = self.state();
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(subscription.to_string());
        state
            .entities
            .entry(Destination::subscription(topic, subscription))
            .or_default();
    }

    /// Messages waiting for delivery (not counting locked ones).
    pub fn ready_count(&self, destination: &Destination) -> usize {
        self.state()
            .entities
            .get(destination)
            .map_or(0, |entity| entity.ready.len())
    }

    pub fn completed_count(&self, destination: &Destination) -> usize {
        self.state()
            .entities
            .get(destination)
            .map_or(0, |entity| entity.completed)
    }

    pub fn dead_lettered(&self, destination: &Destination) -> Vec<InboundMessage> {
        self.state()
            .entities
            .get(destination)
            .map(|entity| entity.dead_lettered.clone())
            .unwrap_or_default()
    }

    pub fn publish(&self, destination: &str, message: &OutboundMessage) -> ServiceBusResult<()> {
        crate::destination::validate_name(destination)?;
        {
            let mut state = self.state();
            match state.topics.get(destination).cloned() {
                Some(subscriptions) => {
                    if subscriptions.is_empty() {
                        log::debug!("Topic {destination} has no subscriptions, message dropped");
                    }
                    for subscription in subscriptions {
                        let target = Destination::subscription(destination, subscription);
                        state.enqueue(target, message);
                    }
                }
                None => state.enqueue(Destination::queue(destination), message),
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn try_take(
        &self,
        receiver: u64,
        destination: &Destination,
        max_messages: u32,
    ) -> Vec<InboundMessage> {
        let mut state = self.state();
        let Some(entity) = state.entities.get_mut(destination) else {
            return Vec::new();
        };

        let count = entity.ready.len().min(max_messages as usize);
        let mut batch = Vec::with_capacity(count);
        for mut message in entity.ready.drain(..count) {
            message.delivery_count = Some(message.delivery_count.unwrap_or_default() + 1);
            entity
                .locked
                .insert(message.sequence_number, (receiver, message.clone()));
            batch.push(message);
        }
        batch
    }

    fn settle(
        &self,
        receiver: u64,
        destination: &Destination,
        message: &InboundMessage,
        settlement: Settlement,
    ) -> ServiceBusResult<()> {
        let mut state = self.state();
        let entity = state.entities.entry(destination.clone()).or_default();
        let held = entity
            .locked
            .get(&message.sequence_number)
            .is_some_and(|(owner, _)| *owner == receiver);
        let locked = if held {
            entity.locked.remove(&message.sequence_number)
        } else {
            None
        };
        let Some((_, locked)) = locked else {
            return Err(settlement.not_locked(message, destination));
        };

        if settlement == Settlement::Complete {
            entity.completed += 1;
        } else if locked.delivery_count.unwrap_or_default() >= MAX_DELIVERY_COUNT {
            log::warn!(
                "Message {} on {destination} exceeded {MAX_DELIVERY_COUNT} deliveries, dead-lettering",
                locked.sequence_number
            );
            entity.dead_lettered.push(locked);
        } else {
            entity.ready.push_front(locked);
            drop(state);
            self.notify.notify_waiters();
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSink for MemoryBroker {
    async fn send(&mut self, destination: &str, message: OutboundMessage) -> ServiceBusResult<()> {
        self.publish(destination, &message)
    }

    async fn close(&mut self) -> ServiceBusResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SourceFactory for MemoryBroker {
    type Source = MemorySource;

    async fn open(&self, destination: &Destination) -> ServiceBusResult<MemorySource> {
        match destination {
            Destination::Queue(name) => {
                self.state()
                    .entities
                    .entry(Destination::queue(name.as_str()))
                    .or_default();
            }
            Destination::Subscription {
                topic,
                subscription,
            } => self.create_subscription(topic, subscription),
        }

        let id = {
            let mut state = self.state();
            state.next_receiver += 1;
            state.next_receiver
        };

        Ok(MemorySource {
            id,
            broker: self.clone(),
            destination: destination.clone(),
            closed: false,
        })
    }
}

/// Receiver on one [`MemoryBroker`] entity.
pub struct MemorySource {
    id: u64,
    broker: MemoryBroker,
    destination: Destination,
    closed: bool,
}

impl MemorySource {
    fn ensure_open(&self) -> ServiceBusResult<()> {
        if self.closed {
            return Err(ServiceBusError::Disposed(format!(
                "Receiver for {}",
                self.destination
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn receive(
        &mut self,
        max_messages: u32,
        timeout: Duration,
    ) -> ServiceBusResult<Vec<InboundMessage>> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.broker.try_take(self.id, &self.destination, max_messages);
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn complete(&mut self, message: &InboundMessage) -> ServiceBusResult<()> {
        self.ensure_open()?;
        self.broker.settle(self.id, &self.destination, message, Settlement::Complete)
    }

    async fn abandon(&mut self, message: &InboundMessage) -> ServiceBusResult<()> {
        self.ensure_open()?;
        self.broker.settle(self.id, &self.destination, message, Settlement::Abandon)
    }

    async fn close(&mut self) -> ServiceBusResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut state = self.broker.state();
        if let Some(entity) = state.entities.get_mut(&self.destination) {
            let owned: Vec<i64> = entity
                .locked
                .iter()
                .filter(|(_, (owner, _))| *owner == self.id)
                .map(|(sequence, _)| *sequence)
                .collect();
            let mut released: Vec<_> = owned
                .iter()
                .filter_map(|sequence| entity.locked.remove(sequence))
                .map(|(_, message)| message)
                .collect();
            released.sort_by_key(|message| std::cmp::Reverse(message.sequence_number));
            for message in released {
                entity.ready.push_front(message);
            }
        }
        drop(state);
        self.broker.notify.notify_waiters();
        Ok(())
    }
}
