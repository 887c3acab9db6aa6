use crate::errors::{ServiceBusError, ServiceBusResult};
use std::fmt;

/// Where messages are sent to or received from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Point-to-point queue
    Queue(String),
    /// Durable subscription on a topic
    Subscription { topic: String, subscription: String },
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Destination::Queue(name.into())
    }

    pub fn subscription(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Destination::Subscription {
            topic: topic.into(),
            subscription: subscription.into(),
        }
    }

    /// Entity a sender publishes to: the queue or the topic.
    pub fn entity(&self) -> &str {
        match self {
            Destination::Queue(name) => name,
            Destination::Subscription { topic, .. } => topic,
        }
    }

    pub fn validate(&self) -> ServiceBusResult<()> {
        match self {
            Destination::Queue(name) => validate_name(name),
            Destination::Subscription {
                topic,
                subscription,
            } => {
                validate_name(topic)?;
                validate_name(subscription)
            }
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Queue(name) => write!(f, "queue:{name}"),
            Destination::Subscription {
                topic,
                subscription,
            } => write!(f, "{topic}/subscriptions/{subscription}"),
        }
    }
}

/// Rejects empty or whitespace-padded entity names.
pub fn validate_name(name: &str) -> ServiceBusResult<()> {
    if name.trim().is_empty() || name.trim() != name {
        return Err(ServiceBusError::InvalidDestination(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};

    #[test]
    fn test_display_and_entity() {
        let queue = Destination::queue("testqueue");
        assert_eq!(queue.to_string(), "queue:testqueue");
        assert_eq!(queue.entity(), "testqueue");

        let subscription = Destination::subscription("mytopic", "S1");
        assert_eq!(subscription.to_string(), "mytopic/subscriptions/S1");
        assert_eq!(subscription.entity(), "mytopic");
    }

    #[test]
    fn test_validation() {
        assert_ok!(Destination::queue("testqueue").validate());
        assert_err!(Destination::queue("").validate());
        assert_err!(Destination::queue(" padded ").validate());
        assert_err!(Destination::subscription("mytopic", "").validate());
    }
}
