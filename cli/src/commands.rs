//! The publisher and subscriber flows behind each subcommand.
//!
//! Every flow is generic over the transport so the same code drives Service
//! Bus and the in-memory broker.

use crate::config::{AppConfig, DestinationsConfig};
use crate::messages;
use anyhow::Context;
use clap::ValueEnum;
use server::destination::Destination;
use server::listener::{HandlerError, ListenerContainer, ListenerReport, SourceFactory};
use server::model::{Email, Employee, Payload};
use server::publisher::{MessageSink, MessageTemplate};
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Queue,
    Topic,
}

impl Target {
    /// Entity name records are sent to.
    pub fn entity<'a>(self, destinations: &'a DestinationsConfig) -> &'a str {
        match self {
            Target::Queue => destinations.queue(),
            Target::Topic => destinations.topic(),
        }
    }

    /// Where a listener for this target receives from.
    pub fn destination(self, destinations: &DestinationsConfig) -> Destination {
        match self {
            Target::Queue => Destination::queue(destinations.queue()),
            Target::Topic => {
                Destination::subscription(destinations.topic(), destinations.subscription())
            }
        }
    }

    /// Emails go to the queue and employees to the topic unless told otherwise.
    pub fn default_record(self) -> RecordKind {
        match self {
            Target::Queue => RecordKind::Email,
            Target::Topic => RecordKind::Employee,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Target::Queue => "queue",
            Target::Topic => "topic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    Employee,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SendKind {
    Employee,
    Email,
    All,
}

impl From<RecordKind> for SendKind {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Employee => SendKind::Employee,
            RecordKind::Email => SendKind::Email,
        }
    }
}

fn print_received<T: Payload>(
    label: &'static str,
) -> impl Fn(T) -> Result<(), HandlerError> + Send + Sync + 'static {
    move |record: T| {
        println!("Received from {label} <{record}>");
        Ok(())
    }
}

/// Registers a printing handler for `kind` on `target`.
pub fn register_listener(
    container: &mut ListenerContainer,
    destinations: &DestinationsConfig,
    target: Target,
    kind: RecordKind,
) -> anyhow::Result<()> {
    let destination = target.destination(destinations);
    match kind {
        RecordKind::Employee => {
            container.subscribe(destination, print_received::<Employee>(target.label()))
        }
        RecordKind::Email => {
            container.subscribe(destination, print_received::<Email>(target.label()))
        }
    }
    .with_context(|| format!("Cannot listen on the {}", target.label()))
}

/// Lifetime for `busline token --ttl-hours`.
pub fn token_ttl(hours: i64) -> anyhow::Result<chrono::Duration> {
    anyhow::ensure!(hours > 0, "--ttl-hours must be positive");
    chrono::Duration::try_hours(hours)
        .with_context(|| format!("--ttl-hours {hours} is out of range"))
}

/// Sends `count` of each selected record to `target`, one at a time.
pub async fn send<S: MessageSink>(
    sink: S,
    config: &AppConfig,
    target: Target,
    kind: SendKind,
    count: usize,
) -> anyhow::Result<usize> {
    let destination = target.entity(config.destinations());
    let mut template = MessageTemplate::new(sink);

    println!("Sending a welcome message.");
    let result = publish(&mut template, destination, kind, count).await;

    // close even when a send failed; the send error wins
    let closed = template.close().await;
    let sent = result.with_context(|| format!("Failed to send to {destination}"))?;
    closed.context("Failed to close the publisher")?;

    log::info!("Sent {sent} message(s) to {destination}");
    Ok(sent)
}

async fn publish<S: MessageSink>(
    template: &mut MessageTemplate<S>,
    destination: &str,
    kind: SendKind,
    count: usize,
) -> server::errors::ServiceBusResult<usize> {
    let mut sent = 0;
    if matches!(kind, SendKind::Employee | SendKind::All) {
        sent += template
            .send_all(destination, &messages::employees(count))
            .await?;
    }
    if matches!(kind, SendKind::Email | SendKind::All) {
        sent += template.send_all(destination, &messages::emails(count)).await?;
    }
    Ok(sent)
}

/// Listens on `target` until `shutdown` resolves.
pub async fn listen<F, Fut>(
    factory: Arc<F>,
    config: &AppConfig,
    target: Target,
    kind: RecordKind,
    shutdown: Fut,
) -> anyhow::Result<Vec<ListenerReport>>
where
    F: SourceFactory,
    Fut: Future<Output = ()>,
{
    let mut container = ListenerContainer::new(config.listener().options());
    register_listener(&mut container, config.destinations(), target, kind)?;

    let handle = container
        .start(factory)
        .await
        .context("Failed to start listeners")?;

    shutdown.await;
    log::info!("Shutting down listeners");
    Ok(handle.shutdown().await)
}

/// Starts both listeners, publishes the sample employee to the topic and the
/// sample email to the queue, then waits for `shutdown`.
pub async fn run<S, F, Fut>(
    sink: S,
    factory: Arc<F>,
    config: &AppConfig,
    count: usize,
    shutdown: Fut,
) -> anyhow::Result<Vec<ListenerReport>>
where
    S: MessageSink,
    F: SourceFactory,
    Fut: Future<Output = ()>,
{
    let destinations = config.destinations();
    let mut container = ListenerContainer::new(config.listener().options());
    for target in [Target::Topic, Target::Queue] {
        register_listener(&mut container, destinations, target, target.default_record())?;
    }

    let handle = container
        .start(factory)
        .await
        .context("Failed to start listeners")?;

    let mut template = MessageTemplate::new(sink);
    println!("Sending a welcome message.");
    let mut result = Ok(0);
    for target in [Target::Topic, Target::Queue] {
        let destination = target.entity(destinations);
        let kind = target.default_record().into();
        result = publish(&mut template, destination, kind, count)
            .await
            .with_context(|| format!("Failed to send to {destination}"));
        if result.is_err() {
            break;
        }
    }
    if let Err(e) = template.close().await {
        log::warn!("Failed to close the publisher: {e}");
    }

    if result.is_ok() {
        shutdown.await;
    }
    log::info!("Shutting down listeners");
    let reports = handle.shutdown().await;
    result.map(|_| reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};

    #[test]
    fn test_token_ttl_bounds() {
        assert_eq!(assert_ok!(token_ttl(24)), chrono::Duration::hours(24));
        assert_err!(token_ttl(0));
        assert_err!(token_ttl(-1));
        assert_err!(token_ttl(i64::MAX));
    }
}
