use super::{
    Dispatch, DispatchError, HandlerError, InboundMessage, MessageHandler, MessageSource,
    SourceFactory, TypedDispatcher,
};
use crate::destination::Destination;
use crate::errors::ServiceBusResult;
use crate::model::Payload;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_MESSAGES: u32 = 10;
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Upper bound on messages fetched per receive call
    pub max_messages: u32,
    /// How long one receive call waits for messages
    pub receive_timeout: Duration,
    /// Pause after a failed receive before trying again
    pub error_backoff: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }
}

/// Per-listener counters, reported on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: usize,
    pub completed: usize,
    pub abandoned: usize,
    pub receive_errors: usize,
    pub settle_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerReport {
    pub destination: Destination,
    pub record_type: &'static str,
    pub stats: ListenerStats,
}

struct Registration {
    destination: Destination,
    dispatcher: Arc<dyn Dispatch>,
}

/// Holds handler registrations until [`start`](Self::start) spins up their
/// receive loops.
///
/// # Examples
///
/// ```no_run
/// use server::destination::Destination;
/// use server::listener::{ListenerContainer, ListenerOptions, SourceFactory};
/// use server::model::Employee;
/// use std::sync::Arc;
///
/// async fn listen<F: SourceFactory>(factory: Arc<F>) -> Result<(), server::errors::ServiceBusError> {
///     let mut container = ListenerContainer::new(ListenerOptions::default());
///     container.subscribe(Destination::subscription("mytopic", "S1"), |employee: Employee| {
///         println!("Received from topic <{employee}>");
///         Ok(())
///     })?;
///     let handle = container.start(factory).await?;
///     tokio::signal::ctrl_c().await.ok();
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ListenerContainer {
    options: ListenerOptions,
    registrations: Vec<Registration>,
}

impl ListenerContainer {
    pub fn new(options: ListenerOptions) -> Self {
        Self {
            options,
            registrations: Vec::new(),
        }
    }

    pub fn options(&self) -> &ListenerOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Binds `handler` to `destination`; messages are decoded as `T`.
    pub fn subscribe<T, H>(
        &mut self,
        destination: Destination,
        handler: H,
    ) -> ServiceBusResult<()>
    where
        T: Payload,
        H: MessageHandler<T>,
    {
        destination.validate()?;
        log::debug!("Registered {} listener on {destination}", T::TYPE_ID);
        self.registrations.push(Registration {
            destination,
            dispatcher: Arc::new(TypedDispatcher::<T, H>::new(handler)),
        });
        Ok(())
    }

    /// Opens a source for every registration and starts one receive loop each.
    ///
    /// # Errors
    ///
    /// Fails if any source cannot be opened; sources opened before the
    /// failure are closed again.
    pub async fn start<F: SourceFactory>(
        self,
        factory: Arc<F>,
    ) -> ServiceBusResult<ListenerHandle> {
        let mut opened = Vec::with_capacity(self.registrations.len());
        for registration in self.registrations {
            match factory.open(&registration.destination).await {
                Ok(source) => opened.push((registration, source)),
                Err(e) => {
                    log::error!(
                        "Failed to open listener on {}: {e}",
                        registration.destination
                    );
                    for (registration, mut source) in opened {
                        if let Err(close_err) = source.close().await {
                            log::warn!(
                                "Failed to close listener on {}: {close_err}",
                                registration.destination
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        let token = CancellationToken::new();
        let tasks = opened
            .into_iter()
            .map(|(registration, source)| {
                let token = token.child_token();
                let options = self.options;
                tokio::spawn(run_listener(source, registration, options, token))
            })
            .collect();

        Ok(ListenerHandle { token, tasks })
    }
}

/// Running listeners; dropping the handle does not stop them.
pub struct ListenerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<ListenerReport>>,
}

impl ListenerHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Token that stops every listener when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stops all listeners once their current receive returns and waits for
    /// their sources to close.
    pub async fn shutdown(self) -> Vec<ListenerReport> {
        self.token.cancel();
        self.wait().await
    }

    /// Waits until every listener has stopped.
    pub async fn wait(self) -> Vec<ListenerReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        for result in futures::future::join_all(self.tasks).await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => log::error!("Listener task failed: {e}"),
            }
        }
        reports
    }
}

async fn run_listener<S: MessageSource>(
    mut source: S,
    registration: Registration,
    options: ListenerOptions,
    token: CancellationToken,
) -> ListenerReport {
    let Registration {
        destination,
        dispatcher,
    } = registration;
    let mut stats = ListenerStats::default();

    log::info!(
        "Listening for {} messages on {destination}",
        dispatcher.record_type()
    );

    // Receives run to completion; anything fetched after cancellation is
    // released by `close`.
    while !token.is_cancelled() {
        let batch = source
            .receive(options.max_messages, options.receive_timeout)
            .await;
        if token.is_cancelled() {
            break;
        }

        match batch {
            Ok(messages) => {
                for message in messages {
                    stats.received += 1;
                    handle_message(
                        &mut source,
                        &destination,
                        dispatcher.as_ref(),
                        &message,
                        &mut stats,
                    )
                    .await;
                }
            }
            Err(e) => {
                stats.receive_errors += 1;
                log::error!("Receive on {destination} failed: {e}");
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(options.error_backoff) => {}
                }
            }
        }
    }

    if let Err(e) = source.close().await {
        log::warn!("Failed to close listener on {destination}: {e}");
    }
    log::info!(
        "Stopped listener on {destination}: {} received, {} completed, {} abandoned",
        stats.received,
        stats.completed,
        stats.abandoned
    );

    ListenerReport {
        destination,
        record_type: dispatcher.record_type(),
        stats,
    }
}

async fn handle_message<S: MessageSource>(
    source: &mut S,
    destination: &Destination,
    dispatcher: &dyn Dispatch,
    message: &InboundMessage,
    stats: &mut ListenerStats,
) {
    let outcome = AssertUnwindSafe(dispatcher.dispatch(destination, &message.body))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(DispatchError::Handler(HandlerError::new(format!(
                "handler panicked: {}",
                panic_reason(panic.as_ref())
            ))))
        });

    match outcome {
        Ok(()) => match source.complete(message).await {
            Ok(()) => stats.completed += 1,
            Err(e) => {
                stats.settle_errors += 1;
                log::error!("{e}");
            }
        },
        Err(e) => {
            match &e {
                DispatchError::Decode(_) => log::error!(
                    "Returning undecodable message {} on {destination} to the broker: {e}",
                    message.sequence_number
                ),
                DispatchError::Handler(_) => log::warn!(
                    "Message {} on {destination} (delivery {}) will be redelivered: {e}",
                    message.sequence_number,
                    message.delivery_count.unwrap_or_default()
                ),
            }
            match source.abandon(message).await {
                Ok(()) => stats.abandoned += 1,
                Err(e) => {
                    stats.settle_errors += 1;
                    log::error!("{e}");
                }
            }
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageConverter;
    use crate::listener::HandlerError;
    use crate::memory::{MAX_DELIVERY_COUNT, MemoryBroker};
    use crate::model::{Email, Employee};
    use async_trait::async_trait;
    use claims::{assert_err, assert_ok, assert_some};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::mpsc;

    fn fast_options() -> ListenerOptions {
        ListenerOptions {
            max_messages: 10,
            receive_timeout: Duration::from_millis(20),
            error_backoff: Duration::from_millis(5),
        }
    }

    fn publish<T: Payload>(broker: &MemoryBroker, destination: &str, record: &T) {
        let message = assert_ok!(MessageConverter::to_message(record));
        assert_ok!(broker.publish(destination, &message));
    }

    #[test]
    fn test_subscribe_rejects_invalid_destination() {
        let mut container = ListenerContainer::new(ListenerOptions::default());

        let err = assert_err!(container.subscribe(Destination::queue(""), |_: Employee| Ok(())));

        assert!(matches!(err, crate::errors::ServiceBusError::InvalidDestination(_)));
        assert!(container.is_empty());
    }

    #[test]
    fn test_default_options() {
        let options = ListenerOptions::default();
        assert_eq!(options.max_messages, 10);
        assert_eq!(options.receive_timeout, Duration::from_secs(5));
        assert_eq!(options.error_backoff, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_queue_and_topic_handlers_receive_their_records() {
        let broker = MemoryBroker::new();
        broker.create_subscription("mytopic", "S1");
        let (employees_tx, mut employees_rx) = mpsc::unbounded_channel();
        let (emails_tx, mut emails_rx) = mpsc::unbounded_channel();

        let mut container = ListenerContainer::new(fast_options());
        assert_ok!(container.subscribe(
            Destination::subscription("mytopic", "S1"),
            move |employee: Employee| {
                employees_tx.send(employee).map_err(HandlerError::new)
            }
        ));
        assert_ok!(container.subscribe(Destination::queue("testqueue"), move |email: Email| {
            emails_tx.send(email).map_err(HandlerError::new)
        }));
        assert_eq!(container.len(), 2);

        let handle = assert_ok!(container.start(Arc::new(broker.clone())).await);
        publish(&broker, "mytopic", &Employee::new("exampleName", "10001"));
        publish(&broker, "testqueue", &Email::new("info@example.com", "Hello"));

        let employee = assert_some!(employees_rx.recv().await);
        let email = assert_some!(emails_rx.recv().await);
        assert_eq!(employee, Employee::new("exampleName", "10001"));
        assert_eq!(email, Email::new("info@example.com", "Hello"));

        let reports = handle.shutdown().await;
        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert_eq!(report.stats.received, 1);
            assert_eq!(report.stats.completed, 1);
            assert_eq!(report.stats.abandoned, 0);
        }
        assert_eq!(broker.completed_count(&Destination::queue("testqueue")), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_abandons_until_dead_lettered() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("testqueue");
        let attempts = Arc::new(Mutex::new(0u32));

        let mut container = ListenerContainer::new(fast_options());
        let seen = attempts.clone();
        assert_ok!(container.subscribe(queue.clone(), move |_: Employee| {
            *seen.lock().unwrap() += 1;
            Err(HandlerError::new("database unavailable"))
        }));

        let handle = assert_ok!(container.start(Arc::new(broker.clone())).await);
        publish(&broker, "testqueue", &Employee::new("exampleName", "10001"));

        while broker.dead_lettered(&queue).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let reports = handle.shutdown().await;

        assert_eq!(*attempts.lock().unwrap(), MAX_DELIVERY_COUNT);
        assert_eq!(reports[0].stats.abandoned, MAX_DELIVERY_COUNT as usize);
        assert_eq!(reports[0].stats.completed, 0);
        assert_eq!(broker.completed_count(&queue), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_keeps_listening() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("testqueue");
        let attempts = Arc::new(AtomicU32::new(0));

        let mut container = ListenerContainer::new(fast_options());
        let seen = attempts.clone();
        assert_ok!(container.subscribe(queue.clone(), move |employee: Employee| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("cannot handle {}", employee.id);
            }
            Ok(())
        }));

        let handle = assert_ok!(container.start(Arc::new(broker.clone())).await);
        publish(&broker, "testqueue", &Employee::new("exampleName", "10001"));
        publish(&broker, "testqueue", &Employee::new("exampleName", "10002"));

        while broker.completed_count(&queue) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let reports = handle.shutdown().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(reports[0].stats.abandoned, 1);
        assert_eq!(reports[0].stats.completed, 2);
        assert!(broker.dead_lettered(&queue).is_empty());
    }

    #[test]
    fn test_panic_reason() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let formatted: Box<dyn Any + Send> = Box::new(String::from("boom 42"));
        let other: Box<dyn Any + Send> = Box::new(42);

        assert_eq!(panic_reason(literal.as_ref()), "boom");
        assert_eq!(panic_reason(formatted.as_ref()), "boom 42");
        assert_eq!(panic_reason(other.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_wrong_record_type_is_not_handled() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("testqueue");
        let handled = Arc::new(Mutex::new(false));

        let mut container = ListenerContainer::new(fast_options());
        let flag = handled.clone();
        assert_ok!(container.subscribe(queue.clone(), move |_: Email| {
            *flag.lock().unwrap() = true;
            Ok(())
        }));

        let handle = assert_ok!(container.start(Arc::new(broker.clone())).await);
        publish(&broker, "testqueue", &Employee::new("exampleName", "10001"));

        while broker.dead_lettered(&queue).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.shutdown().await;

        assert!(!*handled.lock().unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_returns_unsettled_messages() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("testqueue");
        let mut container = ListenerContainer::new(fast_options());
        assert_ok!(container.subscribe(queue.clone(), |_: Employee| Ok(())));

        let handle = assert_ok!(container.start(Arc::new(broker.clone())).await);
        let reports = handle.shutdown().await;
        publish(&broker, "testqueue", &Employee::new("exampleName", "10001"));

        assert_eq!(reports[0].stats.received, 0);
        assert_eq!(broker.ready_count(&queue), 1);
    }

    /// Source whose first receive waits out the full timeout before
    /// returning one message. On close it reports what is still locked.
    struct SlowSource {
        finished: Arc<AtomicBool>,
        unsettled: Arc<Mutex<Vec<i64>>>,
        pending: Vec<InboundMessage>,
        locked: Vec<i64>,
    }

    impl SlowSource {
        fn settle(&mut self, message: &InboundMessage) {
            self.locked.retain(|sequence| *sequence != message.sequence_number);
        }
    }

    #[async_trait]
    impl MessageSource for SlowSource {
        async fn receive(
            &mut self,
            _max_messages: u32,
            timeout: Duration,
        ) -> ServiceBusResult<Vec<InboundMessage>> {
            tokio::time::sleep(timeout).await;
            self.finished.store(true, Ordering::SeqCst);
            let batch = std::mem::take(&mut self.pending);
            self.locked
                .extend(batch.iter().map(|message| message.sequence_number));
            Ok(batch)
        }

        async fn complete(&mut self, message: &InboundMessage) -> ServiceBusResult<()> {
            self.settle(message);
            Ok(())
        }

        async fn abandon(&mut self, message: &InboundMessage) -> ServiceBusResult<()> {
            self.settle(message);
            Ok(())
        }

        async fn close(&mut self) -> ServiceBusResult<()> {
            *self.unsettled.lock().unwrap() = std::mem::take(&mut self.locked);
            Ok(())
        }
    }

    struct SlowFactory {
        finished: Arc<AtomicBool>,
        unsettled: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl SourceFactory for SlowFactory {
        type Source = SlowSource;

        async fn open(&self, _destination: &Destination) -> ServiceBusResult<SlowSource> {
            let body = assert_ok!(MessageConverter::to_message(&Employee::new("n", "1"))).body;
            Ok(SlowSource {
                finished: self.finished.clone(),
                unsettled: self.unsettled.clone(),
                pending: vec![InboundMessage {
                    sequence_number: 1,
                    message_id: None,
                    delivery_count: Some(1),
                    body,
                }],
                locked: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_shutdown_lets_receive_in_flight_finish() {
        let finished = Arc::new(AtomicBool::new(false));
        let unsettled = Arc::new(Mutex::new(Vec::new()));
        let handled = Arc::new(AtomicBool::new(false));

        let mut container = ListenerContainer::new(ListenerOptions {
            receive_timeout: Duration::from_millis(100),
            ..fast_options()
        });
        let flag = handled.clone();
        assert_ok!(container.subscribe(Destination::queue("testqueue"), move |_: Employee| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }));

        let factory = SlowFactory {
            finished: finished.clone(),
            unsettled: unsettled.clone(),
        };
        let handle = assert_ok!(container.start(Arc::new(factory)).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let reports = handle.shutdown().await;

        assert!(finished.load(Ordering::SeqCst));
        assert!(!handled.load(Ordering::SeqCst));
        assert_eq!(reports[0].stats.received, 0);
        assert_eq!(*unsettled.lock().unwrap(), vec![1]);
    }
}
