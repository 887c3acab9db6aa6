use busline::commands::{self, RecordKind, SendKind, Target};
use busline::config::AppConfig;
use claims::{assert_err, assert_ok};
use server::destination::Destination;
use server::memory::MemoryBroker;
use std::sync::Arc;
use std::time::Duration;

async fn wait_for_completed(broker: &MemoryBroker, destination: &Destination, count: usize) {
    let waiting = async {
        while broker.completed_count(destination) < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    assert_ok!(tokio::time::timeout(Duration::from_secs(10), waiting).await);
}

#[tokio::test]
async fn test_send_defaults_to_queue() {
    let broker = MemoryBroker::new();
    let config = AppConfig::default();

    let sent = assert_ok!(
        commands::send(broker.clone(), &config, Target::Queue, SendKind::All, 2).await
    );

    assert_eq!(sent, 4);
    assert_eq!(broker.ready_count(&Destination::queue("testqueue")), 4);
}

#[tokio::test]
async fn test_send_to_topic_reaches_subscription() {
    let broker = MemoryBroker::new();
    broker.create_subscription("mytopic", "S1");
    let config = AppConfig::default();

    let sent = assert_ok!(
        commands::send(broker.clone(), &config, Target::Topic, SendKind::Employee, 3).await
    );

    assert_eq!(sent, 3);
    assert_eq!(broker.ready_count(&Destination::subscription("mytopic", "S1")), 3);
}

#[tokio::test]
async fn test_listen_completes_published_records() {
    let broker = MemoryBroker::new();
    let config = AppConfig::default();
    let queue = Destination::queue("testqueue");
    assert_ok!(commands::send(broker.clone(), &config, Target::Queue, SendKind::Email, 2).await);

    let reports = assert_ok!(
        commands::listen(
            Arc::new(broker.clone()),
            &config,
            Target::Queue,
            RecordKind::Email,
            wait_for_completed(&broker, &queue, 2),
        )
        .await
    );

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stats.completed, 2);
}

#[tokio::test]
async fn test_run_round_trips_both_records() {
    let broker = MemoryBroker::new();
    let config = AppConfig::default();
    let topic = Destination::subscription("mytopic", "S1");
    let queue = Destination::queue("testqueue");

    let shutdown = async {
        wait_for_completed(&broker, &topic, 1).await;
        wait_for_completed(&broker, &queue, 1).await;
    };
    let reports = assert_ok!(
        commands::run(broker.clone(), Arc::new(broker.clone()), &config, 1, shutdown).await
    );

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.stats.completed == 1 && r.stats.abandoned == 0));
}

#[tokio::test]
async fn test_send_rejects_invalid_queue_name() {
    let broker = MemoryBroker::new();
    let config: AppConfig = assert_ok!(
        config::Config::builder()
            .set_override("destinations.queue", " ")
            .and_then(|builder| builder.build())
            .and_then(|config| config.try_deserialize())
    );

    assert_err!(commands::send(broker, &config, Target::Queue, SendKind::Email, 1).await);
}
