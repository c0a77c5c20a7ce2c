use std::time::Duration;

use super::topic::Topic;
use super::{
    BrokerCode, BrokerError, BrokerStatus, ClientConfig, DeliveryError, MemoryBroker,
    OutboundRecord, PendingDelivery, PollOutcome, Transport,
};
use crate::message::Headers;
use crate::persistence::LogStore;

use tempfile::tempdir;

const WAIT: Duration = Duration::from_millis(50);

fn producer_config() -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", "memory:9092");
    config
}

fn consumer_config(group: &str) -> ClientConfig {
    let mut config = producer_config();
    config.set("group.id", group);
    config
}

fn outbound(topic: &str, body: &str) -> OutboundRecord {
    OutboundRecord::new(topic, body.as_bytes().to_vec(), Headers::new())
}

#[test]
fn test_topic_new_has_at_least_one_partition() {
    let topic = Topic::new("jobs", 0);
    assert_eq!(topic.name, "jobs");
    assert_eq!(topic.partition_count(), 1);
    assert_eq!(topic.log_end(0), 0);
}

#[test]
fn test_topic_append_assigns_offsets_round_robin() {
    let mut topic = Topic::new("jobs", 2);
    let a = topic.append(None, b"a".to_vec(), Headers::new(), 0).unwrap();
    let b = topic.append(None, b"b".to_vec(), Headers::new(), 0).unwrap();
    let c = topic.append(None, b"c".to_vec(), Headers::new(), 0).unwrap();

    assert_eq!((a.partition, a.offset), (0, 0));
    assert_eq!((b.partition, b.offset), (1, 0));
    assert_eq!((c.partition, c.offset), (0, 1));
    assert_eq!(topic.get(0, 1).unwrap().payload, b"c");
}

#[test]
fn test_topic_append_to_missing_partition_is_rejected() {
    let mut topic = Topic::new("jobs", 1);
    let status = topic
        .append(Some(3), b"a".to_vec(), Headers::new(), 0)
        .unwrap_err();
    assert_eq!(status.code, BrokerCode::UNKNOWN_TOPIC_OR_PARTITION);
}

#[test]
fn test_broker_code_classification() {
    assert_eq!(BrokerCode::AUTHENTICATION.describe(), "authentication failed");
    assert_eq!(
        BrokerCode::MESSAGE_TOO_LARGE.describe(),
        "message size too large"
    );
    assert_eq!(
        BrokerCode(4242).describe(),
        "unknown broker error code: 4242"
    );
    assert!(BrokerCode::NO_ERROR.is_success());
    assert!(!BrokerCode::TIMED_OUT.is_success());
}

#[test]
fn test_client_config_debug_redacts_password() {
    let mut config = ClientConfig::new();
    config.set("sasl.username", "svc").set("sasl.password", "hunter2");

    let rendered = format!("{config:?}");
    assert!(rendered.contains("svc"));
    assert!(!rendered.contains("hunter2"));
    assert_eq!(config.get("sasl.password"), Some("hunter2"));
}

#[test]
fn test_client_config_bool_parsing() {
    let mut config = ClientConfig::new();
    config.set("enable.auto.commit", "false").set("odd", "maybe");
    assert_eq!(config.get_bool("enable.auto.commit"), Some(false));
    assert_eq!(config.get_bool("odd"), None);
    assert_eq!(config.get_bool("missing"), None);
}

#[test]
fn test_transport_requires_bootstrap_servers() {
    let broker = MemoryBroker::new();
    let err = broker.create_producer(&ClientConfig::new()).unwrap_err();
    match err {
        BrokerError::Status(status) => assert_eq!(status.code, BrokerCode::TRANSPORT),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_transport_requires_group_id_for_consumers() {
    let broker = MemoryBroker::new();
    let err = broker.create_consumer(&producer_config()).unwrap_err();
    match err {
        BrokerError::Status(status) => assert_eq!(status.code, BrokerCode::INVALID_GROUP_ID),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_pending_delivery_outcomes() {
    let rejected = PendingDelivery::ready(Err(BrokerStatus::from_code(
        BrokerCode::NOT_ENOUGH_REPLICAS,
    )));
    match rejected.wait(WAIT).await {
        Err(DeliveryError::Rejected(status)) => {
            assert_eq!(status.code, BrokerCode::NOT_ENOUGH_REPLICAS)
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let (tx, abandoned) = PendingDelivery::channel();
    drop(tx);
    assert_eq!(abandoned.wait(WAIT).await, Err(DeliveryError::Abandoned));

    let (_tx, silent) = PendingDelivery::channel();
    assert_eq!(silent.wait(WAIT).await, Err(DeliveryError::TimedOut));
}

#[tokio::test]
async fn test_produce_then_poll_returns_record() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let consumer = broker.create_consumer(&consumer_config("g")).unwrap();

    let delivered = producer
        .produce(outbound("jobs", "hello"))
        .unwrap()
        .wait(WAIT)
        .await
        .unwrap();
    assert_eq!((delivered.partition, delivered.offset), (0, 0));

    consumer.subscribe(&["jobs".to_string()]).unwrap();
    match consumer.poll(WAIT).await.unwrap() {
        PollOutcome::Message(record) => {
            assert_eq!(record.topic, "jobs");
            assert_eq!(record.payload, b"hello");
        }
        other => panic!("expected a message, got {other:?}"),
    }
    assert_eq!(consumer.poll(WAIT).await.unwrap(), PollOutcome::TimedOut);
}

#[tokio::test]
async fn test_poll_without_subscription_times_out() {
    let broker = MemoryBroker::new();
    let consumer = broker.create_consumer(&consumer_config("g")).unwrap();
    assert_eq!(consumer.poll(WAIT).await.unwrap(), PollOutcome::TimedOut);
}

#[tokio::test]
async fn test_poll_wakes_up_when_a_record_arrives() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let consumer = broker.create_consumer(&consumer_config("g")).unwrap();
    consumer.subscribe(&["jobs".to_string()]).unwrap();

    let poll = tokio::spawn({
        let consumer = consumer.clone();
        async move { consumer.poll(Duration::from_secs(5)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    producer.produce(outbound("jobs", "late")).unwrap();

    match poll.await.unwrap().unwrap() {
        PollOutcome::Message(record) => assert_eq!(record.payload, b"late"),
        other => panic!("expected a message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_partition_eof_reported_once_per_catch_up() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let mut config = consumer_config("g");
    config.set("enable.partition.eof", "true");
    let consumer = broker.create_consumer(&config).unwrap();
    consumer.subscribe(&["jobs".to_string()]).unwrap();

    producer.produce(outbound("jobs", "one")).unwrap();
    assert!(matches!(
        consumer.poll(WAIT).await.unwrap(),
        PollOutcome::Message(_)
    ));
    assert_eq!(
        consumer.poll(WAIT).await.unwrap(),
        PollOutcome::PartitionEof {
            topic: "jobs".to_string(),
            partition: 0
        }
    );
    assert_eq!(consumer.poll(WAIT).await.unwrap(), PollOutcome::TimedOut);
}

#[tokio::test]
async fn test_commit_is_where_a_new_group_member_resumes() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let mut config = consumer_config("g");
    config.set("enable.auto.commit", "false");

    for body in ["a", "b"] {
        producer.produce(outbound("jobs", body)).unwrap();
    }

    let first = broker.create_consumer(&config).unwrap();
    first.subscribe(&["jobs".to_string()]).unwrap();
    let PollOutcome::Message(a) = first.poll(WAIT).await.unwrap() else {
        panic!("expected first record");
    };
    first.commit(&a.position()).unwrap();
    assert_eq!(broker.committed_offset("g", "jobs", 0), Some(1));

    let second = broker.create_consumer(&config).unwrap();
    second.subscribe(&["jobs".to_string()]).unwrap();
    let PollOutcome::Message(b) = second.poll(WAIT).await.unwrap() else {
        panic!("expected second record");
    };
    assert_eq!(b.payload, b"b");
}

#[tokio::test]
async fn test_auto_commit_stores_positions_on_next_poll() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let consumer = broker.create_consumer(&consumer_config("g")).unwrap();
    consumer.subscribe(&["jobs".to_string()]).unwrap();

    producer.produce(outbound("jobs", "a")).unwrap();
    consumer.poll(WAIT).await.unwrap();
    assert_eq!(broker.committed_offset("g", "jobs", 0), None);

    consumer.poll(WAIT).await.unwrap();
    assert_eq!(broker.committed_offset("g", "jobs", 0), Some(1));
}

#[tokio::test]
async fn test_auto_commit_without_offset_store_only_commits_explicitly() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let mut config = consumer_config("g");
    config.set("enable.auto.offset.store", false);
    let consumer = broker.create_consumer(&config).unwrap();
    consumer.subscribe(&["jobs".to_string()]).unwrap();

    producer.produce(outbound("jobs", "a")).unwrap();
    producer.produce(outbound("jobs", "b")).unwrap();
    let PollOutcome::Message(a) = consumer.poll(WAIT).await.unwrap() else {
        panic!("expected a record");
    };
    consumer.poll(WAIT).await.unwrap();
    consumer.poll(WAIT).await.unwrap();
    assert_eq!(broker.committed_offset("g", "jobs", 0), None);

    consumer.commit(&a.position()).unwrap();
    consumer.poll(WAIT).await.unwrap();
    assert_eq!(broker.committed_offset("g", "jobs", 0), Some(1));
}

#[tokio::test]
async fn test_latest_reset_skips_existing_records() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    producer.produce(outbound("jobs", "old")).unwrap();

    let mut config = consumer_config("fresh");
    config.set("auto.offset.reset", "latest");
    let consumer = broker.create_consumer(&config).unwrap();
    consumer.subscribe(&["jobs".to_string()]).unwrap();
    assert_eq!(consumer.poll(WAIT).await.unwrap(), PollOutcome::TimedOut);

    producer.produce(outbound("jobs", "new")).unwrap();
    let PollOutcome::Message(record) = consumer.poll(WAIT).await.unwrap() else {
        panic!("expected the new record");
    };
    assert_eq!(record.payload, b"new");
}

#[tokio::test]
async fn test_seek_replays_a_record() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let consumer = broker.create_consumer(&consumer_config("g")).unwrap();
    consumer.subscribe(&["jobs".to_string()]).unwrap();
    producer.produce(outbound("jobs", "again")).unwrap();

    let PollOutcome::Message(record) = consumer.poll(WAIT).await.unwrap() else {
        panic!("expected a record");
    };
    consumer.seek(&record.position()).unwrap();
    let PollOutcome::Message(replayed) = consumer.poll(WAIT).await.unwrap() else {
        panic!("expected the replayed record");
    };
    assert_eq!(replayed.offset, record.offset);
}

#[tokio::test]
async fn test_resubscribe_replaces_topics() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let consumer = broker.create_consumer(&consumer_config("g")).unwrap();
    producer.produce(outbound("jobs", "job")).unwrap();
    producer.produce(outbound("jobs-dlq", "dead")).unwrap();

    consumer.subscribe(&["jobs".to_string()]).unwrap();
    consumer.subscribe(&["jobs-dlq".to_string()]).unwrap();
    assert_eq!(consumer.subscription().unwrap(), vec!["jobs-dlq".to_string()]);

    let PollOutcome::Message(record) = consumer.poll(WAIT).await.unwrap() else {
        panic!("expected a record");
    };
    assert_eq!(record.topic, "jobs-dlq");
}

#[tokio::test]
async fn test_fault_injection() {
    let broker = MemoryBroker::new();
    let producer = broker.create_producer(&producer_config()).unwrap();
    let consumer = broker.create_consumer(&consumer_config("g")).unwrap();
    consumer.subscribe(&["jobs".to_string()]).unwrap();

    broker.fail_next_poll(BrokerStatus::from_code(BrokerCode::UNKNOWN_MEMBER_ID));
    match consumer.poll(WAIT).await.unwrap() {
        PollOutcome::Error(status) => assert_eq!(status.code, BrokerCode::UNKNOWN_MEMBER_ID),
        other => panic!("expected an error outcome, got {other:?}"),
    }

    broker.break_next_poll("connection reset");
    assert!(matches!(
        consumer.poll(WAIT).await,
        Err(BrokerError::Transport(_))
    ));

    broker.refuse_next_produce("queue full");
    assert!(producer.produce(outbound("jobs", "x")).is_err());

    broker.reject_next_delivery(BrokerStatus::from_code(BrokerCode::NOT_ENOUGH_REPLICAS));
    let outcome = producer.produce(outbound("jobs", "x")).unwrap().wait(WAIT).await;
    assert!(matches!(outcome, Err(DeliveryError::Rejected(_))));
    assert!(broker.records("jobs").is_empty());

    broker.hold_deliveries(true);
    let outcome = producer.produce(outbound("jobs", "x")).unwrap().wait(WAIT).await;
    assert_eq!(outcome, Err(DeliveryError::TimedOut));
    assert_eq!(broker.records("jobs").len(), 1);
}

#[tokio::test]
async fn test_oversized_records_are_rejected() {
    let broker = MemoryBroker::with_limits(1, 4);
    let producer = broker.create_producer(&producer_config()).unwrap();

    let outcome = producer
        .produce(outbound("jobs", "too large"))
        .unwrap()
        .wait(WAIT)
        .await;
    match outcome {
        Err(DeliveryError::Rejected(status)) => {
            assert_eq!(status.code, BrokerCode::MESSAGE_TOO_LARGE)
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_persistent_broker_restores_log_and_offsets() {
    let dir = tempdir().unwrap();
    let mut config = consumer_config("g");
    config.set("enable.auto.commit", "false");

    {
        let broker = MemoryBroker::open(LogStore::open(dir.path()).unwrap(), 1).unwrap();
        let producer = broker.create_producer(&producer_config()).unwrap();
        producer.produce(outbound("jobs", "a")).unwrap();
        producer.produce(outbound("jobs", "b")).unwrap();

        let consumer = broker.create_consumer(&config).unwrap();
        consumer.subscribe(&["jobs".to_string()]).unwrap();
        let PollOutcome::Message(a) = consumer.poll(WAIT).await.unwrap() else {
            panic!("expected a record");
        };
        consumer.commit(&a.position()).unwrap();
        broker.flush().unwrap();
    }

    let broker = MemoryBroker::open(LogStore::open(dir.path()).unwrap(), 1).unwrap();
    assert_eq!(broker.records("jobs").len(), 2);
    assert_eq!(broker.committed_offset("g", "jobs", 0), Some(1));

    let consumer = broker.create_consumer(&config).unwrap();
    consumer.subscribe(&["jobs".to_string()]).unwrap();
    let PollOutcome::Message(b) = consumer.poll(WAIT).await.unwrap() else {
        panic!("expected a record");
    };
    assert_eq!(b.payload, b"b");
}
