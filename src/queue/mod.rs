//! The `queue` module gives a partitioned log the shape of a job queue.
//!
//! Push side: `push`, `dispatch`, `push_raw` and `later` publish a JSON
//! payload through the `Producer`, with `attempts`, `id` and optional
//! `delay_until` carried in record headers.
//!
//! Pop side: each `pop` call subscribes if needed, polls once and classifies
//! the result:
//! - end of partition or poll timeout: no job
//! - broker error status: `QueueError::Consumer`
//! - transport failure: logged, sleep for `sleep_on_error`, no job
//! - record still delayed: rewound so a later poll sees it again, no job
//! - undecodable payload: acknowledged and skipped, no job
//! - `attempts >= max_attempts`: forwarded to the dead-letter topic,
//!   acknowledged, no job
//! - anything else: a `Job`
//!
//! Records read from the dead-letter topic itself are never dead-lettered
//! again.
//!
//! A delayed record blocks its partition: the rewind means every later
//! record in that partition waits until the delay elapses. Releasing with a
//! delay (for example a worker `backoff`) therefore stalls the partition for
//! that long.
//!
//! A `Queue` owns one consumer handle and is meant to be driven by a single
//! worker loop.

pub mod dead_letter;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::broker::{BrokerConsumer, BrokerError, BrokerProducer, PollOutcome, Record};
use crate::clock::Clock;
use crate::config::QueueSettings;
use crate::connection::CertificateFiles;
use crate::job::{Job, NamedTask};
use crate::message::headers::DELAY_UNTIL;
use crate::message::{Headers, Payload};
use crate::producer::Producer;
use crate::utils::error::{QueueError, Result};

pub use dead_letter::DeadLetterRouter;

/// The subset of `QueueSettings` the queue needs at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueOptions {
    pub default_topic: String,
    pub dead_letter_queue: Option<String>,
    pub consume_timeout: Duration,
    pub flush_timeout: Duration,
    pub dead_letter_timeout: Duration,
    pub max_attempts: u32,
    pub sleep_on_error: Duration,
}

impl From<&QueueSettings> for QueueOptions {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            default_topic: settings.default_topic.clone(),
            dead_letter_queue: settings.dead_letter_queue.clone(),
            consume_timeout: settings.consume_timeout(),
            flush_timeout: settings.flush_timeout(),
            dead_letter_timeout: settings.dead_letter_timeout(),
            max_attempts: settings.max_attempts,
            sleep_on_error: settings.sleep_on_error(),
        }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::from(&QueueSettings::default())
    }
}

#[derive(Debug)]
pub struct Queue {
    producer: Producer,
    consumer: Arc<dyn BrokerConsumer>,
    dead_letter: DeadLetterRouter,
    clock: Arc<dyn Clock>,
    options: QueueOptions,
    certificates: Arc<CertificateFiles>,
}

impl Queue {
    pub fn new(
        producer: Arc<dyn BrokerProducer>,
        consumer: Arc<dyn BrokerConsumer>,
        options: QueueOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            producer: Producer::new(producer, clock.clone(), options.flush_timeout),
            consumer,
            dead_letter: DeadLetterRouter::new(
                options.dead_letter_queue.clone(),
                options.dead_letter_timeout,
            ),
            clock,
            options,
            certificates: Arc::default(),
        }
    }

    /// Keeps the certificate files alive for as long as this queue.
    pub fn with_certificates(mut self, certificates: Arc<CertificateFiles>) -> Self {
        self.certificates = certificates;
        self
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn dead_letter_queue(&self) -> Option<&str> {
        self.dead_letter.topic()
    }

    /// Queue depth is not observable through a log broker; always 0.
    pub fn size(&self, _topic: Option<&str>) -> usize {
        0
    }

    fn topic_or_default<'a>(&'a self, topic: Option<&'a str>) -> &'a str {
        topic.unwrap_or(&self.options.default_topic)
    }

    /// Publishes a job named `job` with arguments `data`. Returns the message id.
    pub async fn push(&self, job: &str, data: Value, topic: Option<&str>) -> Result<String> {
        let payload = Payload::new(job, data, self.clock.epoch_seconds()).encode()?;
        self.push_raw(payload, topic, Headers::new()).await
    }

    /// Publishes a registered task, serialized into the payload `data`.
    pub async fn dispatch<T: NamedTask>(&self, task: &T, topic: Option<&str>) -> Result<String> {
        let data = serde_json::to_value(task)?;
        self.push(T::NAME, data, topic).await
    }

    /// Publishes an already encoded body. `headers` override the defaults
    /// except for an `id`, which is only generated when missing.
    pub async fn push_raw(
        &self,
        payload: Vec<u8>,
        topic: Option<&str>,
        headers: Headers,
    ) -> Result<String> {
        let topic = self.topic_or_default(topic);
        Ok(self.producer.publish(topic, payload, headers).await?)
    }

    /// Publishes a job that `pop` will not hand out for `delay_secs` seconds.
    pub async fn later(
        &self,
        delay_secs: u64,
        job: &str,
        data: Value,
        topic: Option<&str>,
    ) -> Result<String> {
        let now = self.clock.epoch_seconds();
        let payload = Payload::new(job, data, now)
            .with_delay(delay_secs)
            .encode()?;
        let headers = Headers::new().with(DELAY_UNTIL, now.saturating_add_unsigned(delay_secs));
        self.push_raw(payload, topic, headers).await
    }

    /// Polls `topic` (or the default topic) once and returns the next job,
    /// if any.
    pub async fn pop(&self, topic: Option<&str>) -> Result<Option<Job>> {
        let topic = self.topic_or_default(topic);

        let outcome = match self.poll(topic).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(topic, error = %e, "failed to consume message");
                tokio::time::sleep(self.options.sleep_on_error).await;
                return Ok(None);
            }
        };

        match outcome {
            PollOutcome::Message(record) => Ok(self.classify(record).await),
            PollOutcome::PartitionEof { partition, .. } => {
                debug!(topic, partition, "reached end of partition");
                Ok(None)
            }
            PollOutcome::TimedOut => {
                debug!(topic, "consumer timed out");
                Ok(None)
            }
            PollOutcome::Error(status) => {
                error!(
                    topic,
                    error_code = %status.code,
                    error_message = %status.message,
                    "consumer error"
                );
                Err(QueueError::Consumer {
                    code: status.code,
                    reason: status.message,
                })
            }
        }
    }

    async fn poll(&self, topic: &str) -> std::result::Result<PollOutcome, BrokerError> {
        let subscribed = self.consumer.subscription()?;
        if !subscribed.iter().any(|t| t == topic) {
            self.consumer.subscribe(&[topic.to_string()])?;
            debug!(topic, "subscribed to topic");
        }
        self.consumer.poll(self.options.consume_timeout).await
    }

    async fn classify(&self, record: Record) -> Option<Job> {
        let topic = record.topic.as_str();

        if let Some(delay_until) = record.headers.delay_until() {
            let now = self.clock.epoch_seconds();
            if now < delay_until {
                debug!(topic, delay_until, current_time = now, "message is delayed, skipping");
                if let Err(e) = self.consumer.seek(&record.position()) {
                    warn!(topic, error = %e, "failed to rewind delayed message");
                }
                return None;
            }
        }

        let payload = match Payload::decode(&record.payload) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    payload = %String::from_utf8_lossy(&record.payload),
                    "failed to decode message payload, skipping"
                );
                self.acknowledge(&record);
                return None;
            }
        };

        let attempts = record.headers.attempts();
        let from_dead_letter = self.dead_letter.topic() == Some(topic);
        if attempts >= self.options.max_attempts && !from_dead_letter {
            warn!(
                topic,
                attempts,
                max_attempts = self.options.max_attempts,
                message_id = record.headers.message_id().unwrap_or("unknown"),
                "message exceeded max attempts, moving to dead letter queue"
            );
            self.dead_letter
                .forward(&self.producer, self.clock.as_ref(), &record, topic)
                .await;
            self.acknowledge(&record);
            return None;
        }

        Some(Job::new(
            record,
            payload,
            self.producer.clone(),
            self.consumer.clone(),
            self.clock.clone(),
        ))
    }

    fn acknowledge(&self, record: &Record) {
        if let Err(e) = self.consumer.commit(&record.position()) {
            warn!(topic = %record.topic, offset = record.offset, error = %e, "failed to commit offset");
        }
    }
}
