//! The `job` module holds the unit of work handed out by `Queue::pop`.
//!
//! A `Job` wraps one broker record and its decoded payload. It finishes in
//! one of two ways:
//! - `delete` acknowledges the record for the consumer group
//! - `release` republishes a copy with `attempts + 1` (and optionally a
//!   delay) and acknowledges the original
//!
//! `fire` runs the task through a `TaskRegistry` and deletes the job on
//! success. A failed job is marked failed; deciding whether to release it is
//! left to the caller.

pub mod registry;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::broker::{BrokerConsumer, Offset, Partition, Record};
use crate::clock::Clock;
use crate::message::headers::{ATTEMPTS, DELAY_UNTIL, RELEASED_AT};
use crate::message::{Headers, Payload};
use crate::producer::Producer;
use crate::utils::error::{JobError, QueueError, Result};

pub use registry::{NamedTask, Task, TaskRegistry};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct JobState {
    deleted: bool,
    released: bool,
    failed: bool,
}

#[derive(Debug)]
pub struct Job {
    record: Record,
    payload: Payload,
    producer: Producer,
    consumer: Arc<dyn BrokerConsumer>,
    clock: Arc<dyn Clock>,
    state: JobState,
}

impl Job {
    pub(crate) fn new(
        record: Record,
        payload: Payload,
        producer: Producer,
        consumer: Arc<dyn BrokerConsumer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            record,
            payload,
            producer,
            consumer,
            clock,
            state: JobState::default(),
        }
    }

    /// Payload `uuid`, falling back to the `id` header.
    pub fn id(&self) -> &str {
        if !self.payload.uuid.is_empty() {
            return &self.payload.uuid;
        }
        self.record.headers.message_id().unwrap_or("unknown")
    }

    /// The `id` header assigned at first publish.
    pub fn message_id(&self) -> Option<&str> {
        self.record.headers.message_id()
    }

    pub fn name(&self) -> &str {
        if self.payload.display_name.is_empty() {
            "Unknown"
        } else {
            &self.payload.display_name
        }
    }

    /// Redelivery count from the `attempts` header.
    pub fn attempts(&self) -> u32 {
        self.record.headers.attempts()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.record.payload
    }

    pub fn topic(&self) -> &str {
        &self.record.topic
    }

    pub fn partition(&self) -> Partition {
        self.record.partition
    }

    pub fn offset(&self) -> Offset {
        self.record.offset
    }

    pub fn headers(&self) -> &Headers {
        &self.record.headers
    }

    pub fn is_deleted(&self) -> bool {
        self.state.deleted
    }

    pub fn is_released(&self) -> bool {
        self.state.released
    }

    pub fn has_failed(&self) -> bool {
        self.state.failed
    }

    fn is_finished(&self) -> bool {
        self.state.deleted || self.state.released
    }

    /// Acknowledges the record so the consumer group never sees it again.
    /// Calling it twice is a no-op.
    pub fn delete(&mut self) -> Result<()> {
        if self.is_finished() {
            warn!(
                topic = %self.record.topic,
                job_id = %self.id(),
                "job already finished, ignoring delete"
            );
            return Ok(());
        }

        self.consumer
            .commit(&self.record.position())
            .map_err(QueueError::consumer)?;
        self.state.deleted = true;

        debug!(
            topic = %self.record.topic,
            partition = self.record.partition,
            offset = self.record.offset,
            "job deleted from queue"
        );
        Ok(())
    }

    /// Puts a copy of the job back on its topic with one more attempt, to be
    /// picked up no earlier than `delay_secs` from now.
    ///
    /// A failed republish is logged, not returned: the original record is
    /// acknowledged either way.
    pub async fn release(&mut self, delay_secs: u64) {
        if self.is_finished() {
            warn!(
                topic = %self.record.topic,
                job_id = %self.id(),
                "job already finished, ignoring release"
            );
            return;
        }
        self.state.released = true;

        let now = self.clock.epoch_seconds();
        let attempts = self.attempts().saturating_add(1);
        let mut headers = self.record.headers.clone();
        headers.insert(ATTEMPTS, attempts);
        headers.insert(RELEASED_AT, now);
        if delay_secs > 0 {
            headers.insert(DELAY_UNTIL, now.saturating_add_unsigned(delay_secs));
        }

        match self
            .producer
            .publish(&self.record.topic, self.record.payload.clone(), headers)
            .await
        {
            Ok(_) => info!(
                topic = %self.record.topic,
                job_id = %self.id(),
                attempts,
                delay = delay_secs,
                "job released back to queue"
            ),
            Err(e) => error!(
                topic = %self.record.topic,
                job_id = %self.id(),
                error = %e,
                "failed to release job back to queue"
            ),
        }

        if let Err(e) = self.consumer.commit(&self.record.position()) {
            warn!(topic = %self.record.topic, error = %e, "failed to commit released job");
        }
    }

    /// Marks the job failed. Does not release it.
    pub fn fail(&mut self, reason: &JobError) {
        self.state.failed = true;
        error!(
            topic = %self.record.topic,
            job_id = %self.id(),
            job_name = %self.name(),
            attempts = self.attempts(),
            error = %reason,
            "job failed to process"
        );
    }

    /// Resolves the task in `registry`, runs it, and deletes the job on
    /// success. On failure the job is marked failed and the error returned.
    pub async fn fire(&mut self, registry: &TaskRegistry) -> std::result::Result<(), JobError> {
        if self.is_finished() {
            return Err(JobError::AlreadyFinished);
        }

        let outcome = match registry.decode(&self.payload) {
            Ok(task) => registry.execute(task.as_ref()).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            self.fail(&e);
            return Err(e);
        }

        self.delete()?;
        info!(
            topic = %self.record.topic,
            job_id = %self.id(),
            job_name = %self.name(),
            "job processed successfully"
        );
        Ok(())
    }
}
