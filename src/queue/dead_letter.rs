//! Forwards records that ran out of attempts to the dead-letter topic.

use std::time::Duration;

use tracing::{error, info};

use crate::broker::Record;
use crate::clock::Clock;
use crate::message::headers::{FAILED_AT, FAILURE_REASON, ORIGINAL_TOPIC};
use crate::producer::Producer;

pub const MAX_ATTEMPTS_EXCEEDED: &str = "max_attempts_exceeded";

#[derive(Debug, Clone)]
pub struct DeadLetterRouter {
    topic: Option<String>,
    timeout: Duration,
}

impl DeadLetterRouter {
    pub fn new(topic: Option<String>, timeout: Duration) -> Self {
        Self {
            topic: topic.filter(|t| !t.trim().is_empty()),
            timeout,
        }
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Copies `record` to the dead-letter topic with failure metadata.
    ///
    /// Returns whether the copy was confirmed. Failures are logged and never
    /// returned; without a dead-letter topic this does nothing.
    pub async fn forward(
        &self,
        producer: &Producer,
        clock: &dyn Clock,
        record: &Record,
        original_topic: &str,
    ) -> bool {
        let Some(dead_letter_topic) = self.topic.as_deref() else {
            return false;
        };

        let mut headers = record.headers.clone();
        headers.insert(ORIGINAL_TOPIC, original_topic);
        headers.insert(FAILED_AT, clock.epoch_seconds());
        headers.insert(FAILURE_REASON, MAX_ATTEMPTS_EXCEEDED);

        let message_id = record.headers.message_id().unwrap_or("unknown");
        match producer
            .publish_with_timeout(
                dead_letter_topic,
                record.payload.clone(),
                headers,
                self.timeout,
            )
            .await
        {
            Ok(_) => {
                info!(
                    original_topic,
                    dead_letter_queue = dead_letter_topic,
                    message_id,
                    "message moved to dead letter queue"
                );
                true
            }
            Err(e) => {
                error!(
                    topic = original_topic,
                    dead_letter_queue = dead_letter_topic,
                    message_id,
                    error = %e,
                    "failed to move message to dead letter queue"
                );
                false
            }
        }
    }
}
