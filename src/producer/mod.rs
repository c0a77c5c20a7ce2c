//! The `producer` module publishes records and waits for the broker to
//! confirm them.
//!
//! Every publish either returns the message id of a confirmed delivery or a
//! `ProducerError`; nothing is dropped silently.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};
use uuid::Uuid;

use crate::broker::{BrokerProducer, DeliveryError, OutboundRecord};
use crate::clock::Clock;
use crate::message::Headers;
use crate::message::headers::{ATTEMPTS, ID, TIMESTAMP};
use crate::utils::error::ProducerError;

#[derive(Debug, Clone)]
pub struct Producer {
    handle: Arc<dyn BrokerProducer>,
    clock: Arc<dyn Clock>,
    flush_timeout: Duration,
}

impl Producer {
    pub fn new(handle: Arc<dyn BrokerProducer>, clock: Arc<dyn Clock>, flush_timeout: Duration) -> Self {
        Self {
            handle,
            clock,
            flush_timeout,
        }
    }

    pub fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    /// Publishes `payload` to `topic` and waits up to the flush timeout for
    /// confirmation. Returns the message id.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        headers: Headers,
    ) -> Result<String, ProducerError> {
        self.publish_with_timeout(topic, payload, headers, self.flush_timeout)
            .await
    }

    /// Like `publish`, with an explicit bound on the confirmation wait.
    ///
    /// `id`, `timestamp` and `attempts=0` are filled in when the caller did
    /// not supply them. An `id` already present is kept, so a republished
    /// record keeps its identity.
    pub async fn publish_with_timeout(
        &self,
        topic: &str,
        payload: Vec<u8>,
        headers: Headers,
        timeout: Duration,
    ) -> Result<String, ProducerError> {
        let message_id = headers
            .message_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut merged = Headers::new()
            .with(TIMESTAMP, self.clock.epoch_seconds())
            .with(ATTEMPTS, 0);
        merged.extend(headers);
        merged.insert(ID, &message_id);

        let payload_size = payload.len();
        let record = OutboundRecord::new(topic, payload, merged);

        let pending = self.handle.produce(record).map_err(|source| {
            error!(topic, error = %source, payload_size, "failed to push message");
            ProducerError::Enqueue {
                topic: topic.to_string(),
                source,
            }
        })?;

        match pending.wait(timeout).await {
            Ok(delivered) => {
                debug!(
                    topic,
                    message_id = %message_id,
                    partition = delivered.partition,
                    offset = delivered.offset,
                    payload_size,
                    "message pushed"
                );
                Ok(message_id)
            }
            Err(err) => {
                let err = delivery_error(topic, timeout, err);
                error!(topic, message_id = %message_id, error = %err, payload_size, "failed to push message");
                Err(err)
            }
        }
    }
}

fn delivery_error(topic: &str, timeout: Duration, err: DeliveryError) -> ProducerError {
    let topic = topic.to_string();
    match err {
        DeliveryError::TimedOut => ProducerError::DeliveryTimedOut {
            topic,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
        DeliveryError::Rejected(status) => ProducerError::DeliveryRejected {
            topic,
            code: status.code,
            reason: format!("{}: {}", status.code.describe(), status.message),
        },
        DeliveryError::Abandoned => ProducerError::DeliveryAbandoned { topic },
    }
}
