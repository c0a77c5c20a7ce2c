//! Error types surfaced by `popqueue`.
//!
//! `QueueError` is the stable taxonomy callers match on. Producer failures
//! keep their own enum so a delivery that timed out can be told apart from
//! one the broker rejected.

use thiserror::Error;

use crate::broker::{BrokerCode, BrokerError};

#[derive(Debug, Error)]
pub enum QueueError {
    /// Missing required field, inconsistent security settings, or a
    /// certificate that could not be materialized. Fatal at startup.
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// The broker client could not be constructed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("producer error: {0}")]
    Producer(#[from] ProducerError),

    /// The broker reported a poll error other than end-of-partition or timeout.
    #[error("consumer error: {reason} (code {code})")]
    Consumer { code: BrokerCode, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// A consumer-side broker failure, keeping the broker's code when it
    /// reported one.
    pub fn consumer(err: BrokerError) -> Self {
        match err {
            BrokerError::Status(status) => QueueError::Consumer {
                code: status.code,
                reason: status.message,
            },
            BrokerError::Transport(reason) => QueueError::Consumer {
                code: BrokerCode::TRANSPORT,
                reason,
            },
            other => QueueError::Consumer {
                code: BrokerCode::UNKNOWN,
                reason: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ProducerError {
    /// The broker handle refused to accept the record at all.
    #[error("failed to enqueue message for topic `{topic}`: {source}")]
    Enqueue {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("delivery to topic `{topic}` not confirmed within {timeout_ms}ms")]
    DeliveryTimedOut { topic: String, timeout_ms: u64 },

    #[error("delivery to topic `{topic}` rejected: {reason}")]
    DeliveryRejected {
        topic: String,
        code: BrokerCode,
        reason: String,
    },

    /// The broker dropped the delivery report without answering.
    #[error("delivery report for topic `{topic}` was abandoned")]
    DeliveryAbandoned { topic: String },
}

impl ProducerError {
    pub fn topic(&self) -> &str {
        match self {
            ProducerError::Enqueue { topic, .. }
            | ProducerError::DeliveryTimedOut { topic, .. }
            | ProducerError::DeliveryRejected { topic, .. }
            | ProducerError::DeliveryAbandoned { topic } => topic,
        }
    }
}

/// Failure to resolve or run the task carried by a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no task registered under `{0}`")]
    UnknownTask(String),

    #[error("failed to decode arguments for `{name}`: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("task failed: {0}")]
    Failed(#[from] anyhow::Error),

    #[error("job already finished")]
    AlreadyFinished,

    /// The task ran but the job could not be acknowledged.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, QueueError>;
