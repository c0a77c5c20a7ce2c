//! Broker seam
//!
//! The queue never talks to a concrete broker client. It goes through the
//! traits below, which mirror what a partitioned log broker offers:
//! - a producer that accepts a record and later reports delivery
//! - a consumer bound to one group that polls one record at a time and
//!   commits or rewinds positions
//! - a transport that builds both from a `ClientConfig`
//!
//! `MemoryBroker` implements all three in-process and backs the tests and the
//! bundled binary.
//!
//! Handles are not meant to be shared between workers: one consumer belongs
//! to one polling loop. They are `Send + Sync` only so they can live behind an
//! `Arc` inside a single worker's queue and job values.

pub mod codes;
pub mod config;
pub mod memory;
pub mod topic;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::message::Headers;

pub use codes::{BrokerCode, BrokerStatus};
pub use config::ClientConfig;
pub use memory::MemoryBroker;

pub type Partition = i32;
pub type Offset = i64;

/// A record as read back from the log. `partition` and `offset` are assigned
/// by the broker and never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
    pub payload: Vec<u8>,
    pub headers: Headers,
    /// Milliseconds since UNIX epoch, set by the broker on append.
    pub timestamp: i64,
}

impl Record {
    pub fn position(&self) -> Position {
        Position {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
}

/// A record on its way to the broker. `partition: None` lets the broker pick.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    pub partition: Option<Partition>,
    pub payload: Vec<u8>,
    pub headers: Headers,
}

impl OutboundRecord {
    pub fn new(topic: &str, payload: Vec<u8>, headers: Headers) -> Self {
        Self {
            topic: topic.to_string(),
            partition: None,
            payload,
            headers,
        }
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Message(Record),
    PartitionEof { topic: String, partition: Partition },
    TimedOut,
    /// The broker answered the poll with an error status.
    Error(BrokerStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
}

pub type DeliveryReport = Result<Delivered, BrokerStatus>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    TimedOut,
    Rejected(BrokerStatus),
    /// The report channel closed without an answer.
    Abandoned,
}

/// Delivery confirmation for one produced record.
#[derive(Debug)]
pub struct PendingDelivery {
    report: oneshot::Receiver<DeliveryReport>,
}

impl PendingDelivery {
    pub fn channel() -> (oneshot::Sender<DeliveryReport>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { report: rx })
    }

    /// A delivery whose outcome is already known.
    pub fn ready(report: DeliveryReport) -> Self {
        let (tx, pending) = Self::channel();
        let _ = tx.send(report);
        pending
    }

    /// Waits at most `timeout` for the broker to confirm.
    pub async fn wait(self, timeout: Duration) -> Result<Delivered, DeliveryError> {
        match tokio::time::timeout(timeout, self.report).await {
            Err(_) => Err(DeliveryError::TimedOut),
            Ok(Err(_)) => Err(DeliveryError::Abandoned),
            Ok(Ok(Err(status))) => Err(DeliveryError::Rejected(status)),
            Ok(Ok(Ok(delivered))) => Ok(delivered),
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{0}")]
    Status(BrokerStatus),

    #[error("log storage failure: {0}")]
    Storage(#[from] sled::Error),

    #[error("log storage encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("corrupt log entry: {0}")]
    Corrupt(String),
}

impl BrokerError {
    pub fn status(code: BrokerCode, message: impl Into<String>) -> Self {
        BrokerError::Status(BrokerStatus::new(code, message))
    }
}

pub trait BrokerProducer: Send + Sync + Debug {
    /// Hands a record to the broker client. Returning `Ok` only means the
    /// record was accepted for sending; confirmation comes from the
    /// returned `PendingDelivery`.
    fn produce(&self, record: OutboundRecord) -> Result<PendingDelivery, BrokerError>;
}

#[async_trait]
pub trait BrokerConsumer: Send + Sync + Debug {
    /// Replaces the current subscription.
    fn subscribe(&self, topics: &[String]) -> Result<(), BrokerError>;

    fn subscription(&self) -> Result<Vec<String>, BrokerError>;

    /// Returns one outcome within `timeout`.
    async fn poll(&self, timeout: Duration) -> Result<PollOutcome, BrokerError>;

    /// Marks everything up to and including `position` as consumed for the group.
    fn commit(&self, position: &Position) -> Result<(), BrokerError>;

    /// Moves the fetch position so `position` is returned again by a later poll.
    fn seek(&self, position: &Position) -> Result<(), BrokerError>;
}

pub trait Transport: Send + Sync {
    fn create_producer(&self, config: &ClientConfig)
    -> Result<Arc<dyn BrokerProducer>, BrokerError>;

    fn create_consumer(&self, config: &ClientConfig)
    -> Result<Arc<dyn BrokerConsumer>, BrokerError>;
}

#[cfg(test)]
mod tests;
