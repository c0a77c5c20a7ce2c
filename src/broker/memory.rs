//! In-process log broker
//!
//! This module contains the bundled broker implementation responsible for:
//! - keeping partitioned, append-only topics (auto-created on first use)
//! - handing out offsets on append and confirming deliveries
//! - tracking committed offsets per consumer group
//! - serving one record per poll to each consumer, with bounded waiting for
//!   new data
//! - optionally persisting the log and group offsets via `LogStore`
//!
//! Concurrency and usage notes:
//! - All state lives behind one lock shared by every producer and consumer
//!   created from the same `MemoryBroker`; the lock is never held across an
//!   await point.
//! - With `enable.auto.commit`, fetch positions are committed at the next
//!   poll only while `enable.auto.offset.store` is on (the default). With
//!   the store off, only explicit `commit` calls move the group offset.
//! - Consumers in the same group do not split partitions between
//!   themselves. Each consumer reads every subscribed partition starting at
//!   the group's committed offset, which is enough for one worker per group.
//! - Fault injection hooks (`fail_next_poll`, `reject_next_delivery`, ...)
//!   let tests reproduce broker errors deterministically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, warn};

use crate::broker::topic::Topic;
use crate::broker::{
    BrokerCode, BrokerConsumer, BrokerError, BrokerProducer, BrokerStatus, ClientConfig,
    Delivered, DeliveryReport, Offset, OutboundRecord, Partition, PendingDelivery, PollOutcome,
    Position, Record, Transport,
};
use crate::config::BrokerSettings;
use crate::persistence::LogStore;

type PartitionKey = (String, Partition);

#[derive(Debug, Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BrokerState>,
    arrivals: Notify,
    persistence: Option<LogStore>,
    partitions: u32,
    max_message_bytes: usize,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
    committed: HashMap<String, HashMap<PartitionKey, Offset>>,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    poll_errors: VecDeque<BrokerStatus>,
    poll_transport_faults: VecDeque<String>,
    produce_faults: VecDeque<String>,
    delivery_rejections: VecDeque<BrokerStatus>,
    hold_deliveries: bool,
    held: Vec<oneshot::Sender<DeliveryReport>>,
}

impl MemoryBroker {
    pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1_048_576;

    pub fn new() -> Self {
        Self::with_options(1, Self::DEFAULT_MAX_MESSAGE_BYTES, None)
    }

    /// Topics created by this broker get `partitions` partitions each.
    pub fn with_partitions(partitions: u32) -> Self {
        Self::with_options(partitions, Self::DEFAULT_MAX_MESSAGE_BYTES, None)
    }

    /// Restore a broker from `store` and keep writing to it.
    pub fn open(store: LogStore, partitions: u32) -> Result<Self, BrokerError> {
        Self::open_with_limit(store, partitions, Self::DEFAULT_MAX_MESSAGE_BYTES)
    }

    pub fn from_settings(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        match &settings.data_dir {
            Some(dir) => Self::open_with_limit(
                LogStore::open(dir)?,
                settings.partitions,
                settings.max_message_bytes,
            ),
            None => Ok(Self::with_options(
                settings.partitions,
                settings.max_message_bytes,
                None,
            )),
        }
    }

    /// Records larger than `max_message_bytes` are rejected with
    /// `MESSAGE_TOO_LARGE`.
    pub fn with_limits(partitions: u32, max_message_bytes: usize) -> Self {
        Self::with_options(partitions, max_message_bytes, None)
    }

    fn open_with_limit(
        store: LogStore,
        partitions: u32,
        max_message_bytes: usize,
    ) -> Result<Self, BrokerError> {
        let mut state = BrokerState::default();

        for record in store.load_records()? {
            state
                .topics
                .entry(record.topic.clone())
                .or_insert_with(|| Topic::new(&record.topic, partitions))
                .restore(record);
        }
        for stored in store.load_offsets()? {
            state
                .committed
                .entry(stored.group)
                .or_default()
                .insert((stored.topic, stored.partition), stored.offset);
        }

        let broker = Self::with_options(partitions, max_message_bytes, Some(store));
        *broker.shared.lock_state() = state;
        Ok(broker)
    }

    fn with_options(
        partitions: u32,
        max_message_bytes: usize,
        persistence: Option<LogStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                arrivals: Notify::new(),
                persistence,
                partitions: partitions.max(1),
                max_message_bytes,
            }),
        }
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.shared.lock_state().topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every record in `topic`, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.shared
            .lock_state()
            .topics
            .get(topic)
            .map(|t| t.records().cloned().collect())
            .unwrap_or_default()
    }

    pub fn committed_offset(&self, group: &str, topic: &str, partition: Partition) -> Option<Offset> {
        self.shared
            .lock_state()
            .committed
            .get(group)
            .and_then(|offsets| offsets.get(&(topic.to_string(), partition)))
            .copied()
    }

    /// Flush the on-disk log, if any.
    pub fn flush(&self) -> Result<(), BrokerError> {
        match &self.shared.persistence {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }

    /// The next poll by any consumer answers with this error status.
    pub fn fail_next_poll(&self, status: BrokerStatus) {
        self.shared.lock_state().faults.poll_errors.push_back(status);
    }

    /// The next poll by any consumer fails at the transport level.
    pub fn break_next_poll(&self, reason: &str) {
        self.shared
            .lock_state()
            .faults
            .poll_transport_faults
            .push_back(reason.to_string());
    }

    /// The next produce call is refused before anything is appended.
    pub fn refuse_next_produce(&self, reason: &str) {
        self.shared
            .lock_state()
            .faults
            .produce_faults
            .push_back(reason.to_string());
    }

    /// The next produced record is not appended and its delivery report
    /// carries `status`.
    pub fn reject_next_delivery(&self, status: BrokerStatus) {
        self.shared
            .lock_state()
            .faults
            .delivery_rejections
            .push_back(status);
    }

    /// While held, records are appended but their delivery is never
    /// confirmed, so producers waiting on confirmation time out.
    pub fn hold_deliveries(&self, hold: bool) {
        let mut state = self.shared.lock_state();
        state.faults.hold_deliveries = hold;
        if !hold {
            state.faults.held.clear();
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn store_offset(&self, group: &str, key: &PartitionKey, offset: Offset) {
        if let Some(store) = &self.persistence {
            if let Err(e) = store.store_offset(group, &key.0, key.1, offset) {
                warn!(group, topic = %key.0, partition = key.1, error = %e, "failed to persist committed offset");
            }
        }
    }
}

impl BrokerState {
    fn topic_mut(&mut self, name: &str, partitions: u32) -> &mut Topic {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| Topic::new(name, partitions))
    }
}

impl Transport for MemoryBroker {
    fn create_producer(
        &self,
        config: &ClientConfig,
    ) -> Result<Arc<dyn BrokerProducer>, BrokerError> {
        require_bootstrap(config)?;
        Ok(Arc::new(MemoryProducer {
            shared: self.shared.clone(),
            client_id: config.get("client.id").unwrap_or("popqueue").to_string(),
        }))
    }

    fn create_consumer(
        &self,
        config: &ClientConfig,
    ) -> Result<Arc<dyn BrokerConsumer>, BrokerError> {
        require_bootstrap(config)?;

        let group_id = match config.get("group.id") {
            Some(group) if !group.trim().is_empty() => group.to_string(),
            _ => {
                return Err(BrokerError::status(
                    BrokerCode::INVALID_GROUP_ID,
                    "consumer requires a non-empty group.id",
                ));
            }
        };

        let reset = match config.get("auto.offset.reset").unwrap_or("earliest") {
            "earliest" | "smallest" | "beginning" => Reset::Earliest,
            "latest" | "largest" | "end" => Reset::Latest,
            other => {
                return Err(BrokerError::Transport(format!(
                    "unsupported auto.offset.reset `{other}`"
                )));
            }
        };

        Ok(Arc::new(MemoryConsumer {
            shared: self.shared.clone(),
            group_id,
            reset,
            auto_commit: config.get_bool("enable.auto.commit").unwrap_or(true)
                && config.get_bool("enable.auto.offset.store").unwrap_or(true),
            partition_eof: config.get_bool("enable.partition.eof").unwrap_or(false),
            session: Mutex::new(Session::default()),
        }))
    }
}

fn require_bootstrap(config: &ClientConfig) -> Result<(), BrokerError> {
    match config.get("bootstrap.servers") {
        Some(servers) if !servers.trim().is_empty() => Ok(()),
        _ => Err(BrokerError::status(
            BrokerCode::TRANSPORT,
            "no bootstrap.servers configured",
        )),
    }
}

#[derive(Debug)]
pub struct MemoryProducer {
    shared: Arc<Shared>,
    client_id: String,
}

impl BrokerProducer for MemoryProducer {
    fn produce(&self, record: OutboundRecord) -> Result<PendingDelivery, BrokerError> {
        let mut state = self.shared.lock_state();

        if let Some(reason) = state.faults.produce_faults.pop_front() {
            return Err(BrokerError::Transport(reason));
        }

        if record.payload.len() > self.shared.max_message_bytes {
            return Ok(PendingDelivery::ready(Err(BrokerStatus::new(
                BrokerCode::MESSAGE_TOO_LARGE,
                format!(
                    "message of {} bytes exceeds the {} byte limit",
                    record.payload.len(),
                    self.shared.max_message_bytes
                ),
            ))));
        }

        if let Some(status) = state.faults.delivery_rejections.pop_front() {
            return Ok(PendingDelivery::ready(Err(status)));
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        let partitions = self.shared.partitions;
        let appended = match state.topic_mut(&record.topic, partitions).append(
            record.partition,
            record.payload,
            record.headers,
            timestamp,
        ) {
            Ok(appended) => appended,
            Err(status) => return Ok(PendingDelivery::ready(Err(status))),
        };

        if let Some(store) = &self.shared.persistence {
            if let Err(e) = store.append(&appended) {
                return Ok(PendingDelivery::ready(Err(BrokerStatus::new(
                    BrokerCode::UNKNOWN,
                    format!("failed to persist record: {e}"),
                ))));
            }
        }

        debug!(
            client_id = %self.client_id,
            topic = %appended.topic,
            partition = appended.partition,
            offset = appended.offset,
            "record appended"
        );

        let delivered = Delivered {
            topic: appended.topic,
            partition: appended.partition,
            offset: appended.offset,
        };
        let (tx, pending) = PendingDelivery::channel();
        if state.faults.hold_deliveries {
            state.faults.held.push(tx);
        } else {
            let _ = tx.send(Ok(delivered));
        }
        drop(state);

        self.shared.arrivals.notify_waiters();
        Ok(pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reset {
    Earliest,
    Latest,
}

#[derive(Debug, Default)]
struct Session {
    subscription: Vec<String>,
    positions: HashMap<PartitionKey, Offset>,
    eof_reported: HashSet<PartitionKey>,
    cursor: usize,
}

#[derive(Debug)]
pub struct MemoryConsumer {
    shared: Arc<Shared>,
    group_id: String,
    reset: Reset,
    auto_commit: bool,
    partition_eof: bool,
    session: Mutex<Session>,
}

impl MemoryConsumer {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One non-blocking fetch attempt. `Ok(None)` means nothing to report yet.
    fn try_fetch(&self) -> Result<Option<PollOutcome>, BrokerError> {
        let mut state = self.shared.lock_state();

        if let Some(reason) = state.faults.poll_transport_faults.pop_front() {
            return Err(BrokerError::Transport(reason));
        }
        if let Some(status) = state.faults.poll_errors.pop_front() {
            return Ok(Some(PollOutcome::Error(status)));
        }

        let mut session = self.lock_session();
        if session.subscription.is_empty() {
            return Ok(None);
        }

        if self.auto_commit {
            let group = state.committed.entry(self.group_id.clone()).or_default();
            for (key, position) in &session.positions {
                if group.get(key) != Some(position) {
                    group.insert(key.clone(), *position);
                    self.shared.store_offset(&self.group_id, key, *position);
                }
            }
        }

        let partitions = self.shared.partitions;
        let mut assignments: Vec<PartitionKey> = Vec::new();
        for name in session.subscription.clone() {
            let topic = state.topic_mut(&name, partitions);
            assignments.extend(topic.partition_ids().map(|p| (name.clone(), p)));
        }
        if assignments.is_empty() {
            return Ok(None);
        }

        let count = assignments.len();
        for step in 0..count {
            let index = (session.cursor + step) % count;
            let key = &assignments[index];
            let Some(topic) = state.topics.get(&key.0) else {
                continue;
            };

            let position = match session.positions.get(key) {
                Some(position) => *position,
                None => {
                    let committed = state
                        .committed
                        .get(&self.group_id)
                        .and_then(|offsets| offsets.get(key))
                        .copied();
                    let start = committed.unwrap_or(match self.reset {
                        Reset::Earliest => 0,
                        Reset::Latest => topic.log_end(key.1),
                    });
                    session.positions.insert(key.clone(), start);
                    start
                }
            };

            if let Some(record) = topic.get(key.1, position) {
                let record = record.clone();
                session.positions.insert(key.clone(), position + 1);
                session.eof_reported.remove(key);
                session.cursor = (index + 1) % count;
                return Ok(Some(PollOutcome::Message(record)));
            }
        }

        if self.partition_eof {
            for key in &assignments {
                if session.eof_reported.insert(key.clone()) {
                    return Ok(Some(PollOutcome::PartitionEof {
                        topic: key.0.clone(),
                        partition: key.1,
                    }));
                }
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl BrokerConsumer for MemoryConsumer {
    fn subscribe(&self, topics: &[String]) -> Result<(), BrokerError> {
        {
            let partitions = self.shared.partitions;
            let mut state = self.shared.lock_state();
            for name in topics {
                state.topic_mut(name, partitions);
            }
        }

        let mut session = self.lock_session();
        session.subscription = topics.to_vec();
        session
            .positions
            .retain(|(topic, _), _| topics.contains(topic));
        session.eof_reported.clear();
        session.cursor = 0;
        Ok(())
    }

    fn subscription(&self) -> Result<Vec<String>, BrokerError> {
        Ok(self.lock_session().subscription.clone())
    }

    async fn poll(&self, timeout: Duration) -> Result<PollOutcome, BrokerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before looking so an append between the
            // fetch and the wait still wakes us.
            let notified = self.shared.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.try_fetch()? {
                return Ok(outcome);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(PollOutcome::TimedOut);
            }
        }
    }

    fn commit(&self, position: &Position) -> Result<(), BrokerError> {
        let key = (position.topic.clone(), position.partition);
        let next = position.offset + 1;
        {
            let mut state = self.shared.lock_state();
            state
                .committed
                .entry(self.group_id.clone())
                .or_default()
                .insert(key.clone(), next);
        }
        self.shared.store_offset(&self.group_id, &key, next);
        Ok(())
    }

    fn seek(&self, position: &Position) -> Result<(), BrokerError> {
        let key = (position.topic.clone(), position.partition);
        let mut session = self.lock_session();
        session.eof_reported.remove(&key);
        session.positions.insert(key, position.offset);
        Ok(())
    }
}
