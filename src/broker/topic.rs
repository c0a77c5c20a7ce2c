//! Topic management
//!
//! A `Topic` is a fixed set of append-only partitions. Offsets are the index
//! of a record inside its partition and are handed out on append. Records
//! appended without an explicit partition are spread round-robin.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the
//! in-memory broker keeps every topic behind its state lock).

use crate::broker::{BrokerCode, BrokerStatus, Offset, Partition, Record};
use crate::message::Headers;

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    partitions: Vec<Vec<Record>>,
    next_partition: usize,
}

impl Topic {
    /// Create a topic with `partitions` empty partitions (at least one).
    pub fn new(name: &str, partitions: u32) -> Self {
        Self {
            name: name.to_string(),
            partitions: (0..partitions.max(1)).map(|_| Vec::new()).collect(),
            next_partition: 0,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition_ids(&self) -> impl Iterator<Item = Partition> + '_ {
        (0..self.partitions.len()).map(|p| p as Partition)
    }

    /// Append to the end of a partition and return the stored record.
    pub fn append(
        &mut self,
        partition: Option<Partition>,
        payload: Vec<u8>,
        headers: Headers,
        timestamp: i64,
    ) -> Result<Record, BrokerStatus> {
        let index = match partition {
            Some(p) if p >= 0 && (p as usize) < self.partitions.len() => p as usize,
            Some(p) => {
                return Err(BrokerStatus::new(
                    BrokerCode::UNKNOWN_TOPIC_OR_PARTITION,
                    format!("topic `{}` has no partition {p}", self.name),
                ));
            }
            None => {
                let chosen = self.next_partition % self.partitions.len();
                self.next_partition = self.next_partition.wrapping_add(1);
                chosen
            }
        };

        let log = &mut self.partitions[index];
        let record = Record {
            topic: self.name.clone(),
            partition: index as Partition,
            offset: log.len() as Offset,
            payload,
            headers,
            timestamp,
        };
        log.push(record.clone());
        Ok(record)
    }

    /// Put back a record loaded from storage. Records must arrive in offset
    /// order per partition; gaps and duplicates are ignored.
    pub fn restore(&mut self, record: Record) {
        let index = record.partition.max(0) as usize;
        while self.partitions.len() <= index {
            self.partitions.push(Vec::new());
        }
        let log = &mut self.partitions[index];
        if record.offset == log.len() as Offset {
            log.push(record);
        }
    }

    pub fn get(&self, partition: Partition, offset: Offset) -> Option<&Record> {
        if partition < 0 || offset < 0 {
            return None;
        }
        self.partitions
            .get(partition as usize)
            .and_then(|log| log.get(offset as usize))
    }

    /// Offset the next appended record in `partition` will receive.
    pub fn log_end(&self, partition: Partition) -> Offset {
        if partition < 0 {
            return 0;
        }
        self.partitions
            .get(partition as usize)
            .map(|log| log.len() as Offset)
            .unwrap_or(0)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.partitions.iter().flatten()
    }
}
