//! Persistence layer backed by `sled`
//!
//! Layout:
//! - one tree per topic, named `topic:<name>`; keys are the partition
//!   (4 bytes, big endian) followed by the offset (8 bytes, big endian) so a
//!   scan yields each partition in offset order
//! - an `offsets` tree keyed `<group>\0<topic>\0<partition>` holding the
//!   committed offset as 8 big-endian bytes

use std::path::Path;

use sled::Db;

use crate::broker::{BrokerError, Offset, Partition, Record};

const TOPIC_TREE_PREFIX: &str = "topic:";
const OFFSETS_TREE: &str = "offsets";

/// A committed offset as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOffset {
    pub group: String,
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
}

#[derive(Clone)]
pub struct LogStore {
    db: Db,
}

impl LogStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BrokerError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn append(&self, record: &Record) -> Result<(), BrokerError> {
        let tree = self
            .db
            .open_tree(format!("{TOPIC_TREE_PREFIX}{}", record.topic))?;
        let serialized = serde_json::to_vec(record)?;
        tree.insert(record_key(record.partition, record.offset), serialized)?;
        Ok(())
    }

    /// All stored records, grouped by topic and in offset order per partition.
    pub fn load_records(&self) -> Result<Vec<Record>, BrokerError> {
        let mut records = Vec::new();
        for name in self.db.tree_names() {
            if !name.starts_with(TOPIC_TREE_PREFIX.as_bytes()) {
                continue;
            }
            let tree = self.db.open_tree(&name)?;
            for entry in tree.iter() {
                let (_, value) = entry?;
                records.push(serde_json::from_slice(&value)?);
            }
        }
        Ok(records)
    }

    pub fn store_offset(
        &self,
        group: &str,
        topic: &str,
        partition: Partition,
        offset: Offset,
    ) -> Result<(), BrokerError> {
        let tree = self.db.open_tree(OFFSETS_TREE)?;
        tree.insert(offset_key(group, topic, partition), offset.to_be_bytes().to_vec())?;
        Ok(())
    }

    /// Every committed offset. A key or value that does not parse fails the
    /// whole load.
    pub fn load_offsets(&self) -> Result<Vec<StoredOffset>, BrokerError> {
        let tree = self.db.open_tree(OFFSETS_TREE)?;
        let mut offsets = Vec::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            offsets.push(parse_offset_entry(&key, &value)?);
        }
        Ok(offsets)
    }

    pub fn flush(&self) -> Result<(), BrokerError> {
        self.db.flush()?;
        Ok(())
    }
}

fn record_key(partition: Partition, offset: Offset) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&partition.to_be_bytes());
    key.extend_from_slice(&offset.to_be_bytes());
    key
}

fn offset_key(group: &str, topic: &str, partition: Partition) -> Vec<u8> {
    format!("{group}\0{topic}\0{partition}").into_bytes()
}

fn parse_offset_entry(key: &[u8], value: &[u8]) -> Result<StoredOffset, BrokerError> {
    let corrupt = |what: &str| {
        BrokerError::Corrupt(format!(
            "{what} in offsets entry `{}`",
            String::from_utf8_lossy(key).replace('\0', "/")
        ))
    };

    let text = std::str::from_utf8(key).map_err(|_| corrupt("non-utf8 key"))?;
    let mut parts = text.split('\0');
    let (Some(group), Some(topic), Some(partition), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(corrupt("malformed key"));
    };
    let partition = partition
        .parse::<Partition>()
        .map_err(|_| corrupt("unreadable partition"))?;
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| corrupt("offset is not 8 bytes"))?;

    Ok(StoredOffset {
        group: group.to_string(),
        topic: topic.to_string(),
        partition,
        offset: Offset::from_be_bytes(bytes),
    })
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
