//! The `persistence` module keeps the local broker's log on disk.
//!
//! Every appended record and every committed consumer-group offset is
//! written to an embedded `sled` database, so a `MemoryBroker` opened on the
//! same directory picks up where the previous process stopped.

pub mod sled_store;

pub use sled_store::LogStore;

#[cfg(test)]
mod tests;
