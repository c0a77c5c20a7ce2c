//! # PopQueue
//!
//! `popqueue` gives a partitioned, append-only log broker the shape of a job
//! queue: push and pop, retries counted in record headers, delayed jobs and a
//! dead-letter topic for jobs that keep failing.
//!
//! ## Core Modules
//!
//! - `queue`: push/pop, delay filtering and the dead-letter decision.
//! - `job`: the unit handed out by `pop`, with `release`, `delete` and `fire`,
//!   plus the task registry.
//! - `producer`: publishing with bounded delivery confirmation.
//! - `connection`: settings validation, broker client configuration and
//!   certificate files.
//! - `broker`: the traits the queue talks to and the bundled in-process broker.
//! - `persistence`: optional `sled` storage for the bundled broker.
//! - `worker`: a poll loop that fires jobs until a limit is reached.
//! - `config`: loading settings from files and the environment.
//! - `message`: record headers and the JSON payload envelope.
//! - `clock`: the injectable time source.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod clock;
pub mod config;
pub mod connection;
pub mod job;
pub mod message;
pub mod persistence;
pub mod producer;
pub mod queue;
pub mod utils;
pub mod worker;

pub use connection::{connect, connect_with_clock};
pub use job::{Job, NamedTask, Task, TaskRegistry};
pub use queue::{Queue, QueueOptions};
pub use utils::error::{JobError, ProducerError, QueueError, Result};
pub use worker::{Worker, WorkerOptions, WorkerSummary};
