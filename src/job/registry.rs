//! Task registry
//!
//! Maps the `displayName` of a payload to a function that rebuilds an
//! executable task from the payload's `data`. Applications register every
//! task type they expect to consume up front.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::message::Payload;
use crate::utils::error::JobError;

#[async_trait]
pub trait Task: Send + Sync {
    async fn handle(&self) -> anyhow::Result<()>;
}

/// A task that travels as its own serialized fields under a fixed name.
pub trait NamedTask: Task + Serialize + DeserializeOwned + 'static {
    const NAME: &'static str;
}

type Decoder = Box<dyn Fn(&Value) -> Result<Box<dyn Task>, serde_json::Error> + Send + Sync>;

#[derive(Default)]
pub struct TaskRegistry {
    decoders: HashMap<String, Decoder>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `T::NAME`, decoded from the payload data with serde.
    pub fn register<T: NamedTask>(&mut self) -> &mut Self {
        self.register_with(T::NAME, |data| {
            let task: T = serde_json::from_value(data.clone())?;
            Ok(Box::new(task) as Box<dyn Task>)
        })
    }

    /// Registers a custom decoder under `name`, replacing any previous one.
    pub fn register_with<F>(&mut self, name: &str, decode: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Box<dyn Task>, serde_json::Error> + Send + Sync + 'static,
    {
        self.decoders.insert(name.to_string(), Box::new(decode));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.decoders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn decode(&self, payload: &Payload) -> Result<Box<dyn Task>, JobError> {
        let name = payload.display_name.as_str();
        let decode = self
            .decoders
            .get(name)
            .ok_or_else(|| JobError::UnknownTask(name.to_string()))?;
        decode(&payload.data).map_err(|source| JobError::Decode {
            name: name.to_string(),
            source,
        })
    }

    pub async fn execute(&self, task: &dyn Task) -> Result<(), JobError> {
        task.handle().await.map_err(JobError::Failed)
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}
