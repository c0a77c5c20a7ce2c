//! Worker loop
//!
//! Pops jobs from one topic and fires them against a `TaskRegistry` until a
//! limit is reached or the shutdown future completes. Failed jobs are
//! released with the configured backoff, so a job that keeps failing climbs
//! towards the dead-letter threshold through the normal `pop` path.
//!
//! Shutdown is checked between pops and during idle sleeps, never while a
//! `pop` or a job is in flight, so a dead-letter forward and its commit are
//! not split by a stop request. A stop takes effect within
//! `consume_timeout_ms` plus the running job.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::WorkerSettings;
use crate::job::TaskRegistry;
use crate::queue::Queue;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOptions {
    /// Idle wait after a pop that returned no job.
    pub sleep: Duration,
    /// Stop after this many jobs (processed or failed). 0 means no limit.
    pub max_jobs: u64,
    pub max_time: Option<Duration>,
    pub stop_when_empty: bool,
    /// Release delay, in seconds, for failed jobs.
    pub backoff: u64,
}

impl From<&WorkerSettings> for WorkerOptions {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            sleep: Duration::from_secs(settings.sleep),
            max_jobs: settings.max_jobs,
            max_time: (settings.max_time > 0).then(|| Duration::from_secs(settings.max_time)),
            stop_when_empty: settings.stop_when_empty,
            backoff: settings.backoff,
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&WorkerSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxJobs,
    MaxTime,
    Empty,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub processed: u64,
    pub failed: u64,
    pub stopped: StopReason,
}

#[derive(Debug, Clone, Default)]
pub struct Worker {
    options: WorkerOptions,
}

impl Worker {
    pub fn new(options: WorkerOptions) -> Self {
        Self { options }
    }

    /// Runs until a limit from the options is reached.
    pub async fn run(
        &self,
        queue: &Queue,
        topic: Option<&str>,
        registry: &TaskRegistry,
    ) -> WorkerSummary {
        self.run_until(queue, topic, registry, std::future::pending())
            .await
    }

    /// Runs until a limit is reached or `shutdown` completes. A job that is
    /// already firing is allowed to finish.
    pub async fn run_until<F>(
        &self,
        queue: &Queue,
        topic: Option<&str>,
        registry: &TaskRegistry,
        shutdown: F,
    ) -> WorkerSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let started = Instant::now();
        let mut processed = 0;
        let mut failed = 0;
        let topic_name = topic.unwrap_or(&queue.options().default_topic).to_string();

        info!(topic = %topic_name, "worker started");

        let stopped = loop {
            if self.options.max_jobs > 0 && processed + failed >= self.options.max_jobs {
                break StopReason::MaxJobs;
            }
            if let Some(max_time) = self.options.max_time {
                if started.elapsed() >= max_time {
                    break StopReason::MaxTime;
                }
            }

            if Self::shutdown_requested(&mut shutdown).await {
                break StopReason::Shutdown;
            }

            match queue.pop(topic).await {
                Ok(Some(mut job)) => match job.fire(registry).await {
                    Ok(()) => processed += 1,
                    Err(_) => {
                        failed += 1;
                        job.release(self.options.backoff).await;
                    }
                },
                Ok(None) => {
                    if self.options.stop_when_empty {
                        break StopReason::Empty;
                    }
                    if self.idle(&mut shutdown).await {
                        break StopReason::Shutdown;
                    }
                }
                Err(e) => {
                    warn!(topic = %topic_name, error = %e, "pop failed, backing off");
                    if self.idle(&mut shutdown).await {
                        break StopReason::Shutdown;
                    }
                }
            }
        };

        info!(
            topic = %topic_name,
            processed,
            failed,
            stopped = ?stopped,
            "worker stopped"
        );

        WorkerSummary {
            processed,
            failed,
            stopped,
        }
    }

    async fn shutdown_requested<F>(shutdown: &mut std::pin::Pin<&mut F>) -> bool
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown.as_mut() => true,
            _ = std::future::ready(()) => false,
        }
    }

    /// Sleeps for the idle interval. Returns true if shutdown fired first.
    async fn idle<F>(&self, shutdown: &mut std::pin::Pin<&mut F>) -> bool
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown.as_mut() => true,
            _ = tokio::time::sleep(self.options.sleep) => false,
        }
    }
}
