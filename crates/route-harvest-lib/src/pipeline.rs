//! Pipeline - top-level entry point wiring scheduler, workers and aggregator
//!
//! `Idle -> Running -> Draining -> Done`. Workers are dispatched, the
//! aggregator drains the shared channel while they run, and the run is done
//! once the channel has closed and the scheduler has reported its outcome.

use crate::aggregator::{AggregationResult, Aggregator, SourceSummary};
use crate::coordinate::{ParseOptions, TaggedCoordinate};
use crate::scheduler::{self, FailurePolicy};
use crate::{HarvestError, Result, Source};
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use tokio::runtime::{Handle, RuntimeFlavor};

/// How workers are executed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Executor {
    /// Tokio tasks feeding a `tokio::sync::mpsc` channel
    #[default]
    Tokio,
    /// Rayon pool threads feeding a `std::sync::mpsc::sync_channel`
    ThreadPool,
}

/// Configuration for a pipeline run
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Capacity of the shared channel. Workers wait while it is full.
    /// Default: 1
    pub channel_capacity: NonZeroUsize,
    /// What happens to the other workers when one fails
    pub failure_policy: FailurePolicy,
    pub executor: Executor,
    pub parse: ParseOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_capacity: NonZeroUsize::MIN,
            failure_policy: FailurePolicy::default(),
            executor: Executor::default(),
            parse: ParseOptions::default(),
        }
    }
}

/// Lifecycle of one pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of a pipeline run
///
/// The grouping is always present, even when a worker failed: it holds
/// everything that reached the aggregator.
#[derive(Debug)]
pub struct PipelineReport {
    pub result: AggregationResult,
    /// First worker error, if any
    pub error: Option<HarvestError>,
}

impl PipelineReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn summary(&self) -> Vec<SourceSummary> {
        self.result.summaries()
    }
}

/// A configured set of sources ready to be harvested
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    sources: Vec<Source>,
    state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline over `sources`. Source keys must be unique.
    pub fn new(config: Config, sources: Vec<Source>) -> Result<Self> {
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.key()) {
                return Err(HarvestError::DuplicateSource(source.key().to_string()));
            }
        }

        Ok(Self {
            config,
            sources,
            state: PipelineState::Idle,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Run with the configured executor and no per-coordinate observer
    pub async fn run(self) -> PipelineReport {
        self.run_with(|_| {}).await
    }

    /// Run with the configured executor, showing every coordinate to
    /// `observer` as it arrives.
    ///
    /// With [`Executor::ThreadPool`] the draining happens on the current
    /// thread. On a multi-thread runtime it is moved out of the worker first
    /// with [`tokio::task::block_in_place`], so other tasks keep running.
    pub async fn run_with<F>(self, observer: F) -> PipelineReport
    where
        F: FnMut(&TaggedCoordinate),
    {
        match self.config.executor {
            Executor::Tokio => self.run_tokio(observer).await,
            Executor::ThreadPool if on_multi_thread_runtime() => {
                tokio::task::block_in_place(|| self.run_blocking(observer))
            }
            Executor::ThreadPool => self.run_blocking(observer),
        }
    }

    async fn run_tokio<F>(mut self, observer: F) -> PipelineReport
    where
        F: FnMut(&TaggedCoordinate),
    {
        let keys = self.keys();
        let (tx, mut rx) = tokio::sync::mpsc::channel(self.config.channel_capacity.get());

        self.transition(PipelineState::Running);
        let scheduler = tokio::spawn(scheduler::run_all(
            std::mem::take(&mut self.sources),
            tx,
            self.config.failure_policy,
            self.config.parse,
        ));

        self.transition(PipelineState::Draining);
        let result = Aggregator::new(keys).drain(&mut rx, observer).await;

        let error = match scheduler.await {
            Ok(outcome) => outcome.err(),
            Err(join_error) => {
                tracing::error!(error = %join_error, "scheduler task failed");
                Some(HarvestError::WorkerAborted {
                    key: String::from("<scheduler>"),
                })
            }
        };
        self.finish(result, error)
    }

    /// Run on the rayon pool, draining on the calling thread.
    ///
    /// Blocks until every worker has ended.
    pub fn run_blocking<F>(mut self, observer: F) -> PipelineReport
    where
        F: FnMut(&TaggedCoordinate),
    {
        let keys = self.keys();
        let (tx, rx) = std::sync::mpsc::sync_channel(self.config.channel_capacity.get());

        self.transition(PipelineState::Running);
        let sources = std::mem::take(&mut self.sources);
        let policy = self.config.failure_policy;
        let options = self.config.parse;
        let coordinator = std::thread::Builder::new()
            .name("harvest-scheduler".to_string())
            .spawn(move || scheduler::run_all_blocking(sources, tx, policy, options));

        let coordinator = match coordinator {
            Ok(handle) => handle,
            Err(error) => {
                tracing::error!(error = %error, "failed to start scheduler thread");
                let result = Aggregator::new(keys).finish();
                return self.finish(
                    result,
                    Some(HarvestError::Io {
                        key: String::from("<scheduler>"),
                        error,
                    }),
                );
            }
        };

        self.transition(PipelineState::Draining);
        let result = Aggregator::new(keys).drain_blocking(rx, observer);

        let error = match coordinator.join() {
            Ok(outcome) => outcome.err(),
            Err(_) => Some(HarvestError::WorkerAborted {
                key: String::from("<scheduler>"),
            }),
        };
        self.finish(result, error)
    }

    fn keys(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|source| source.key().to_string())
            .collect()
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }

    fn finish(mut self, result: AggregationResult, error: Option<HarvestError>) -> PipelineReport {
        self.transition(PipelineState::Done);
        match &error {
            Some(error) => tracing::info!(
                sources = result.len(),
                coordinates = result.total_coordinates(),
                error = %error,
                "harvest finished with error"
            ),
            None => tracing::info!(
                sources = result.len(),
                coordinates = result.total_coordinates(),
                "harvest finished"
            ),
        }
        PipelineReport { result, error }
    }
}

fn on_multi_thread_runtime() -> bool {
    Handle::try_current().is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
}
