//! Fan-out scheduler
//!
//! Starts one worker per source, all sharing one output channel, waits for
//! every worker to end and only then lets go of its own sender so the channel
//! closes exactly once. The first error to arrive is kept, later ones are
//! logged and dropped.

use crate::coordinate::{ParseOptions, TaggedCoordinate};
use crate::{HarvestError, Result, Source, worker};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::Sender;
use tokio::task::{Id, JoinSet};

/// What the scheduler does with the other workers once one of them fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailurePolicy {
    /// Let every worker run to completion or to its own failure
    #[default]
    CollectFirst,
    /// Abort the remaining workers on the first failure
    CancelRemaining,
}

/// Write-once cell holding the first error of a run
#[derive(Debug, Default)]
pub struct FirstError {
    cell: OnceLock<HarvestError>,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` if no error was recorded yet. Returns whether it was kept.
    pub fn record(&self, error: HarvestError) -> bool {
        match self.cell.set(error) {
            Ok(()) => true,
            Err(discarded) => {
                tracing::debug!(error = %discarded, "discarding later worker error");
                false
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn into_result(self) -> Result<()> {
        match self.cell.into_inner() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Run one worker per source as tokio tasks.
///
/// `output` is held until every worker task has ended, so the receiver sees
/// the channel close only after the last coordinate of the last worker.
pub async fn run_all(
    sources: Vec<Source>,
    output: Sender<TaggedCoordinate>,
    policy: FailurePolicy,
    options: ParseOptions,
) -> Result<()> {
    let mut workers = JoinSet::new();
    let mut keys = HashMap::new();

    for source in sources {
        let tx = output.clone();
        let key = source.key().to_string();
        let handle = workers.spawn(async move { worker::run(&source, &tx, &options).await });
        keys.insert(handle.id(), key);
    }
    tracing::debug!(workers = keys.len(), "dispatched workers");

    let outcome = join_workers(workers, &keys, policy).await;
    drop(output);
    outcome
}

/// Wait for every task in `workers`, keeping the first failure.
///
/// A task that panicked is reported as [`HarvestError::WorkerAborted`] under
/// the key registered for its task id.
async fn join_workers(
    mut workers: JoinSet<Result<usize>>,
    keys: &HashMap<Id, String>,
    policy: FailurePolicy,
) -> Result<()> {
    let first_error = FirstError::new();
    while let Some(joined) = workers.join_next_with_id().await {
        let outcome = match joined {
            Ok((_, outcome)) => outcome.map(|_| ()),
            Err(join_error) if join_error.is_cancelled() => continue,
            Err(join_error) => Err(HarvestError::WorkerAborted {
                key: keys.get(&join_error.id()).cloned().unwrap_or_default(),
            }),
        };

        if let Err(error) = outcome {
            tracing::debug!(source = error.source_key(), error = %error, "worker failed");
            if first_error.record(error) && policy == FailurePolicy::CancelRemaining {
                tracing::debug!("cancelling remaining workers");
                workers.abort_all();
            }
        }
    }
    first_error.into_result()
}

/// Run one worker per source on the rayon pool, blocking until all have ended.
///
/// Must not be called from inside the pool the workers run on, and the
/// receiver must be drained on another thread.
pub fn run_all_blocking(
    sources: Vec<Source>,
    output: std::sync::mpsc::SyncSender<TaggedCoordinate>,
    policy: FailurePolicy,
    options: ParseOptions,
) -> Result<()> {
    let first_error = FirstError::new();
    let cancelled = AtomicBool::new(false);

    rayon::scope(|scope| {
        for source in &sources {
            let tx = output.clone();
            let first_error = &first_error;
            let cancelled = &cancelled;
            let options = &options;
            scope.spawn(move |_| {
                supervise(source.key(), first_error, cancelled, policy, || {
                    worker::run_blocking(source, &tx, options, cancelled)
                });
            });
        }
    });

    drop(output);
    first_error.into_result()
}

/// Run one blocking job, recording its failure (or panic) under `key`.
///
/// The first recorded failure raises `cancelled` when the policy asks for it.
fn supervise<F>(
    key: &str,
    first_error: &FirstError,
    cancelled: &AtomicBool,
    policy: FailurePolicy,
    job: F,
) where
    F: FnOnce() -> Result<usize>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
        Err(HarvestError::WorkerAborted {
            key: key.to_string(),
        })
    });

    if let Err(error) = outcome {
        tracing::debug!(source = error.source_key(), error = %error, "worker failed");
        if first_error.record(error) && policy == FailurePolicy::CancelRemaining {
            cancelled.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn route(key: &str, points: usize) -> Source {
        let mut body = String::from("<kml><Document>");
        for i in 0..points {
            body.push_str(&format!(
                "<Placemark><Point><coordinates>{i}.0,{i}.5</coordinates></Point></Placemark>"
            ));
        }
        body.push_str("</Document></kml>");
        Source::from_bytes(key, body.into_bytes())
    }

    fn broken(key: &str) -> Source {
        Source::from_bytes(key, b"<kml><Document>".to_vec())
    }

    #[test]
    fn test_first_error_is_write_once() {
        let cell = FirstError::new();
        assert!(!cell.is_set());
        assert!(cell.record(HarvestError::DuplicateSource("a".into())));
        assert!(!cell.record(HarvestError::DuplicateSource("b".into())));
        let error = cell.into_result().unwrap_err();
        assert_eq!(error.source_key(), "a");
    }

    #[test]
    fn test_first_error_empty_is_ok() {
        assert!(FirstError::new().into_result().is_ok());
    }

    #[tokio::test]
    async fn test_all_workers_complete() {
        let (tx, mut rx) = mpsc::channel(1);
        let sources = vec![route("a", 3), route("b", 5)];
        let scheduler = tokio::spawn(run_all(
            sources,
            tx,
            FailurePolicy::CollectFirst,
            ParseOptions::default(),
        ));

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 8);
        assert!(scheduler.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_others() {
        let (tx, mut rx) = mpsc::channel(1);
        let sources = vec![route("a", 4), broken("bad"), route("b", 6)];
        let scheduler = tokio::spawn(run_all(
            sources,
            tx,
            FailurePolicy::CollectFirst,
            ParseOptions::default(),
        ));

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 10);
        let error = scheduler.await.unwrap().unwrap_err();
        assert_eq!(error.source_key(), "bad");
    }

    #[tokio::test]
    async fn test_only_one_error_reported() {
        let (tx, mut rx) = mpsc::channel(1);
        let sources = vec![broken("x"), broken("y")];
        let scheduler = tokio::spawn(run_all(
            sources,
            tx,
            FailurePolicy::CollectFirst,
            ParseOptions::default(),
        ));

        assert!(rx.recv().await.is_none());
        let error = scheduler.await.unwrap().unwrap_err();
        assert!(error.source_key() == "x" || error.source_key() == "y");
    }

    #[tokio::test]
    async fn test_collect_first_waits_for_blocked_workers() {
        // Nobody drains the channel: healthy workers block on send forever
        let (tx, _rx) = mpsc::channel(1);
        let sources = vec![route("a", 5), broken("bad"), route("b", 5)];
        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            run_all(sources, tx, FailurePolicy::CollectFirst, ParseOptions::default()),
        )
        .await;
        assert!(outcome.is_err(), "scheduler must wait for every worker");
    }

    #[tokio::test]
    async fn test_cancel_remaining_aborts_blocked_workers() {
        let (tx, _rx) = mpsc::channel(1);
        let sources = vec![route("a", 5), broken("bad"), route("b", 5)];
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run_all(sources, tx, FailurePolicy::CancelRemaining, ParseOptions::default()),
        )
        .await
        .expect("cancelled workers must not keep the scheduler alive");
        assert_eq!(outcome.unwrap_err().source_key(), "bad");
    }

    #[test]
    fn test_blocking_collects_first_error() {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let sources = vec![route("a", 4), broken("bad"), route("b", 6)];
        let coordinator = std::thread::spawn(move || {
            run_all_blocking(sources, tx, FailurePolicy::CollectFirst, ParseOptions::default())
        });

        assert_eq!(rx.iter().count(), 10);
        let error = coordinator.join().unwrap().unwrap_err();
        assert_eq!(error.source_key(), "bad");
    }

    #[test]
    fn test_blocking_cancel_cuts_a_long_path() {
        let tuples: Vec<String> = (0..1000).map(|i| format!("{i}.0,1.0")).collect();
        let big = Source::from_bytes(
            "big",
            format!(
                "<kml><Placemark><LineString><coordinates>{}</coordinates></LineString></Placemark></kml>",
                tuples.join(" ")
            )
            .into_bytes(),
        );
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let sources = vec![broken("bad"), big];
        let coordinator = std::thread::spawn(move || {
            run_all_blocking(sources, tx, FailurePolicy::CancelRemaining, ParseOptions::default())
        });

        // Let the broken worker fail while the big one is stuck on a full channel
        std::thread::sleep(Duration::from_millis(200));
        let received = rx.iter().count();
        let error = coordinator.join().unwrap().unwrap_err();
        assert_eq!(error.source_key(), "bad");
        assert!(received < 10, "received {received} coordinates after cancel");
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported_with_its_key() {
        let mut workers: JoinSet<Result<usize>> = JoinSet::new();
        let mut keys = HashMap::new();
        let handle = workers.spawn(async { panic!("worker blew up") });
        keys.insert(handle.id(), "exploding.kml".to_string());
        let handle = workers.spawn(async { Ok(3) });
        keys.insert(handle.id(), "fine.kml".to_string());

        let error = join_workers(workers, &keys, FailurePolicy::CollectFirst)
            .await
            .unwrap_err();
        assert!(matches!(error, HarvestError::WorkerAborted { ref key } if key == "exploding.kml"));
    }

    #[test]
    fn test_panicking_job_is_reported_with_its_key() {
        let first_error = FirstError::new();
        let cancelled = AtomicBool::new(false);

        rayon::scope(|scope| {
            scope.spawn(|_| {
                let policy = FailurePolicy::CancelRemaining;
                supervise("exploding.kml", &first_error, &cancelled, policy, || {
                    panic!("worker blew up")
                });
            });
        });

        assert!(cancelled.load(Ordering::Relaxed));
        let error = first_error.into_result().unwrap_err();
        assert!(matches!(error, HarvestError::WorkerAborted { ref key } if key == "exploding.kml"));
    }

    #[test]
    fn test_job_panic_keeps_earlier_error() {
        let first_error = FirstError::new();
        let cancelled = AtomicBool::new(false);
        let policy = FailurePolicy::CollectFirst;
        supervise("bad.kml", &first_error, &cancelled, policy, || {
            Err(HarvestError::ChannelClosed {
                key: "bad.kml".to_string(),
            })
        });
        supervise("exploding.kml", &first_error, &cancelled, policy, || {
            panic!("worker blew up")
        });

        assert!(!cancelled.load(Ordering::Relaxed));
        assert_eq!(first_error.into_result().unwrap_err().source_key(), "bad.kml");
    }
}
