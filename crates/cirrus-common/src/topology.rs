//! Bounded pipeline scheduling.
//!
//! Runs many self-contained pipelines on the tokio runtime with at most
//! `total_concurrency` of them in flight. Pipelines beyond the bound wait for
//! a permit. What happens on failure is decided by the [`FailurePolicy`].

use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;

use snafu::Snafu;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{FailurePolicy, GlobalConfig};

/// A self-contained pipeline unit that can be executed.
///
/// Implement this trait for your specific pipeline type. The runner handles
/// spawning, concurrency limiting and result collection.
pub trait Pipeline: Send + 'static {
    /// The key type used to identify this pipeline.
    type Key: Clone + Display + fmt::Debug + Send + 'static;

    /// The value produced by a successful run.
    type Output: Send + 'static;

    /// The error type returned by this pipeline.
    type Error: std::error::Error + Send + 'static;

    /// Get a reference to the pipeline's key.
    fn key(&self) -> &Self::Key;

    /// Run this pipeline to completion.
    fn run(self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Outcome of a run in which no failure aborted the scheduler.
#[derive(Debug)]
pub struct RunReport<K, O, E> {
    /// Pipelines that finished successfully, in completion order.
    pub completed: Vec<(K, O)>,
    /// Pipelines that failed (only populated under `FailurePolicy::Continue`).
    pub failed: Vec<(K, E)>,
    /// Panic messages of pipeline tasks that panicked.
    pub panicked: Vec<String>,
}

impl<K, O, E> Default for RunReport<K, O, E> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            panicked: Vec::new(),
        }
    }
}

impl<K, O, E> RunReport<K, O, E> {
    /// Returns true if every pipeline completed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.panicked.is_empty()
    }
}

/// Error returned when a failure aborted the run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError<K, E>
where
    K: Display + fmt::Debug,
    E: std::error::Error + 'static,
{
    /// A pipeline failed and the remaining pipelines were aborted.
    #[snafu(display("{key} failed ({aborted} aborted): {source}"))]
    Failed {
        key: K,
        source: E,
        /// Number of pipelines that were cancelled or never started.
        aborted: usize,
    },
    /// A pipeline task panicked and the remaining pipelines were aborted.
    #[snafu(display("task panicked ({aborted} aborted): {message}"))]
    Panicked { message: String, aborted: usize },
}

impl<K, E> RunError<K, E>
where
    K: Display + fmt::Debug,
    E: std::error::Error + 'static,
{
    /// Key of the pipeline that triggered the abort, if any.
    pub fn key(&self) -> Option<&K> {
        match self {
            Self::Failed { key, .. } => Some(key),
            Self::Panicked { .. } => None,
        }
    }
}

/// Orchestrates pipeline executions under one global concurrency bound.
pub struct PipelineRunner<P: Pipeline> {
    pipelines: Vec<P>,
    total_concurrency: usize,
    failure_policy: FailurePolicy,
    typetag: &'static str,
}

type Joined<P> = (
    <P as Pipeline>::Key,
    Option<Result<<P as Pipeline>::Output, <P as Pipeline>::Error>>,
);

impl<P: Pipeline> PipelineRunner<P> {
    /// Create a new pipeline runner.
    pub fn new(pipelines: Vec<P>, global: &GlobalConfig, typetag: &'static str) -> Self {
        Self {
            pipelines,
            total_concurrency: global.total_concurrency.max(1),
            failure_policy: global.failure_policy,
            typetag,
        }
    }

    /// Run all pipelines to completion, or until one fails under
    /// `FailurePolicy::Abort`.
    #[allow(clippy::type_complexity)]
    pub async fn run(self) -> Result<RunReport<P::Key, P::Output, P::Error>, RunError<P::Key, P::Error>> {
        let typetag = self.typetag;
        let semaphore = Arc::new(Semaphore::new(self.total_concurrency));
        let mut handles: JoinSet<Joined<P>> = JoinSet::new();

        for pipeline in self.pipelines {
            let semaphore = semaphore.clone();
            let key = pipeline.key().clone();

            handles.spawn(async move {
                // A closed semaphore means the run was aborted while queued
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (key, None);
                };
                let result = pipeline.run().await;
                (key, Some(result))
            });
        }

        info!(
            total_concurrency = self.total_concurrency,
            "Spawned {} {} tasks",
            handles.len(),
            typetag
        );

        let mut report = RunReport::default();
        while let Some(joined) = handles.join_next().await {
            match joined {
                Ok((key, Some(Ok(output)))) => {
                    info!(target = %key, "{} completed", typetag);
                    report.completed.push((key, output));
                }
                Ok((key, Some(Err(e)))) => {
                    error!(target = %key, error = %e, "{} failed", typetag);
                    if self.failure_policy == FailurePolicy::Abort {
                        let aborted = abort_remaining::<P>(&semaphore, &mut handles, typetag).await;
                        return Err(RunError::Failed {
                            key,
                            source: e,
                            aborted,
                        });
                    }
                    report.failed.push((key, e));
                }
                Ok((_, None)) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    let message = e.to_string();
                    error!(error = %message, "{} task panicked", typetag);
                    if self.failure_policy == FailurePolicy::Abort {
                        let aborted = abort_remaining::<P>(&semaphore, &mut handles, typetag).await;
                        return Err(RunError::Panicked { message, aborted });
                    }
                    report.panicked.push(message);
                }
            }
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "All {}s complete",
            typetag
        );
        Ok(report)
    }
}

/// Cancel everything still queued or running and wait for the tasks to wind down.
///
/// Returns the number of pipelines that did not get to finish.
async fn abort_remaining<P: Pipeline>(
    semaphore: &Semaphore,
    handles: &mut JoinSet<Joined<P>>,
    typetag: &'static str,
) -> usize {
    semaphore.close();
    handles.abort_all();

    let mut aborted = 0;
    while let Some(joined) = handles.join_next().await {
        match joined {
            Ok((_, Some(_))) => {}
            Ok((_, None)) => aborted += 1,
            Err(_) => aborted += 1,
        }
    }

    if aborted > 0 {
        warn!(aborted, "Aborted remaining {}s", typetag);
    }
    aborted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestError(&'static str);

    impl Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for TestError {}

    enum Behavior {
        Succeed,
        Fail,
        Hang,
    }

    struct TestPipeline {
        key: String,
        behavior: Behavior,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Pipeline for TestPipeline {
        type Key = String;
        type Output = usize;
        type Error = TestError;

        fn key(&self) -> &String {
            &self.key
        }

        async fn run(self) -> Result<usize, TestError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let result = match self.behavior {
                Behavior::Succeed => Ok(self.key.len()),
                Behavior::Fail => Err(TestError("boom")),
                Behavior::Hang => std::future::pending().await,
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn pipelines(behaviors: Vec<Behavior>) -> (Vec<TestPipeline>, Arc<AtomicUsize>) {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pipelines = behaviors
            .into_iter()
            .enumerate()
            .map(|(i, behavior)| TestPipeline {
                key: format!("pipeline-{i}"),
                behavior,
                in_flight: in_flight.clone(),
                peak: peak.clone(),
            })
            .collect();
        (pipelines, peak)
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_respected() {
        let (pipelines, peak) = pipelines((0..10).map(|_| Behavior::Succeed).collect());
        let runner = PipelineRunner::new(pipelines, &GlobalConfig::with_concurrency(3), "test");

        let report = runner.run().await.unwrap();

        assert_eq!(report.completed.len(), 10);
        assert!(report.is_success());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_abort_policy_cancels_siblings() {
        let (pipelines, _) = pipelines(vec![Behavior::Hang, Behavior::Fail, Behavior::Hang]);
        let runner = PipelineRunner::new(pipelines, &GlobalConfig::with_concurrency(2), "test");

        let err = runner.run().await.unwrap_err();

        assert_eq!(err.key().map(String::as_str), Some("pipeline-1"));
        match err {
            RunError::Failed { aborted, .. } => assert_eq!(aborted, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_continue_policy_collects_failures() {
        let (pipelines, _) = pipelines(vec![Behavior::Succeed, Behavior::Fail, Behavior::Succeed]);
        let global = GlobalConfig {
            total_concurrency: 2,
            failure_policy: FailurePolicy::Continue,
        };

        let report = PipelineRunner::new(pipelines, &global, "test").run().await.unwrap();

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "pipeline-1");
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let (pipelines, _) = pipelines(vec![Behavior::Succeed]);
        let runner = PipelineRunner::new(pipelines, &GlobalConfig::with_concurrency(0), "test");
        assert_eq!(runner.run().await.unwrap().completed.len(), 1);
    }

    #[test]
    fn test_run_error_display() {
        let err: RunError<String, TestError> = RunError::Failed {
            key: "aws_s3_buckets".to_string(),
            source: TestError("denied"),
            aborted: 3,
        };
        assert_eq!(err.to_string(), "aws_s3_buckets failed (3 aborted): denied");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("denied"));
        assert_eq!(err.key().map(String::as_str), Some("aws_s3_buckets"));
    }

    #[test]
    fn test_panicked_has_no_source() {
        let err: RunError<String, TestError> = RunError::Panicked {
            message: "task 7 panicked".to_string(),
            aborted: 0,
        };
        assert_eq!(err.to_string(), "task panicked (0 aborted): task 7 panicked");
        assert!(std::error::Error::source(&err).is_none());
        assert!(err.key().is_none());
    }
}
