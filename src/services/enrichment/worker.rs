use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};

use super::EnrichmentPipeline;
use crate::db::StoreError;
use crate::models::enrichment::{EnrichmentJob, WorkflowOutcome};

type JobResult = (EnrichmentJob, Result<WorkflowOutcome, StoreError>);

/// Drains the enrichment queue, running up to `concurrency` jobs at once.
pub struct EnrichmentWorker {
    pipeline: EnrichmentPipeline,
    jobs: mpsc::Receiver<EnrichmentJob>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

/// Tally of what a worker did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Missing, superseded or coalesced runs.
    pub discarded: u64,
    /// Runs aborted by a store error.
    pub errored: u64,
    pub panicked: u64,
}

impl WorkerReport {
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.skipped + self.discarded + self.errored + self.panicked
    }

    fn record(&mut self, joined: Result<JobResult, JoinError>) {
        match joined {
            Ok((_, Ok(WorkflowOutcome::Completed))) => self.completed += 1,
            Ok((_, Ok(WorkflowOutcome::Failed))) => self.failed += 1,
            Ok((_, Ok(WorkflowOutcome::Skipped))) => self.skipped += 1,
            Ok((_, Ok(_))) => self.discarded += 1,
            Ok((job, Err(e))) => {
                self.errored += 1;
                tracing::error!(
                    poetry_id = %job.poetry_id,
                    workflow = %job.kind,
                    error = %e,
                    "Enrichment job aborted by store error"
                );
            }
            Err(e) => {
                self.panicked += 1;
                tracing::error!(error = %e, "Enrichment task panicked");
            }
        }
    }
}

impl EnrichmentWorker {
    pub(super) fn new(
        pipeline: EnrichmentPipeline,
        jobs: mpsc::Receiver<EnrichmentJob>,
        concurrency: usize,
    ) -> Self {
        Self {
            pipeline,
            jobs,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// Process jobs until `shutdown` resolves, then finish everything
    /// already queued or running and return a report.
    ///
    /// A failing or panicking job never takes the worker down.
    pub async fn run<F>(mut self, shutdown: F) -> WorkerReport
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!(concurrency = self.concurrency, "Enrichment worker started");
        let mut tasks = JoinSet::new();
        let mut report = WorkerReport::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested, draining enrichment queue");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => report.record(joined),
                job = self.jobs.recv() => match job {
                    Some(job) => self.spawn(&mut tasks, job).await,
                    None => break,
                },
            }
        }

        // Refuse new work but keep what was already accepted.
        self.jobs.close();
        while let Some(job) = self.jobs.recv().await {
            self.spawn(&mut tasks, job).await;
        }
        while let Some(joined) = tasks.join_next().await {
            report.record(joined);
        }

        metrics::gauge!("enrichment_queue_depth").set(0.0);
        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            discarded = report.discarded,
            errored = report.errored,
            panicked = report.panicked,
            "Enrichment worker stopped"
        );
        report
    }

    async fn spawn(&self, tasks: &mut JoinSet<JobResult>, job: EnrichmentJob) {
        // The semaphore is never closed.
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return;
        };
        metrics::gauge!("enrichment_queue_depth").set(self.jobs.len() as f64);

        let pipeline = self.pipeline.clone();
        tasks.spawn(async move {
            let _permit = permit;
            (job, pipeline.run(job).await)
        });
    }
}
