//! Background AI enrichment of poems.
//!
//! Each poem gets two independent workflows: text verification and artwork
//! generation. Each workflow owns one status column and writes only its own
//! fields, so neither can clobber the other or a concurrent user edit.
//! A run only starts by moving its status from `pending` to `processing`,
//! so a settled record is untouched until a retry or edit resets it.
//! Terminal writes are compare-and-set against `processing`; a run whose
//! status was reset underneath it ends as [`WorkflowOutcome::Superseded`].

mod artwork;
mod single_flight;
mod verify;
mod worker;

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::config::EnrichmentConfig;
use crate::db::{PoetryStore, StoreError};
use crate::models::enrichment::{
    EnrichmentJob, EnrichmentStatus, ImageWrite, VerifyWrite, WorkflowKind, WorkflowOutcome,
    WriteOutcome,
};
use crate::models::poetry::{ImageGenStatus, VerifyStatus};
use crate::services::ai_gateway::{AiError, AiGateway};
use crate::services::storage::{ImageStore, StorageError};

use single_flight::InFlight;

pub use worker::{EnrichmentWorker, WorkerReport};

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("poem {0} not found")]
    NotFound(Uuid),

    #[error("enrichment queue is full")]
    QueueFull,

    #[error("enrichment queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] AiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Cheap, clonable handle used by request handlers to schedule and
/// inspect enrichment. Work itself runs on an [`EnrichmentWorker`].
#[derive(Clone)]
pub struct EnrichmentPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn PoetryStore>,
    images: Arc<dyn ImageStore>,
    gateway: AiGateway,
    jobs: mpsc::Sender<EnrichmentJob>,
    in_flight: InFlight,
}

impl EnrichmentPipeline {
    /// Build the handle and the worker that drains its queue.
    pub fn new(
        config: &EnrichmentConfig,
        store: Arc<dyn PoetryStore>,
        images: Arc<dyn ImageStore>,
    ) -> Result<(Self, EnrichmentWorker), AiError> {
        let gateway = AiGateway::new(config)?;
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));

        let pipeline = Self {
            inner: Arc::new(Inner {
                store,
                images,
                gateway,
                jobs: sender,
                in_flight: InFlight::default(),
            }),
        };
        let worker = EnrichmentWorker::new(pipeline.clone(), receiver, config.concurrency.max(1));
        Ok((pipeline, worker))
    }

    /// Queue text verification without waiting for it.
    pub fn schedule_verify(&self, poetry_id: Uuid) -> Result<(), EnrichmentError> {
        self.schedule(EnrichmentJob::verify(poetry_id))
    }

    /// Queue artwork generation without waiting for it.
    pub fn schedule_generate_image(&self, poetry_id: Uuid) -> Result<(), EnrichmentError> {
        self.schedule(EnrichmentJob::generate_image(poetry_id))
    }

    fn schedule(&self, job: EnrichmentJob) -> Result<(), EnrichmentError> {
        match self.inner.jobs.try_send(job) {
            Ok(()) => {
                metrics::counter!("enrichment_jobs_total", "workflow" => job.kind.label())
                    .increment(1);
                self.report_queue_depth();
                tracing::debug!(
                    poetry_id = %job.poetry_id,
                    workflow = %job.kind,
                    "Enrichment job queued"
                );
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(EnrichmentError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(EnrichmentError::QueueClosed),
        }
    }

    /// Reset verification to `pending` and queue it again.
    pub async fn retry_verify(&self, poetry_id: Uuid) -> Result<(), EnrichmentError> {
        let reset = VerifyWrite::status(VerifyStatus::Pending);
        if self.inner.store.apply_enrichment(poetry_id, reset.into()).await?
            == WriteOutcome::Missing
        {
            return Err(EnrichmentError::NotFound(poetry_id));
        }
        tracing::info!(poetry_id = %poetry_id, "Verification retry requested");
        self.schedule_verify(poetry_id)
    }

    /// Reset artwork generation to `pending` and queue it again.
    pub async fn retry_generate_image(&self, poetry_id: Uuid) -> Result<(), EnrichmentError> {
        let reset = ImageWrite::status(ImageGenStatus::Pending);
        if self.inner.store.apply_enrichment(poetry_id, reset.into()).await?
            == WriteOutcome::Missing
        {
            return Err(EnrichmentError::NotFound(poetry_id));
        }
        tracing::info!(poetry_id = %poetry_id, "Image generation retry requested");
        self.schedule_generate_image(poetry_id)
    }

    /// Current status of both workflows for a poem.
    pub async fn enrichment_status(
        &self,
        poetry_id: Uuid,
    ) -> Result<Option<EnrichmentStatus>, StoreError> {
        let record = self.inner.store.find_poetry(poetry_id).await?;
        Ok(record.as_ref().map(EnrichmentStatus::from))
    }

    /// Run text verification to completion on the calling task.
    pub async fn verify(&self, poetry_id: Uuid) -> Result<WorkflowOutcome, StoreError> {
        self.run(EnrichmentJob::verify(poetry_id)).await
    }

    /// Run artwork generation to completion on the calling task.
    pub async fn generate_image(&self, poetry_id: Uuid) -> Result<WorkflowOutcome, StoreError> {
        self.run(EnrichmentJob::generate_image(poetry_id)).await
    }

    /// Run one job under the single-flight guard.
    ///
    /// A request that arrives while the same job is running returns
    /// [`WorkflowOutcome::Coalesced`] and makes the running one go again
    /// once it finishes. The re-run does work only if a retry or edit reset
    /// the status to `pending` meanwhile.
    pub async fn run(&self, job: EnrichmentJob) -> Result<WorkflowOutcome, StoreError> {
        let Some(mut claim) = self.inner.in_flight.claim(job) else {
            tracing::debug!(
                poetry_id = %job.poetry_id,
                workflow = %job.kind,
                "Job already running, coalesced into a re-run"
            );
            return Ok(WorkflowOutcome::Coalesced);
        };

        let mut outcome = self.execute(job).await?;
        loop {
            if !claim.rerun_requested() {
                return Ok(outcome);
            }
            tracing::debug!(
                poetry_id = %job.poetry_id,
                workflow = %job.kind,
                "Re-running after a coalesced request"
            );
            // A re-run that finds nothing pending leaves the earlier result standing.
            match self.execute(job).await? {
                WorkflowOutcome::Superseded => {}
                rerun => outcome = rerun,
            }
        }
    }

    async fn execute(&self, job: EnrichmentJob) -> Result<WorkflowOutcome, StoreError> {
        let started = Instant::now();
        let outcome = match job.kind {
            WorkflowKind::Verify => verify::run(&self.inner, job.poetry_id).await,
            WorkflowKind::GenerateImage => artwork::run(&self.inner, job.poetry_id).await,
        }?;

        let workflow = job.kind.label();
        metrics::histogram!("enrichment_processing_seconds", "workflow" => workflow)
            .record(started.elapsed().as_secs_f64());
        match outcome {
            WorkflowOutcome::Completed => {
                metrics::counter!("enrichment_jobs_completed", "workflow" => workflow).increment(1)
            }
            WorkflowOutcome::Failed => {
                metrics::counter!("enrichment_jobs_failed", "workflow" => workflow).increment(1)
            }
            WorkflowOutcome::Skipped => {
                metrics::counter!("enrichment_jobs_skipped", "workflow" => workflow).increment(1)
            }
            _ => {}
        }

        tracing::info!(
            poetry_id = %job.poetry_id,
            workflow = %job.kind,
            outcome = %outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Enrichment job finished"
        );
        Ok(outcome)
    }

    fn report_queue_depth(&self) {
        let jobs = &self.inner.jobs;
        let depth = jobs.max_capacity().saturating_sub(jobs.capacity());
        metrics::gauge!("enrichment_queue_depth").set(depth as f64);
    }
}

/// Map the result of a terminal write to the workflow outcome.
fn settle(write: WriteOutcome, applied: WorkflowOutcome) -> WorkflowOutcome {
    match write {
        WriteOutcome::Applied => applied,
        WriteOutcome::Conflict => WorkflowOutcome::Superseded,
        WriteOutcome::Missing => WorkflowOutcome::Missing,
    }
}
