use chrono::Utc;
use uuid::Uuid;

use super::{settle, EnrichmentError, Inner};
use crate::db::StoreError;
use crate::models::enrichment::{ImageWrite, WorkflowOutcome, WriteOutcome};
use crate::models::poetry::{ImageGenStatus, PoetryRecord};
use crate::services::prompts;
use crate::services::storage::generated_image_key;

/// Generate artwork for a poem that has no images.
///
/// User-supplied images always win: the generated reference is only
/// written while `images` is still empty, otherwise it is discarded.
pub(super) async fn run(inner: &Inner, poetry_id: Uuid) -> Result<WorkflowOutcome, StoreError> {
    let Some(poetry) = inner.store.find_poetry(poetry_id).await? else {
        tracing::debug!(poetry_id = %poetry_id, "Poem gone before image generation");
        return Ok(WorkflowOutcome::Missing);
    };

    if !poetry.images.is_empty() {
        tracing::debug!(poetry_id = %poetry_id, "Poem already has images, skipping generation");
        let skip = ImageWrite::from_pending(ImageGenStatus::Skipped);
        let write = inner.store.apply_enrichment(poetry_id, skip.into()).await?;
        return Ok(settle(write, WorkflowOutcome::Skipped));
    }

    match inner.store.apply_enrichment(poetry_id, ImageWrite::claim().into()).await? {
        WriteOutcome::Applied => {}
        WriteOutcome::Conflict => {
            tracing::debug!(poetry_id = %poetry_id, "Image generation not pending, nothing to do");
            return Ok(WorkflowOutcome::Superseded);
        }
        WriteOutcome::Missing => return Ok(WorkflowOutcome::Missing),
    }

    if !inner.gateway.image_enabled() {
        tracing::info!(poetry_id = %poetry_id, "Image generation not configured, skipping");
        let skip = ImageWrite::from_processing(ImageGenStatus::Skipped);
        let write = inner.store.apply_enrichment(poetry_id, skip.into()).await?;
        return Ok(settle(write, WorkflowOutcome::Skipped));
    }

    let reference = match generate_and_store(inner, &poetry).await {
        Ok(reference) => reference,
        Err(e) => {
            tracing::warn!(poetry_id = %poetry_id, error = %e, "Image generation failed");
            let failed = ImageWrite::from_processing(ImageGenStatus::Failed);
            let write = inner.store.apply_enrichment(poetry_id, failed.into()).await?;
            return Ok(settle(write, WorkflowOutcome::Failed));
        }
    };

    let complete = ImageWrite::completed(reference.clone());
    let outcome = settle(
        inner.store.apply_enrichment(poetry_id, complete.into()).await?,
        WorkflowOutcome::Completed,
    );
    if outcome == WorkflowOutcome::Completed {
        tracing::info!(poetry_id = %poetry_id, image = %reference, "Generated image attached");
    } else {
        tracing::info!(
            poetry_id = %poetry_id,
            outcome = %outcome,
            "Generated image not attached, discarding it"
        );
        if let Err(e) = inner.images.delete(&reference).await {
            tracing::warn!(image = %reference, error = %e, "Failed to delete orphaned image");
        }
    }
    Ok(outcome)
}

async fn generate_and_store(
    inner: &Inner,
    poetry: &PoetryRecord,
) -> Result<String, EnrichmentError> {
    let prompt = prompts::illustration_prompt(poetry);
    let url = inner.gateway.generate_image(&prompt).await?;
    let image = inner.gateway.download_image(&url).await?;
    let key = generated_image_key(Utc::now(), image.extension());
    Ok(inner
        .images
        .put(&key, &image.bytes, image.content_type())
        .await?)
}
