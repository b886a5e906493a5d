//! Record operations that kick off enrichment.

use uuid::Uuid;

use crate::db::{PoetryStore, StoreError};
use crate::models::poetry::{NewPoetry, PoetryPatch, PoetryRecord};
use crate::services::enrichment::{EnrichmentError, EnrichmentPipeline};

/// Insert a poem, then queue verification and, when no images were
/// supplied, artwork generation. Never waits for either.
pub async fn create_poetry(
    store: &dyn PoetryStore,
    enrichment: &EnrichmentPipeline,
    new: NewPoetry,
) -> Result<PoetryRecord, StoreError> {
    let record = store.insert_poetry(new).await?;
    tracing::info!(
        poetry_id = %record.id,
        images = record.images.len(),
        "Poem created"
    );

    log_schedule_failure(record.id, enrichment.schedule_verify(record.id));
    if record.images.is_empty() {
        log_schedule_failure(record.id, enrichment.schedule_generate_image(record.id));
    }
    Ok(record)
}

/// Apply a user edit. A content change re-queues verification; an image
/// change is settled by the patch itself and never triggers generation.
pub async fn update_poetry(
    store: &dyn PoetryStore,
    enrichment: &EnrichmentPipeline,
    id: Uuid,
    patch: PoetryPatch,
) -> Result<Option<PoetryRecord>, StoreError> {
    let content_changed = patch.content.is_some();
    let Some(record) = store.update_poetry(id, patch).await? else {
        return Ok(None);
    };
    tracing::info!(poetry_id = %id, content_changed, "Poem updated");

    if content_changed {
        log_schedule_failure(id, enrichment.schedule_verify(id));
    }
    Ok(Some(record))
}

fn log_schedule_failure(poetry_id: Uuid, result: Result<(), EnrichmentError>) {
    if let Err(e) = result {
        tracing::warn!(
            poetry_id = %poetry_id,
            error = %e,
            "Could not queue enrichment, status stays pending until retried"
        );
    }
}
