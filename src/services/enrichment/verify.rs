use uuid::Uuid;

use super::{settle, Inner};
use crate::db::StoreError;
use crate::models::enrichment::{VerifyWrite, WorkflowOutcome, WriteOutcome};
use crate::services::prompts;

/// Proofread a poem's content against the canonical text.
///
/// On success the corrected text replaces `content` and is kept as
/// `verified_content`; `original_content` is never touched.
pub(super) async fn run(inner: &Inner, poetry_id: Uuid) -> Result<WorkflowOutcome, StoreError> {
    if inner.store.find_poetry(poetry_id).await?.is_none() {
        tracing::debug!(poetry_id = %poetry_id, "Poem gone before verification");
        return Ok(WorkflowOutcome::Missing);
    }

    match inner.store.apply_enrichment(poetry_id, VerifyWrite::claim().into()).await? {
        WriteOutcome::Applied => {}
        WriteOutcome::Conflict => {
            tracing::debug!(poetry_id = %poetry_id, "Verification not pending, nothing to do");
            return Ok(WorkflowOutcome::Superseded);
        }
        WriteOutcome::Missing => return Ok(WorkflowOutcome::Missing),
    }

    // Read after claiming so the prompt sees any edit that landed before it.
    let Some(poetry) = inner.store.find_poetry(poetry_id).await? else {
        return Ok(WorkflowOutcome::Missing);
    };

    let (write, applied) = if !inner.gateway.text_enabled() {
        tracing::info!(
            poetry_id = %poetry_id,
            "Text verification not configured, accepting content as is"
        );
        (
            VerifyWrite::completed(poetry.content.clone(), None),
            WorkflowOutcome::Completed,
        )
    } else {
        let request = prompts::verification_request(&poetry);
        match inner.gateway.complete(&request).await {
            Ok(corrected) => {
                if corrected != poetry.content {
                    tracing::info!(poetry_id = %poetry_id, "Verification corrected poem content");
                }
                (
                    VerifyWrite::completed(corrected.clone(), Some(corrected)),
                    WorkflowOutcome::Completed,
                )
            }
            Err(e) => {
                tracing::warn!(poetry_id = %poetry_id, error = %e, "Verification call failed");
                (VerifyWrite::failed(), WorkflowOutcome::Failed)
            }
        }
    };

    let outcome = settle(inner.store.apply_enrichment(poetry_id, write.into()).await?, applied);
    if outcome == WorkflowOutcome::Superseded {
        tracing::info!(
            poetry_id = %poetry_id,
            "Verification result discarded, status changed while running"
        );
    }
    Ok(outcome)
}
