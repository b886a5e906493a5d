use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use super::poetry::{ImageGenStatus, PoetryRecord, VerifyStatus};

/// The two independent background workflows run for every poem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowKind {
    Verify,
    GenerateImage,
}

/// Unit of work accepted by the enrichment queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnrichmentJob {
    pub poetry_id: Uuid,
    pub kind: WorkflowKind,
}

impl WorkflowKind {
    /// Static label for metrics.
    pub fn label(self) -> &'static str {
        match self {
            WorkflowKind::Verify => "verify",
            WorkflowKind::GenerateImage => "generate_image",
        }
    }
}

impl EnrichmentJob {
    pub fn verify(poetry_id: Uuid) -> Self {
        Self {
            poetry_id,
            kind: WorkflowKind::Verify,
        }
    }

    pub fn generate_image(poetry_id: Uuid) -> Self {
        Self {
            poetry_id,
            kind: WorkflowKind::GenerateImage,
        }
    }
}

/// How a single workflow run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowOutcome {
    Completed,
    Failed,
    Skipped,
    /// The record was deleted before or during the run.
    Missing,
    /// Another writer moved the status on while the gateway call was in flight.
    Superseded,
    /// An identical run was already in flight; it will run once more.
    Coalesced,
}

/// Polling view over a poem's enrichment progress.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentStatus {
    pub verify_status: VerifyStatus,
    pub image_gen_status: ImageGenStatus,
    pub has_verified_content: bool,
    pub has_ai_image: bool,
}

impl From<&PoetryRecord> for EnrichmentStatus {
    fn from(record: &PoetryRecord) -> Self {
        Self {
            verify_status: record.verify_status,
            image_gen_status: record.image_gen_status,
            has_verified_content: record
                .verified_content
                .as_deref()
                .is_some_and(|c| !c.is_empty()),
            has_ai_image: record
                .ai_generated_image
                .as_deref()
                .is_some_and(|i| !i.is_empty()),
        }
    }
}

/// Field-level write owned by the verify workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyWrite {
    /// Only apply when `verify_status` currently equals this value.
    pub expected: Option<VerifyStatus>,
    pub status: VerifyStatus,
    pub verified_content: Option<String>,
    pub content: Option<String>,
}

impl VerifyWrite {
    pub fn status(status: VerifyStatus) -> Self {
        Self {
            expected: None,
            status,
            verified_content: None,
            content: None,
        }
    }

    /// Move `pending` to `processing`. Any other status means the record
    /// is already being verified or settled and needs a retry first.
    pub fn claim() -> Self {
        Self {
            expected: Some(VerifyStatus::Pending),
            ..Self::status(VerifyStatus::Processing)
        }
    }

    pub fn completed(verified_content: String, content: Option<String>) -> Self {
        Self {
            expected: Some(VerifyStatus::Processing),
            status: VerifyStatus::Completed,
            verified_content: Some(verified_content),
            content,
        }
    }

    pub fn failed() -> Self {
        Self {
            expected: Some(VerifyStatus::Processing),
            ..Self::status(VerifyStatus::Failed)
        }
    }
}

/// Field-level write owned by the image workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageWrite {
    /// Only apply when `image_gen_status` currently equals this value.
    pub expected: Option<ImageGenStatus>,
    /// Only apply while the poem has no images.
    pub require_no_images: bool,
    pub status: ImageGenStatus,
    /// Becomes both `ai_generated_image` and the sole entry of `images`.
    pub generated_image: Option<String>,
}

impl ImageWrite {
    pub fn status(status: ImageGenStatus) -> Self {
        Self {
            expected: None,
            require_no_images: false,
            status,
            generated_image: None,
        }
    }

    pub fn claim() -> Self {
        Self::from_pending(ImageGenStatus::Processing)
    }

    pub fn from_pending(status: ImageGenStatus) -> Self {
        Self {
            expected: Some(ImageGenStatus::Pending),
            ..Self::status(status)
        }
    }

    pub fn from_processing(status: ImageGenStatus) -> Self {
        Self {
            expected: Some(ImageGenStatus::Processing),
            ..Self::status(status)
        }
    }

    pub fn completed(reference: String) -> Self {
        Self {
            expected: Some(ImageGenStatus::Processing),
            require_no_images: true,
            status: ImageGenStatus::Completed,
            generated_image: Some(reference),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentWrite {
    Verify(VerifyWrite),
    Image(ImageWrite),
}

impl From<VerifyWrite> for EnrichmentWrite {
    fn from(write: VerifyWrite) -> Self {
        EnrichmentWrite::Verify(write)
    }
}

impl From<ImageWrite> for EnrichmentWrite {
    fn from(write: ImageWrite) -> Self {
        EnrichmentWrite::Image(write)
    }
}

/// Result of a targeted partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The row exists but its precondition no longer holds.
    Conflict,
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_writes_require_processing() {
        assert_eq!(VerifyWrite::failed().expected, Some(VerifyStatus::Processing));
        let done = ImageWrite::completed("/uploads/ai-generated/x.png".into());
        assert_eq!(done.expected, Some(ImageGenStatus::Processing));
        assert!(done.require_no_images);
        assert_eq!(VerifyWrite::status(VerifyStatus::Pending).expected, None);
    }

    #[test]
    fn claims_only_start_from_pending() {
        let claim = VerifyWrite::claim();
        assert_eq!(claim.expected, Some(VerifyStatus::Pending));
        assert_eq!(claim.status, VerifyStatus::Processing);
        assert!(claim.content.is_none());

        let claim = ImageWrite::claim();
        assert_eq!(claim.expected, Some(ImageGenStatus::Pending));
        assert_eq!(claim.status, ImageGenStatus::Processing);
        assert!(!claim.require_no_images);
    }

    #[test]
    fn workflow_kinds_render_snake_case() {
        assert_eq!(WorkflowKind::GenerateImage.to_string(), "generate_image");
        assert_eq!(WorkflowOutcome::Superseded.to_string(), "superseded");
    }
}
