use std::sync::Arc;

use crate::db::{PoetryStore, UserStore};
use crate::services::{auth::TokenService, enrichment::EnrichmentPipeline, storage::ImageStore};

/// Limits applied to multipart poem submissions.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_file_size: usize,
    pub max_files: usize,
    pub body_limit: usize,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub poetry: Arc<dyn PoetryStore>,
    pub users: Arc<dyn UserStore>,
    pub images: Arc<dyn ImageStore>,
    pub enrichment: EnrichmentPipeline,
    pub tokens: Arc<TokenService>,
    pub uploads: UploadLimits,
}

impl AppState {
    pub fn new(
        poetry: Arc<dyn PoetryStore>,
        users: Arc<dyn UserStore>,
        images: Arc<dyn ImageStore>,
        enrichment: EnrichmentPipeline,
        tokens: TokenService,
        uploads: UploadLimits,
    ) -> Self {
        Self {
            poetry,
            users,
            images,
            enrichment,
            tokens: Arc::new(tokens),
            uploads,
        }
    }
}
