use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Without it the server keeps data in memory.
    pub database_url: Option<String>,

    /// HMAC secret for session tokens
    pub jwt_secret: ApiKey,

    /// Session token lifetime in hours
    #[serde(default = "default_jwt_ttl_hours")]
    pub jwt_ttl_hours: u64,

    /// Bootstrap administrator, created on start-up if missing
    pub admin_username: Option<String>,
    pub admin_password: Option<ApiKey>,

    /// Local directory for uploaded and generated images
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Per-file upload limit in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Maximum number of images per poem
    #[serde(default = "default_max_upload_files")]
    pub max_upload_files: usize,

    /// Allowed browser origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Text-completion gateway used to proofread poems
    pub ai_verify_api_key: Option<ApiKey>,
    #[serde(default = "default_verify_url")]
    pub ai_verify_api_url: String,
    #[serde(default = "default_verify_model")]
    pub ai_verify_model: String,
    #[serde(default = "default_verify_timeout_secs")]
    pub ai_verify_timeout_secs: u64,

    /// Image-generation gateway used to paint artwork
    pub ai_image_api_key: Option<ApiKey>,
    #[serde(default = "default_image_url")]
    pub ai_image_api_url: String,
    #[serde(default = "default_image_model")]
    pub ai_image_model: String,
    #[serde(default = "default_image_size")]
    pub ai_image_size: String,
    #[serde(default = "default_image_quality")]
    pub ai_image_quality: String,
    #[serde(default = "default_image_timeout_secs")]
    pub ai_image_timeout_secs: u64,

    /// Bounded enrichment queue
    #[serde(default = "default_queue_capacity")]
    pub enrichment_queue_capacity: usize,
    #[serde(default = "default_concurrency")]
    pub enrichment_concurrency: usize,

    /// Optional S3-compatible storage (Cloudflare R2). All five must be set.
    pub r2_bucket: Option<String>,
    pub r2_endpoint: Option<String>,
    pub r2_access_key: Option<String>,
    pub r2_secret_key: Option<ApiKey>,
    pub r2_public_url: Option<String>,
}

/// Secret string whose `Debug` output is redacted.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Settings injected into the enrichment pipeline.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub verify_credential: Option<ApiKey>,
    pub verify_url: String,
    pub verify_model: String,
    pub verify_timeout: Duration,
    pub image_credential: Option<ApiKey>,
    pub image_url: String,
    pub image_model: String,
    pub image_size: String,
    pub image_quality: String,
    pub image_timeout: Duration,
    /// Largest generated image accepted from the download URL.
    pub max_image_bytes: usize,
    pub queue_capacity: usize,
    pub concurrency: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            verify_credential: None,
            verify_url: default_verify_url(),
            verify_model: default_verify_model(),
            verify_timeout: Duration::from_secs(default_verify_timeout_secs()),
            image_credential: None,
            image_url: default_image_url(),
            image_model: default_image_model(),
            image_size: default_image_size(),
            image_quality: default_image_quality(),
            image_timeout: Duration::from_secs(default_image_timeout_secs()),
            max_image_bytes: default_max_file_size(),
            queue_capacity: default_queue_capacity(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct R2Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: ApiKey,
    pub public_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_jwt_ttl_hours() -> u64 {
    24 * 7
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

fn default_max_upload_files() -> usize {
    5
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

fn default_verify_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_verify_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_verify_timeout_secs() -> u64 {
    30
}

fn default_image_url() -> String {
    "https://api.openai.com/v1/images/generations".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_quality() -> String {
    "standard".to_string()
}

fn default_image_timeout_secs() -> u64 {
    120
}

fn default_queue_capacity() -> usize {
    256
}

fn default_concurrency() -> usize {
    4
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Pipeline settings. Blank credentials count as unconfigured.
    pub fn enrichment(&self) -> EnrichmentConfig {
        EnrichmentConfig {
            verify_credential: self.ai_verify_api_key.clone().filter(|k| !k.is_blank()),
            verify_url: self.ai_verify_api_url.clone(),
            verify_model: self.ai_verify_model.clone(),
            verify_timeout: Duration::from_secs(self.ai_verify_timeout_secs),
            image_credential: self.ai_image_api_key.clone().filter(|k| !k.is_blank()),
            image_url: self.ai_image_api_url.clone(),
            image_model: self.ai_image_model.clone(),
            image_size: self.ai_image_size.clone(),
            image_quality: self.ai_image_quality.clone(),
            image_timeout: Duration::from_secs(self.ai_image_timeout_secs),
            max_image_bytes: self.max_file_size,
            queue_capacity: self.enrichment_queue_capacity.max(1),
            concurrency: self.enrichment_concurrency.max(1),
        }
    }

    /// R2 settings when every variable is present.
    pub fn r2(&self) -> Option<R2Config> {
        Some(R2Config {
            bucket: self.r2_bucket.clone()?,
            endpoint: self.r2_endpoint.clone()?,
            access_key: self.r2_access_key.clone()?,
            secret_key: self.r2_secret_key.clone()?,
            public_url: self.r2_public_url.clone()?,
        })
    }

    pub fn jwt_ttl(&self) -> Duration {
        Duration::from_secs(self.jwt_ttl_hours * 3600)
    }

    /// Largest request body accepted: every file plus form text.
    pub fn body_limit(&self) -> usize {
        self.max_file_size
            .saturating_mul(self.max_upload_files.max(1))
            .saturating_add(1024 * 1024)
    }
}
