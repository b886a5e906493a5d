use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Progress of the text verification workflow.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerifyStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Progress of the artwork generation workflow.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageGenStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

/// A poem document as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoetryRecord {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub dynasty: String,
    pub content: String,
    pub original_content: String,
    pub images: Vec<String>,
    pub original_images: Vec<String>,
    pub ai_generated_image: Option<String>,
    pub verify_status: VerifyStatus,
    pub image_gen_status: ImageGenStatus,
    pub verified_content: Option<String>,
    pub tags: Vec<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a poem is submitted.
#[derive(Debug, Clone)]
pub struct NewPoetry {
    pub title: String,
    pub author: String,
    pub dynasty: String,
    pub content: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub created_by: Uuid,
}

impl NewPoetry {
    /// Initial image workflow state: user-supplied images always win.
    pub fn initial_image_gen_status(&self) -> ImageGenStatus {
        if self.images.is_empty() {
            ImageGenStatus::Pending
        } else {
            ImageGenStatus::Skipped
        }
    }
}

/// A user edit of an existing poem.
///
/// Setting `content` also rewrites `original_content` and resets
/// `verify_status` to pending. Setting `images` also rewrites
/// `original_images` and marks `image_gen_status` as skipped.
#[derive(Debug, Clone, Default)]
pub struct PoetryPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub dynasty: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
}

impl PoetryPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.dynasty.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.images.is_none()
    }

    /// Apply the edit to an in-memory record.
    pub fn apply_to(self, record: &mut PoetryRecord) {
        if let Some(title) = self.title {
            record.title = title;
        }
        if let Some(author) = self.author {
            record.author = author;
        }
        if let Some(dynasty) = self.dynasty {
            record.dynasty = dynasty;
        }
        if let Some(tags) = self.tags {
            record.tags = tags;
        }
        if let Some(content) = self.content {
            record.original_content = content.clone();
            record.content = content;
            record.verify_status = VerifyStatus::Pending;
        }
        if let Some(images) = self.images {
            record.original_images = images.clone();
            record.images = images;
            record.image_gen_status = ImageGenStatus::Skipped;
        }
        record.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SortField {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "updatedAt")]
    UpdatedAt,
    #[serde(rename = "viewCount")]
    ViewCount,
    #[serde(rename = "likeCount")]
    LikeCount,
    #[serde(rename = "title")]
    Title,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::ViewCount => "view_count",
            SortField::LikeCount => "like_count",
            SortField::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Listing filters, already normalised.
#[derive(Debug, Clone)]
pub struct PoetryQuery {
    pub page: u32,
    pub limit: u32,
    pub dynasty: Option<String>,
    pub author: Option<String>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for PoetryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 12,
            dynasty: None,
            author: None,
            search: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl PoetryQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            total,
            page,
            limit,
            pages,
        }
    }
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthorCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoetrySummary {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub dynasty: String,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&PoetryRecord> for PoetrySummary {
    fn from(record: &PoetryRecord) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            author: record.author.clone(),
            dynasty: record.dynasty.clone(),
            view_count: record.view_count,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoetryStats {
    pub total_poetries: u64,
    pub total_dynasties: u64,
    pub total_authors: u64,
    pub recent_poetries: Vec<PoetrySummary>,
    pub popular_poetries: Vec<PoetrySummary>,
}

/// Trim, drop empty entries and de-duplicate while keeping first-seen order.
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = Vec::new();
    for chunk in raw {
        for tag in chunk.as_ref().split(',') {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
    }
    tags
}
