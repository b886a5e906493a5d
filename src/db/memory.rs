//! In-process store used when no database is configured, and by the tests.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{PoetryStore, StoreError, UserStore};
use crate::models::enrichment::{EnrichmentWrite, WriteOutcome};
use crate::models::poetry::{
    AuthorCount, NewPoetry, Page, PoetryPatch, PoetryQuery, PoetryRecord, PoetryStats,
    PoetrySummary, SortField, SortOrder, VerifyStatus,
};
use crate::models::user::{NewUser, User, UserQuery, UserRole, UserStatus};

#[derive(Default)]
pub struct MemoryStore {
    poetries: Mutex<HashMap<Uuid, PoetryRecord>>,
    users: Mutex<HashMap<Uuid, User>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches(record: &PoetryRecord, query: &PoetryQuery) -> bool {
    if let Some(dynasty) = &query.dynasty {
        if &record.dynasty != dynasty {
            return false;
        }
    }
    if let Some(author) = &query.author {
        if !contains_ignore_case(&record.author, author) {
            return false;
        }
    }
    if let Some(search) = &query.search {
        let hit = [&record.title, &record.content, &record.author, &record.dynasty]
            .iter()
            .any(|field| contains_ignore_case(field, search));
        if !hit {
            return false;
        }
    }
    true
}

fn compare(a: &PoetryRecord, b: &PoetryRecord, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::ViewCount => a.view_count.cmp(&b.view_count),
        SortField::LikeCount => a.like_count.cmp(&b.like_count),
        SortField::Title => a.title.cmp(&b.title),
    }
}

fn paginate<T>(items: Vec<T>, offset: u64, limit: u32) -> Vec<T> {
    items
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(limit as usize)
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn summaries<F>(&self, order: F) -> Vec<PoetrySummary>
    where
        F: Fn(&PoetryRecord, &PoetryRecord) -> Ordering,
    {
        let poetries = lock(&self.poetries);
        let mut records: Vec<&PoetryRecord> = poetries.values().collect();
        records.sort_by(|a, b| order(a, b));
        records.into_iter().take(5).map(PoetrySummary::from).collect()
    }
}

#[async_trait]
impl PoetryStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_poetry(&self, new: NewPoetry) -> Result<PoetryRecord, StoreError> {
        let now = Utc::now();
        let record = PoetryRecord {
            id: Uuid::new_v4(),
            image_gen_status: new.initial_image_gen_status(),
            title: new.title,
            author: new.author,
            dynasty: new.dynasty,
            original_content: new.content.clone(),
            content: new.content,
            original_images: new.images.clone(),
            images: new.images,
            ai_generated_image: None,
            verify_status: VerifyStatus::Pending,
            verified_content: None,
            tags: new.tags,
            view_count: 0,
            like_count: 0,
            created_by: Some(new.created_by),
            created_at: now,
            updated_at: now,
        };
        lock(&self.poetries).insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_poetry(&self, id: Uuid) -> Result<Option<PoetryRecord>, StoreError> {
        Ok(lock(&self.poetries).get(&id).cloned())
    }

    async fn list_poetry(&self, query: &PoetryQuery) -> Result<Page<PoetryRecord>, StoreError> {
        let mut hits: Vec<PoetryRecord> = lock(&self.poetries)
            .values()
            .filter(|r| matches(r, query))
            .cloned()
            .collect();

        hits.sort_by(|a, b| {
            let ord = compare(a, b, query.sort_by);
            let ord = match query.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });

        let total = hits.len() as u64;
        Ok(Page {
            items: paginate(hits, query.offset(), query.limit),
            total,
        })
    }

    async fn update_poetry(
        &self,
        id: Uuid,
        patch: PoetryPatch,
    ) -> Result<Option<PoetryRecord>, StoreError> {
        let mut poetries = lock(&self.poetries);
        Ok(poetries.get_mut(&id).map(|record| {
            patch.apply_to(record);
            record.clone()
        }))
    }

    async fn delete_poetry(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(lock(&self.poetries).remove(&id).is_some())
    }

    async fn record_view(&self, id: Uuid) -> Result<Option<PoetryRecord>, StoreError> {
        let mut poetries = lock(&self.poetries);
        Ok(poetries.get_mut(&id).map(|record| {
            record.view_count += 1;
            record.clone()
        }))
    }

    async fn record_like(&self, id: Uuid) -> Result<Option<i64>, StoreError> {
        let mut poetries = lock(&self.poetries);
        Ok(poetries.get_mut(&id).map(|record| {
            record.like_count += 1;
            record.like_count
        }))
    }

    async fn list_dynasties(&self) -> Result<Vec<String>, StoreError> {
        let dynasties: BTreeSet<String> = lock(&self.poetries)
            .values()
            .map(|r| r.dynasty.clone())
            .collect();
        Ok(dynasties.into_iter().collect())
    }

    async fn list_authors(
        &self,
        dynasty: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AuthorCount>, StoreError> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for record in lock(&self.poetries).values() {
            if dynasty.is_some_and(|d| d != record.dynasty) {
                continue;
            }
            *counts.entry(record.author.clone()).or_default() += 1;
        }

        let mut authors: Vec<AuthorCount> = counts
            .into_iter()
            .map(|(name, count)| AuthorCount { name, count })
            .collect();
        authors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        authors.truncate(limit as usize);
        Ok(authors)
    }

    async fn poetry_stats(&self) -> Result<PoetryStats, StoreError> {
        let (total, dynasties, authors) = {
            let poetries = lock(&self.poetries);
            let dynasties: BTreeSet<&str> = poetries.values().map(|r| r.dynasty.as_str()).collect();
            let authors: BTreeSet<&str> = poetries.values().map(|r| r.author.as_str()).collect();
            (poetries.len(), dynasties.len(), authors.len())
        };

        Ok(PoetryStats {
            total_poetries: total as u64,
            total_dynasties: dynasties as u64,
            total_authors: authors as u64,
            recent_poetries: self.summaries(|a, b| b.created_at.cmp(&a.created_at)),
            popular_poetries: self.summaries(|a, b| {
                b.view_count
                    .cmp(&a.view_count)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
        })
    }

    async fn apply_enrichment(
        &self,
        id: Uuid,
        write: EnrichmentWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let mut poetries = lock(&self.poetries);
        let Some(record) = poetries.get_mut(&id) else {
            return Ok(WriteOutcome::Missing);
        };

        match write {
            EnrichmentWrite::Verify(w) => {
                if w.expected.is_some_and(|s| s != record.verify_status) {
                    return Ok(WriteOutcome::Conflict);
                }
                record.verify_status = w.status;
                if let Some(verified) = w.verified_content {
                    record.verified_content = Some(verified);
                }
                if let Some(content) = w.content {
                    record.content = content;
                }
            }
            EnrichmentWrite::Image(w) => {
                if w.expected.is_some_and(|s| s != record.image_gen_status)
                    || (w.require_no_images && !record.images.is_empty())
                {
                    return Ok(WriteOutcome::Conflict);
                }
                record.image_gen_status = w.status;
                if let Some(reference) = w.generated_image {
                    record.images = vec![reference.clone()];
                    record.ai_generated_image = Some(reference);
                }
            }
        }
        record.updated_at = Utc::now();
        Ok(WriteOutcome::Applied)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = lock(&self.users);
        if users.values().any(|u| u.username == new.username) {
            return Err(StoreError::Conflict(format!(
                "username {:?} is taken",
                new.username
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            password_hash: new.password_hash,
            nickname: new.nickname,
            role: new.role,
            status: new.status,
            avatar: String::new(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users).get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users)
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Page<User>, StoreError> {
        let mut hits: Vec<User> = lock(&self.users)
            .values()
            .filter(|u| query.status.map_or(true, |s| s == u.status))
            .filter(|u| query.role.map_or(true, |r| r == u.role))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = hits.len() as u64;
        Ok(Page {
            items: paginate(hits, query.offset(), query.limit),
            total,
        })
    }

    async fn update_profile(
        &self,
        id: Uuid,
        nickname: Option<String>,
        avatar: Option<String>,
    ) -> Result<Option<User>, StoreError> {
        let mut users = lock(&self.users);
        Ok(users.get_mut(&id).map(|user| {
            if let Some(nickname) = nickname {
                user.nickname = nickname;
            }
            if let Some(avatar) = avatar {
                user.avatar = avatar;
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool, StoreError> {
        let mut users = lock(&self.users);
        Ok(users
            .get_mut(&id)
            .map(|user| {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
        role: Option<UserRole>,
    ) -> Result<Option<User>, StoreError> {
        let mut users = lock(&self.users);
        Ok(users.get_mut(&id).map(|user| {
            user.status = status;
            if let Some(role) = role {
                user.role = role;
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(lock(&self.users).remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enrichment::{ImageWrite, VerifyWrite};
    use crate::models::poetry::ImageGenStatus;

    fn poem(title: &str, author: &str, dynasty: &str, images: Vec<String>) -> NewPoetry {
        NewPoetry {
            title: title.into(),
            author: author.into(),
            dynasty: dynasty.into(),
            content: format!("{title}的内容"),
            tags: vec![],
            images,
            created_by: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn verify_cas_only_applies_while_processing() {
        let store = MemoryStore::new();
        let record = store.insert_poetry(poem("静夜思", "李白", "唐", vec![])).await.unwrap();

        let outcome = store
            .apply_enrichment(record.id, VerifyWrite::failed().into())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict);

        store
            .apply_enrichment(record.id, VerifyWrite::status(VerifyStatus::Processing).into())
            .await
            .unwrap();
        let outcome = store
            .apply_enrichment(
                record.id,
                VerifyWrite::completed("床前明月光".into(), Some("床前明月光".into())).into(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);

        let stored = store.find_poetry(record.id).await.unwrap().unwrap();
        assert_eq!(stored.verify_status, VerifyStatus::Completed);
        assert_eq!(stored.content, "床前明月光");
        assert_eq!(stored.image_gen_status, ImageGenStatus::Pending);
    }

    #[tokio::test]
    async fn image_completion_never_overwrites_user_images() {
        let store = MemoryStore::new();
        let record = store.insert_poetry(poem("春晓", "孟浩然", "唐", vec![])).await.unwrap();
        store
            .apply_enrichment(record.id, ImageWrite::status(ImageGenStatus::Processing).into())
            .await
            .unwrap();

        let upload = vec!["/uploads/2024/03/mine.png".to_string()];
        store
            .update_poetry(
                record.id,
                PoetryPatch {
                    images: Some(upload.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = store
            .apply_enrichment(record.id, ImageWrite::completed("/uploads/ai.png".into()).into())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict);
        let stored = store.find_poetry(record.id).await.unwrap().unwrap();
        assert_eq!(stored.images, upload);
        assert_eq!(stored.image_gen_status, ImageGenStatus::Skipped);
        assert!(stored.ai_generated_image.is_none());
    }

    #[tokio::test]
    async fn writes_to_deleted_records_report_missing() {
        let store = MemoryStore::new();
        let record = store.insert_poetry(poem("登鹳雀楼", "王之涣", "唐", vec![])).await.unwrap();
        assert!(store.delete_poetry(record.id).await.unwrap());
        let outcome = store
            .apply_enrichment(record.id, VerifyWrite::status(VerifyStatus::Processing).into())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Missing);
    }

    #[tokio::test]
    async fn listing_filters_sorts_and_paginates() {
        let store = MemoryStore::new();
        store.insert_poetry(poem("静夜思", "李白", "唐", vec![])).await.unwrap();
        store.insert_poetry(poem("将进酒", "李白", "唐", vec![])).await.unwrap();
        store.insert_poetry(poem("水调歌头", "苏轼", "宋", vec![])).await.unwrap();

        let page = store
            .list_poetry(&PoetryQuery {
                dynasty: Some("唐".into()),
                sort_by: SortField::Title,
                sort_order: SortOrder::Asc,
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);

        let search = store
            .list_poetry(&PoetryQuery {
                search: Some("水调".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(search.total, 1);
        assert_eq!(search.items[0].author, "苏轼");

        let authors = store.list_authors(None, 50).await.unwrap();
        assert_eq!(authors[0], AuthorCount { name: "李白".into(), count: 2 });
        assert_eq!(store.list_dynasties().await.unwrap(), vec!["唐", "宋"]);
    }

    #[tokio::test]
    async fn duplicate_usernames_conflict() {
        let store = MemoryStore::new();
        let new = NewUser {
            username: "grandpa".into(),
            password_hash: "x".into(),
            nickname: "爷爷".into(),
            role: UserRole::Guest,
            status: UserStatus::Pending,
        };
        store.insert_user(new.clone()).await.unwrap();
        let err = store.insert_user(new).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
