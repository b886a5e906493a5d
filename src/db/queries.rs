use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::{like_pattern, PgStore, PoetryStore, StoreError};
use crate::models::enrichment::{EnrichmentWrite, WriteOutcome};
use crate::models::poetry::{
    AuthorCount, ImageGenStatus, NewPoetry, Page, PoetryPatch, PoetryQuery, PoetryRecord,
    PoetryStats, PoetrySummary, SortOrder, VerifyStatus,
};

const POETRY_COLUMNS: &str = "id, title, author, dynasty, content, original_content, images, \
     original_images, ai_generated_image, verify_status, image_gen_status, verified_content, \
     tags, view_count, like_count, created_by, created_at, updated_at";

fn parse_status<T: FromStr>(raw: &str, column: &str) -> Result<T, StoreError> {
    T::from_str(raw).map_err(|_| StoreError::Corrupt(format!("{column} = {raw:?}")))
}

fn poetry_from_row(row: &PgRow) -> Result<PoetryRecord, StoreError> {
    let verify_status: String = row.try_get("verify_status")?;
    let image_gen_status: String = row.try_get("image_gen_status")?;

    Ok(PoetryRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        dynasty: row.try_get("dynasty")?,
        content: row.try_get("content")?,
        original_content: row.try_get("original_content")?,
        images: row.try_get("images")?,
        original_images: row.try_get("original_images")?,
        ai_generated_image: row.try_get("ai_generated_image")?,
        verify_status: parse_status::<VerifyStatus>(&verify_status, "verify_status")?,
        image_gen_status: parse_status::<ImageGenStatus>(&image_gen_status, "image_gen_status")?,
        verified_content: row.try_get("verified_content")?,
        tags: row.try_get("tags")?,
        view_count: row.try_get("view_count")?,
        like_count: row.try_get("like_count")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Append the WHERE clause shared by the listing and its count.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &PoetryQuery) {
    qb.push(" WHERE TRUE");
    if let Some(dynasty) = &query.dynasty {
        qb.push(" AND dynasty = ").push_bind(dynasty.clone());
    }
    if let Some(author) = &query.author {
        qb.push(" AND author ILIKE ").push_bind(like_pattern(author));
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR content ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR dynasty ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl PgStore {
    async fn poetry_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM poetries WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn summaries(&self, order_by: &str) -> Result<Vec<PoetrySummary>, StoreError> {
        let sql = format!("SELECT {POETRY_COLUMNS} FROM poetries ORDER BY {order_by} LIMIT 5");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| poetry_from_row(r).map(|p| PoetrySummary::from(&p)))
            .collect()
    }
}

#[async_trait]
impl PoetryStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_poetry(&self, new: NewPoetry) -> Result<PoetryRecord, StoreError> {
        let image_gen_status = new.initial_image_gen_status();
        let sql = format!(
            r#"
            INSERT INTO poetries (id, title, author, dynasty, content, original_content,
                                  images, original_images, tags, verify_status,
                                  image_gen_status, created_by)
            VALUES ($1, $2, $3, $4, $5, $5, $6, $6, $7, $8, $9, $10)
            RETURNING {POETRY_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.author)
            .bind(&new.dynasty)
            .bind(&new.content)
            .bind(&new.images)
            .bind(&new.tags)
            .bind(VerifyStatus::Pending.to_string())
            .bind(image_gen_status.to_string())
            .bind(new.created_by)
            .fetch_one(&self.pool)
            .await?;

        poetry_from_row(&row)
    }

    async fn find_poetry(&self, id: Uuid) -> Result<Option<PoetryRecord>, StoreError> {
        let sql = format!("SELECT {POETRY_COLUMNS} FROM poetries WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(poetry_from_row).transpose()
    }

    async fn list_poetry(&self, query: &PoetryQuery) -> Result<Page<PoetryRecord>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM poetries");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {POETRY_COLUMNS} FROM poetries"));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY ")
            .push(query.sort_by.column())
            .push(match query.sort_order {
                SortOrder::Asc => " ASC",
                SortOrder::Desc => " DESC",
            })
            .push(", id ASC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(poetry_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn update_poetry(
        &self,
        id: Uuid,
        patch: PoetryPatch,
    ) -> Result<Option<PoetryRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE poetries SET updated_at = NOW()");
        if let Some(title) = patch.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(author) = patch.author {
            qb.push(", author = ").push_bind(author);
        }
        if let Some(dynasty) = patch.dynasty {
            qb.push(", dynasty = ").push_bind(dynasty);
        }
        if let Some(tags) = patch.tags {
            qb.push(", tags = ").push_bind(tags);
        }
        if let Some(content) = patch.content {
            qb.push(", content = ")
                .push_bind(content.clone())
                .push(", original_content = ")
                .push_bind(content)
                .push(", verify_status = ")
                .push_bind(VerifyStatus::Pending.to_string());
        }
        if let Some(images) = patch.images {
            qb.push(", images = ")
                .push_bind(images.clone())
                .push(", original_images = ")
                .push_bind(images)
                .push(", image_gen_status = ")
                .push_bind(ImageGenStatus::Skipped.to_string());
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {POETRY_COLUMNS}"));

        let row = qb.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(poetry_from_row).transpose()
    }

    async fn delete_poetry(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM poetries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_view(&self, id: Uuid) -> Result<Option<PoetryRecord>, StoreError> {
        let sql = format!(
            "UPDATE poetries SET view_count = view_count + 1 WHERE id = $1 RETURNING {POETRY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(poetry_from_row).transpose()
    }

    async fn record_like(&self, id: Uuid) -> Result<Option<i64>, StoreError> {
        let likes: Option<i64> = sqlx::query_scalar(
            "UPDATE poetries SET like_count = like_count + 1 WHERE id = $1 RETURNING like_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(likes)
    }

    async fn list_dynasties(&self) -> Result<Vec<String>, StoreError> {
        let dynasties: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT dynasty FROM poetries ORDER BY dynasty")
                .fetch_all(&self.pool)
                .await?;
        Ok(dynasties)
    }

    async fn list_authors(
        &self,
        dynasty: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AuthorCount>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT author, COUNT(*) AS count FROM poetries");
        if let Some(dynasty) = dynasty {
            qb.push(" WHERE dynasty = ").push_bind(dynasty.to_string());
        }
        qb.push(" GROUP BY author ORDER BY count DESC, author ASC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| {
                Ok(AuthorCount {
                    name: r.try_get("author")?,
                    count: r.try_get("count")?,
                })
            })
            .collect()
    }

    async fn poetry_stats(&self) -> Result<PoetryStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(DISTINCT dynasty) AS dynasties,
                   COUNT(DISTINCT author) AS authors
            FROM poetries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<u64, StoreError> {
            let value: i64 = row.try_get(column)?;
            Ok(u64::try_from(value).unwrap_or_default())
        };

        Ok(PoetryStats {
            total_poetries: count("total")?,
            total_dynasties: count("dynasties")?,
            total_authors: count("authors")?,
            recent_poetries: self.summaries("created_at DESC").await?,
            popular_poetries: self.summaries("view_count DESC, created_at DESC").await?,
        })
    }

    async fn apply_enrichment(
        &self,
        id: Uuid,
        write: EnrichmentWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE poetries SET updated_at = NOW()");

        match write {
            EnrichmentWrite::Verify(w) => {
                qb.push(", verify_status = ").push_bind(w.status.to_string());
                if let Some(verified) = w.verified_content {
                    qb.push(", verified_content = ").push_bind(verified);
                }
                if let Some(content) = w.content {
                    qb.push(", content = ").push_bind(content);
                }
                qb.push(" WHERE id = ").push_bind(id);
                if let Some(expected) = w.expected {
                    qb.push(" AND verify_status = ").push_bind(expected.to_string());
                }
            }
            EnrichmentWrite::Image(w) => {
                qb.push(", image_gen_status = ").push_bind(w.status.to_string());
                if let Some(reference) = w.generated_image {
                    qb.push(", ai_generated_image = ")
                        .push_bind(reference.clone())
                        .push(", images = ")
                        .push_bind(vec![reference]);
                }
                qb.push(" WHERE id = ").push_bind(id);
                if let Some(expected) = w.expected {
                    qb.push(" AND image_gen_status = ").push_bind(expected.to_string());
                }
                if w.require_no_images {
                    qb.push(" AND cardinality(images) = 0");
                }
            }
        }

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            Ok(WriteOutcome::Applied)
        } else if self.poetry_exists(id).await? {
            Ok(WriteOutcome::Conflict)
        } else {
            Ok(WriteOutcome::Missing)
        }
    }
}
