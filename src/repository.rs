//! Durable record repository.
//!
//! The [`Repository`] trait is the key-value collaborator the sync stage
//! writes canonical records into. Two backends:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteRepository`] | `products` table via `sqlx` |
//! | [`MemoryRepository`] | tests and dry runs |

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::CanonicalRecord;

/// One stored product row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductEntity {
    pub id: String,
    pub url: String,
    pub link_text: String,
    /// The full canonical record as JSON.
    pub data: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProductEntity {
    /// Replace the payload with `record`'s and bump `updated_at`.
    pub fn apply(&mut self, record: &CanonicalRecord) -> Result<()> {
        self.link_text = record.link_text.clone();
        self.data = serde_json::to_value(record).context("Failed to encode record")?;
        self.updated_at = Utc::now().timestamp();
        Ok(())
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Build an unsaved entity for `record`.
    fn create(&self, record: &CanonicalRecord) -> Result<ProductEntity> {
        let now = Utc::now().timestamp();
        Ok(ProductEntity {
            id: Uuid::new_v4().to_string(),
            url: record.url.clone(),
            link_text: record.link_text.clone(),
            data: serde_json::to_value(record).context("Failed to encode record")?,
            created_at: now,
            updated_at: now,
        })
    }

    /// Insert or update by id.
    async fn save(&self, entity: &ProductEntity) -> Result<()>;

    async fn find(&self) -> Result<Vec<ProductEntity>>;

    async fn find_one_by_url(&self, url: &str) -> Result<Option<ProductEntity>>;
}

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn entity_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProductEntity> {
    let data_json: String = row.get("data_json");
    Ok(ProductEntity {
        id: row.get("id"),
        url: row.get("url"),
        link_text: row.get("link_text"),
        data: serde_json::from_str(&data_json).context("Corrupt data_json in products")?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn save(&self, entity: &ProductEntity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, url, link_text, data_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                link_text = excluded.link_text,
                data_json = excluded.data_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.url)
        .bind(&entity.link_text)
        .bind(entity.data.to_string())
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self) -> Result<Vec<ProductEntity>> {
        let rows = sqlx::query(
            "SELECT id, url, link_text, data_json, created_at, updated_at FROM products ORDER BY created_at, url",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn find_one_by_url(&self, url: &str) -> Result<Option<ProductEntity>> {
        let row = sqlx::query(
            "SELECT id, url, link_text, data_json, created_at, updated_at FROM products WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entity_from_row).transpose()
    }
}

/// In-memory repository.
#[derive(Default)]
pub struct MemoryRepository {
    entities: RwLock<Vec<ProductEntity>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save(&self, entity: &ProductEntity) -> Result<()> {
        let mut entities = self.entities.write().await;
        match entities.iter_mut().find(|e| e.id == entity.id) {
            Some(existing) => *existing = entity.clone(),
            None => {
                if entities.iter().any(|e| e.url == entity.url) {
                    anyhow::bail!("UNIQUE constraint failed: products.url ({})", entity.url);
                }
                entities.push(entity.clone());
            }
        }
        Ok(())
    }

    async fn find(&self) -> Result<Vec<ProductEntity>> {
        Ok(self.entities.read().await.clone())
    }

    async fn find_one_by_url(&self, url: &str) -> Result<Option<ProductEntity>> {
        Ok(self
            .entities
            .read()
            .await
            .iter()
            .find(|e| e.url == url)
            .cloned())
    }
}
