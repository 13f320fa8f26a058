use anyhow::Result;
use sqlx::SqlitePool;

/// Create the repository schema. Safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL UNIQUE,
            link_text TEXT NOT NULL,
            data_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_products_updated_at ON products(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
