use anyhow::Result;
use sqlx::SqlitePool;

/// Create the vector store schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create collections table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create chunks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            source_file TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            subject TEXT NOT NULL,
            size INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection, id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_collection_subject ON chunks(collection, subject)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
