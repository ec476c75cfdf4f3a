use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{fs, path::Path, str::FromStr};
use tracing::debug;

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        if let Some(dir) = backing_file(database_url).and_then(Path::parent) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create '{}'", dir.display()))?;
        }

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        // A single connection keeps `sqlite::memory:` to one shared database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open credential store at '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn save_credential(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to persist credential '{key}'"))?;
        debug!(key, "storage: credential saved");
        Ok(())
    }

    pub async fn load_credential(&self, key: &str) -> Result<Option<StoredCredential>> {
        let row = sqlx::query("SELECT key, value, updated_at FROM credentials WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load credential '{key}'"))?;

        row.map(|row| -> Result<StoredCredential> {
            Ok(StoredCredential {
                key: row.try_get("key")?,
                value: row.try_get("value")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    /// Returns whether a row was removed.
    pub async fn delete_credential(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete credential '{key}'"))?;
        debug!(key, removed = result.rows_affected(), "storage: credential deleted");
        Ok(result.rows_affected() > 0)
    }
}

/// Turns a configured database location into a sqlite url. Bare paths get
/// a `sqlite://` prefix and forward slashes; full urls pass through as is.
/// Returns `None` for blank input.
pub fn sqlite_url(location: &str) -> Option<String> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    if location.starts_with(MEMORY_URL) || location.contains("://") {
        return Some(location.to_owned());
    }
    let path = location.strip_prefix("sqlite:").unwrap_or(location);
    Some(format!("sqlite://{}", path.replace('\\', "/")))
}

/// The on-disk file behind a sqlite url, query string stripped.
fn backing_file(database_url: &str) -> Option<&Path> {
    if database_url.starts_with(MEMORY_URL) {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let file = rest.split_once('?').map_or(rest, |(file, _)| file);
    (!file.is_empty()).then(|| Path::new(file))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
