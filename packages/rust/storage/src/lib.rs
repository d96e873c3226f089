//! Local libSQL storage layer for session settings.
//!
//! The [`Storage`] struct wraps a libSQL database holding a small key-value
//! table. It implements [`KeyValueStore`], which is how the session persists
//! the Free/Pro plan across runs.
//!
//! **Access rules:**
//! - CLI commands that change the plan: read-write via [`Storage::open`]
//! - Inspection commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use everythingpdf_shared::{EverythingPdfError, KeyValueStore, Result};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EverythingPdfError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        EverythingPdfError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(EverythingPdfError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Key-value operations
    // -----------------------------------------------------------------------

    /// Read a setting by key.
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv WHERE key = ?1", params![key])
            .await
            .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(EverythingPdfError::Storage(e.to_string())),
        }
    }

    /// Store a setting (upserts).
    pub async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(|e| EverythingPdfError::Storage(e.to_string()))?;
        tracing::debug!(key, "setting stored");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use everythingpdf_shared::{TIER_STORAGE_KEY, Tier};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("epdf_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("epdf_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn kv_upsert() {
        let storage = test_storage().await;

        assert!(storage.get_value("missing").await.unwrap().is_none());

        storage.set_value("color", "blue").await.expect("set");
        assert_eq!(storage.get_value("color").await.unwrap().as_deref(), Some("blue"));

        storage.set_value("color", "red").await.expect("overwrite");
        assert_eq!(storage.get_value("color").await.unwrap().as_deref(), Some("red"));
    }

    #[tokio::test]
    async fn tier_persists_across_reopen() {
        let tmp = std::env::temp_dir().join(format!("epdf_test_{}.db", Uuid::now_v7()));
        {
            let storage = Storage::open(&tmp).await.unwrap();
            let stored = KeyValueStore::get(&storage, TIER_STORAGE_KEY).await.unwrap();
            assert_eq!(Tier::from_storage_value(stored.as_deref()), Tier::Free);
            KeyValueStore::set(&storage, TIER_STORAGE_KEY, Tier::Pro.storage_value())
                .await
                .unwrap();
        }

        let reopened = Storage::open(&tmp).await.unwrap();
        let stored = KeyValueStore::get(&reopened, TIER_STORAGE_KEY).await.unwrap();
        assert_eq!(Tier::from_storage_value(stored.as_deref()), Tier::Pro);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("epdf_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.set_value("k", "v").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.get_value("k").await.unwrap().as_deref(), Some("v"));
        let result = ro.set_value("k", "w").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
