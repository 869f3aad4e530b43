//! Persistence of last-known docset status.
//!
//! The coordinator talks to a [`StatusStore`]; it never assumes a particular
//! engine. Two implementations ship here:
//! - [`Storage`]: libSQL (Turso Embedded) in offline mode, one `docsets` table
//! - [`MemoryStore`]: a process-local map, for tests and throwaway runs

mod memory;
mod migrations;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsmith_shared::{DocsetError, DocsetStatus, PackageIdentity, Result};
use libsql::{Connection, Database, Row, params};

pub use memory::MemoryStore;

/// One persisted row: the last known status of a package identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub identity: PackageIdentity,
    pub status: DocsetStatus,
    pub artifact_path: Option<PathBuf>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// StatusStore trait
// ---------------------------------------------------------------------------

/// Known packages and their last-known docset status.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get_status(&self, identity: &PackageIdentity) -> Result<Option<StatusRecord>>;

    /// Upsert the status. Any status other than `Error` clears `last_error`.
    async fn set_status(
        &self,
        identity: &PackageIdentity,
        status: DocsetStatus,
        artifact_path: Option<&Path>,
    ) -> Result<()>;

    /// Attach a failure message without changing the status of an existing
    /// record. A missing record is created with status `Error`.
    async fn record_error(&self, identity: &PackageIdentity, message: &str) -> Result<()>;

    /// Every record, ordered by name then version.
    async fn list(&self) -> Result<Vec<StatusRecord>>;
}

// ---------------------------------------------------------------------------
// libSQL storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocsetError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| DocsetError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

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
                        DocsetError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            // table doesn't exist yet
            Err(_) => 0,
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT name, version, status, artifact_path, last_error, updated_at FROM docsets";

fn storage_err(e: libsql::Error) -> DocsetError {
    DocsetError::Storage(e.to_string())
}

fn record_from_row(row: &Row) -> Result<StatusRecord> {
    let name = row.get::<String>(0).map_err(storage_err)?;
    let version = row.get::<String>(1).map_err(storage_err)?;
    let status = row.get::<String>(2).map_err(storage_err)?;
    let artifact_path = row.get::<Option<String>>(3).map_err(storage_err)?;
    let last_error = row.get::<Option<String>>(4).map_err(storage_err)?;
    let updated_at = row.get::<String>(5).map_err(storage_err)?;

    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| DocsetError::Storage(format!("bad timestamp '{updated_at}': {e}")))?
        .with_timezone(&Utc);

    Ok(StatusRecord {
        identity: PackageIdentity::new(&name, &version)?,
        status: status.parse()?,
        artifact_path: artifact_path.map(PathBuf::from),
        last_error,
        updated_at,
    })
}

#[async_trait]
impl StatusStore for Storage {
    async fn get_status(&self, identity: &PackageIdentity) -> Result<Option<StatusRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("{SELECT_COLUMNS} WHERE name = ?1 AND version = ?2"),
                params![identity.name(), identity.version()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(record_from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn set_status(
        &self,
        identity: &PackageIdentity,
        status: DocsetStatus,
        artifact_path: Option<&Path>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let artifact = artifact_path.map(|p| p.to_string_lossy().into_owned());
        self.conn
            .execute(
                "INSERT INTO docsets (name, version, status, artifact_path, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(name, version) DO UPDATE SET
                   status = excluded.status,
                   artifact_path = excluded.artifact_path,
                   updated_at = excluded.updated_at,
                   last_error = CASE WHEN excluded.status = 'error'
                                     THEN docsets.last_error ELSE NULL END",
                params![
                    identity.name(),
                    identity.version(),
                    status.as_str(),
                    artifact.as_deref(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn record_error(&self, identity: &PackageIdentity, message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO docsets (name, version, status, updated_at, last_error)
                 VALUES (?1, ?2, 'error', ?3, ?4)
                 ON CONFLICT(name, version) DO UPDATE SET
                   last_error = excluded.last_error,
                   updated_at = excluded.updated_at",
                params![identity.name(), identity.version(), now.as_str(), message],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StatusRecord>> {
        let mut rows = self
            .conn
            .query(&format!("{SELECT_COLUMNS} ORDER BY name, version"), params![])
            .await
            .map_err(storage_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            records.push(record_from_row(&row)?);
        }
        Ok(records)
    }
}
