use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use docsmith_shared::{DocsetStatus, PackageIdentity, Result};
use tokio::sync::RwLock;

use crate::{StatusRecord, StatusStore};

/// Process-local [`StatusStore`]. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<PackageIdentity, StatusRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn get_status(&self, identity: &PackageIdentity) -> Result<Option<StatusRecord>> {
        Ok(self.records.read().await.get(identity).cloned())
    }

    async fn set_status(
        &self,
        identity: &PackageIdentity,
        status: DocsetStatus,
        artifact_path: Option<&Path>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let last_error = match status {
            DocsetStatus::Error => records.get(identity).and_then(|r| r.last_error.clone()),
            _ => None,
        };
        records.insert(
            identity.clone(),
            StatusRecord {
                identity: identity.clone(),
                status,
                artifact_path: artifact_path.map(Path::to_path_buf),
                last_error,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn record_error(&self, identity: &PackageIdentity, message: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(identity.clone())
            .or_insert_with(|| StatusRecord {
                identity: identity.clone(),
                status: DocsetStatus::Error,
                artifact_path: None,
                last_error: None,
                updated_at: Utc::now(),
            });
        record.last_error = Some(message.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StatusRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
