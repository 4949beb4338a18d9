use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use domain::{
    entities::entitlements::EntitlementRecord, repositories::entitlements::EntitlementRepository,
};

/// On-disk shape of the entitlement database. Records are keyed by subject id;
/// processed event ids ride in the same document so both persist together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EntitlementDocument {
    #[serde(default)]
    records: BTreeMap<String, EntitlementRecord>,
    #[serde(default)]
    processed_events: BTreeSet<String>,
}

/// Single-file JSON entitlement store. Writes go to a sibling temp file first
/// and are renamed into place, so a crash mid-write leaves the previous
/// document intact.
pub struct JsonEntitlementStore {
    path: PathBuf,
    state: RwLock<EntitlementDocument>,
}

impl JsonEntitlementStore {
    /// Loads the database, starting empty when the file does not exist yet.
    /// A file that exists but cannot be parsed is an error: silently starting
    /// over would throw away every entitlement ever recorded.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).with_context(|| {
                format!("entitlement db at {} is not valid json", path.display())
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => EntitlementDocument::default(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read entitlement db at {}", path.display()));
            }
        };

        Ok(Self {
            path,
            state: RwLock::new(document),
        })
    }

    async fn persist(&self, document: &EntitlementDocument) -> Result<()> {
        let json = serde_json::to_vec_pretty(document).context("serialize entitlement db")?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("write entitlement db temp file {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replace entitlement db at {}", self.path.display()))?;

        Ok(())
    }
}

#[async_trait]
impl EntitlementRepository for JsonEntitlementStore {
    async fn find_entitlement_by_subject_id(
        &self,
        subject_id: &str,
    ) -> Result<Option<EntitlementRecord>> {
        let state = self.state.read().await;
        Ok(state.records.get(subject_id).cloned())
    }

    async fn has_processed_event(&self, event_id: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.processed_events.contains(event_id))
    }

    async fn commit_entitlement_with_event(&self, record: EntitlementRecord) -> Result<()> {
        let mut state = self.state.write().await;

        // Mutate a copy and only swap it in once the disk write succeeded, so
        // memory never runs ahead of the file.
        let mut next = state.clone();
        next.processed_events.insert(record.source_event_id.clone());
        next.records.insert(record.subject_id.clone(), record);

        self.persist(&next).await?;
        *state = next;

        Ok(())
    }

    async fn mark_event_processed(&self, event_id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        let mut next = state.clone();
        next.processed_events.insert(event_id.to_string());

        self.persist(&next).await?;
        *state = next;

        Ok(())
    }
}
