use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use form_spec::{FlatResponse, FormIdentity};

use crate::gateway::DraftGateway;

/// A saved incomplete response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub identity: FormIdentity,
    pub response: FlatResponse,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
}

impl DraftRecord {
    fn new(response: &FlatResponse, identity: &FormIdentity) -> Self {
        Self {
            identity: identity.clone(),
            response: response.clone(),
            saved_at: OffsetDateTime::now_utc(),
        }
    }
}

/// One JSON draft per form identity under a root directory. A save writes a
/// fresh temp file next to the draft and renames it over the old one, so a
/// reader never sees a half-written draft.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    root: PathBuf,
}

impl FileDraftStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, identity: &FormIdentity) -> PathBuf {
        self.root
            .join(segment(&identity.customer))
            .join(segment(&identity.form_class))
            .join(format!("{}.json", segment(&identity.form_id)))
    }

    pub async fn load(&self, identity: &FormIdentity) -> Result<Option<DraftRecord>> {
        let path = self.path_for(identity);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read draft {}", path.display()));
            }
        };
        let record = serde_json::from_slice(&bytes)
            .with_context(|| format!("draft {} is not valid JSON", path.display()))?;
        Ok(Some(record))
    }

    /// Removes the draft; `false` when there was none.
    pub async fn discard(&self, identity: &FormIdentity) -> Result<bool> {
        let path = self.path_for(identity);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove draft {}", path.display()))
            }
        }
    }
}

#[async_trait]
impl DraftGateway for FileDraftStore {
    async fn save(&self, response: &FlatResponse, identity: &FormIdentity) -> Result<()> {
        let path = self.path_for(identity);
        let parent = path.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let payload = serde_json::to_vec_pretty(&DraftRecord::new(response, identity))?;
        let temp = parent.join(format!(".{}.{}.tmp", segment(&identity.form_id), Uuid::new_v4()));
        tokio::fs::write(&temp, payload)
            .await
            .with_context(|| format!("failed to write {}", temp.display()))?;
        if let Err(err) = tokio::fs::rename(&temp, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                tracing::warn!(path = %temp.display(), error = %cleanup, "left draft temp file behind");
            }
            return Err(err)
                .with_context(|| format!("failed to move draft into {}", path.display()));
        }
        tracing::debug!(path = %path.display(), "draft written");
        Ok(())
    }
}

/// In-process draft store; each save replaces the previous record whole.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<BTreeMap<FormIdentity, DraftRecord>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self, identity: &FormIdentity) -> Option<DraftRecord> {
        self.drafts.lock().await.get(identity).cloned()
    }

    pub async fn discard(&self, identity: &FormIdentity) -> bool {
        self.drafts.lock().await.remove(identity).is_some()
    }

    pub async fn count(&self) -> usize {
        self.drafts.lock().await.len()
    }
}

#[async_trait]
impl DraftGateway for MemoryDraftStore {
    async fn save(&self, response: &FlatResponse, identity: &FormIdentity) -> Result<()> {
        let record = DraftRecord::new(response, identity);
        self.drafts.lock().await.insert(identity.clone(), record);
        Ok(())
    }
}

fn segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
