use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use uuid::Uuid;

use form_session::{DispatchKey, PriorResponseSource, SubmissionGateway, TemplateSource};
use form_spec::{FlatResponse, FormIdentity, FormTemplate};

/// Templates stored as `<root>/<form_class>/<form_id>.json`.
#[derive(Debug, Clone)]
pub struct DirTemplateSource {
    root: PathBuf,
}

impl DirTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, form_id: &str, form_class: &str) -> PathBuf {
        self.root.join(form_class).join(format!("{form_id}.json"))
    }
}

#[async_trait]
impl TemplateSource for DirTemplateSource {
    async fn fetch_template(&self, form_id: &str, form_class: &str) -> Result<FormTemplate> {
        let path = self.path_for(form_id, form_class);
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("template {} not found", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("template {} is not a valid form", path.display()))
    }
}

/// Prior responses read from a JSON object, or none at all.
#[derive(Debug, Clone, Default)]
pub struct PriorFile {
    path: Option<PathBuf>,
}

impl PriorFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PriorResponseSource for PriorFile {
    async fn fetch_prior_responses(&self, _key: &DispatchKey) -> Result<BTreeMap<String, String>> {
        let Some(path) = &self.path else {
            return Ok(BTreeMap::new());
        };
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read prior responses {}", path.display()))?;
        read_value_map(&raw).with_context(|| format!("invalid prior responses {}", path.display()))
    }
}

/// Parses a JSON object of answers. Scalars are stringified; `null` is dropped.
pub fn read_value_map(raw: &[u8]) -> Result<BTreeMap<String, String>> {
    let map: BTreeMap<String, JsonValue> = serde_json::from_slice(raw)?;
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                JsonValue::Null => return None,
                JsonValue::String(text) => text,
                other => other.to_string(),
            };
            Some((key, value))
        })
        .collect())
}

/// Submitted response as written to the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub identity: FormIdentity,
    pub recipients: Vec<String>,
    pub response: FlatResponse,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

/// Writes each submission as its own JSON file.
#[derive(Debug, Clone)]
pub struct Outbox {
    dir: PathBuf,
}

impl Outbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SubmissionGateway for Outbox {
    async fn submit(
        &self,
        response: &FlatResponse,
        recipients: &[String],
        identity: &FormIdentity,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create outbox {}", self.dir.display()))?;
        let record = OutboxRecord {
            identity: identity.clone(),
            recipients: recipients.to_vec(),
            response: response.clone(),
            submitted_at: OffsetDateTime::now_utc(),
        };
        let path = self.dir.join(format!(
            "{}-{}-{}.json",
            identity.form_class,
            identity.form_id,
            Uuid::new_v4().simple()
        ));
        let payload = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "submission written");
        Ok(())
    }
}
