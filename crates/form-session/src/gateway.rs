use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use form_spec::{FlatResponse, FormField, FormIdentity, FormTemplate};

/// Dispatch context a form is filled in for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchKey {
    pub customer_id: String,
    pub vehicle_id: String,
    pub dispatch_id: String,
    pub stop_id: String,
    pub action_id: String,
}

/// Where templates come from.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch_template(&self, form_id: &str, form_class: &str) -> Result<FormTemplate>;
}

/// Earlier answers for the same dispatch action, keyed by response key or qnum.
#[async_trait]
pub trait PriorResponseSource: Send + Sync {
    async fn fetch_prior_responses(&self, key: &DispatchKey) -> Result<BTreeMap<String, String>>;
}

/// Displays one field and yields the user's value, or `None` when the user
/// has not answered yet.
#[async_trait]
pub trait FieldRenderer: Send + Sync {
    async fn render(&self, field: &FormField, read_only: bool) -> Result<Option<String>>;
}

#[async_trait]
pub trait DraftGateway: Send + Sync {
    async fn save(&self, response: &FlatResponse, identity: &FormIdentity) -> Result<()>;
}

#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    async fn submit(
        &self,
        response: &FlatResponse,
        recipients: &[String],
        identity: &FormIdentity,
    ) -> Result<()>;
}

/// Prior source for sessions that start blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriors;

#[async_trait]
impl PriorResponseSource for NoPriors {
    async fn fetch_prior_responses(&self, _key: &DispatchKey) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }
}
