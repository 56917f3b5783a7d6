#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;

use form_session::{
    DispatchKey, FieldRenderer, Gateways, MemoryDraftStore, PriorResponseSource,
    SubmissionGateway, TemplateSource,
};
use form_spec::{FlatResponse, FormField, FormIdentity, FormTemplate};

#[derive(Default)]
pub struct StaticTemplates {
    templates: BTreeMap<(String, String), FormTemplate>,
}

impl StaticTemplates {
    pub fn with(mut self, template: FormTemplate) -> Self {
        let key = (
            template.identity.form_id.clone(),
            template.identity.form_class.clone(),
        );
        self.templates.insert(key, template);
        self
    }
}

#[async_trait]
impl TemplateSource for StaticTemplates {
    async fn fetch_template(&self, form_id: &str, form_class: &str) -> Result<FormTemplate> {
        match self
            .templates
            .get(&(form_id.to_string(), form_class.to_string()))
        {
            Some(template) => Ok(template.clone()),
            None => bail!("no template {form_class}/{form_id}"),
        }
    }
}

#[derive(Default)]
pub struct StaticPriors(pub BTreeMap<String, String>);

#[async_trait]
impl PriorResponseSource for StaticPriors {
    async fn fetch_prior_responses(&self, _key: &DispatchKey) -> Result<BTreeMap<String, String>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct Outbox {
    pub sent: Mutex<Vec<(FlatResponse, Vec<String>, FormIdentity)>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<(FlatResponse, Vec<String>, FormIdentity)> {
        self.sent.lock().expect("outbox lock").clone()
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
        self.sent.lock().expect("outbox lock").push((
            response.clone(),
            recipients.to_vec(),
            identity.clone(),
        ));
        Ok(())
    }
}

/// Answers by field id and records every presentation.
#[derive(Default)]
pub struct ScriptedRenderer {
    answers: BTreeMap<String, String>,
    pub seen: Mutex<Vec<(String, bool)>>,
}

impl ScriptedRenderer {
    pub fn new(answers: &[(&str, &str)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(id, value)| (id.to_string(), value.to_string()))
                .collect(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<(String, bool)> {
        self.seen.lock().expect("renderer lock").clone()
    }
}

#[async_trait]
impl FieldRenderer for ScriptedRenderer {
    async fn render(&self, field: &FormField, read_only: bool) -> Result<Option<String>> {
        self.seen
            .lock()
            .expect("renderer lock")
            .push((field.field_id.clone(), read_only));
        Ok(self.answers.get(&field.field_id).cloned())
    }
}

/// Hands back whatever value each field is shown with.
#[derive(Default)]
pub struct EchoRenderer {
    pub seen: Mutex<Vec<String>>,
}

impl EchoRenderer {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().expect("renderer lock").clone()
    }
}

#[async_trait]
impl FieldRenderer for EchoRenderer {
    async fn render(&self, field: &FormField, read_only: bool) -> Result<Option<String>> {
        self.seen
            .lock()
            .expect("renderer lock")
            .push(field.field_id.clone());
        Ok((!read_only).then(|| field.current_value.clone()))
    }
}

pub struct Harness {
    pub outbox: Arc<Outbox>,
    pub drafts: Arc<MemoryDraftStore>,
    pub gateways: Gateways,
}

pub fn harness(templates: StaticTemplates, priors: BTreeMap<String, String>) -> Harness {
    let outbox = Arc::new(Outbox::default());
    let drafts = Arc::new(MemoryDraftStore::new());
    let gateways = Gateways {
        templates: Arc::new(templates),
        priors: Arc::new(StaticPriors(priors)),
        drafts: drafts.clone(),
        submissions: outbox.clone(),
    };
    Harness {
        outbox,
        drafts,
        gateways,
    }
}

pub fn dispatch() -> DispatchKey {
    DispatchKey {
        customer_id: "acme".into(),
        vehicle_id: "TRK-9".into(),
        dispatch_id: "DSP-1".into(),
        stop_id: "S-3".into(),
        action_id: "A-1".into(),
    }
}
