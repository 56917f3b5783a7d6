use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cursor::Advance;
use crate::error::FieldError;
use crate::loops::LoopFrame;
use crate::template::{FormField, FormTemplate, Qnum, RenderId};

/// Per-session render position and answers.
///
/// Every engine operation takes the state explicitly and mutates it in place;
/// nothing is kept in process-wide counters. The whole value serializes, which
/// is what stage navigation and drafts snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderState {
    /// Template fields with loops expanded in place.
    pub sequence: Vec<FormField>,
    /// Next render id to hand out.
    pub render_cursor: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_branch_target: Option<Qnum>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loop_frames: Vec<LoopFrame>,
    /// Index the cursor resumes from.
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<RenderId>,
    /// Bumped on every user answer; orders answers against background lookups.
    pub revision: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub answered_at: BTreeMap<RenderId, u64>,
    /// Values keyed by response key or qnum, applied when a field renders.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prior_values: BTreeMap<String, String>,
    #[serde(default)]
    pub is_submitted: bool,
    #[serde(default)]
    pub is_draft: bool,
}

/// A value produced by a background lookup for one rendered field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundValue {
    pub render_id: RenderId,
    /// State revision when the lookup was issued.
    pub issued_at: u64,
    pub value: String,
}

/// What happened to a background value at the join point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Applied,
    Stale,
}

impl RenderState {
    pub fn new(template: &FormTemplate) -> Self {
        Self {
            sequence: template.fields.iter().cloned().map(pristine).collect(),
            render_cursor: 1,
            active_branch_target: None,
            loop_frames: Vec::new(),
            position: 0,
            awaiting: None,
            revision: 0,
            answered_at: BTreeMap::new(),
            prior_values: BTreeMap::new(),
            is_submitted: false,
            is_draft: false,
        }
    }

    pub(crate) fn allocate_render_id(&mut self) -> RenderId {
        let id = RenderId(self.render_cursor);
        self.render_cursor += 1;
        id
    }

    /// Rendered instances keyed by render id.
    pub fn render_id_to_field(&self) -> BTreeMap<RenderId, &FormField> {
        self.sequence
            .iter()
            .filter_map(|field| field.render_id.map(|id| (id, field)))
            .collect()
    }

    /// Rendered instances in render order.
    pub fn visible_fields(&self) -> Vec<&FormField> {
        self.render_id_to_field().into_values().collect()
    }

    pub fn field(&self, render_id: RenderId) -> Option<&FormField> {
        self.sequence
            .iter()
            .find(|field| field.render_id == Some(render_id))
    }

    pub(crate) fn index_of(&self, render_id: RenderId) -> Option<usize> {
        self.sequence
            .iter()
            .position(|field| field.render_id == Some(render_id))
    }

    /// Where the session stands without moving the cursor.
    pub fn status(&self) -> Advance {
        match self.awaiting {
            Some(render_id) => Advance::AwaitInput(render_id),
            None if self.position >= self.sequence.len() => Advance::Complete,
            None => Advance::Continue(self.position),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status() == Advance::Complete
    }

    /// Records a user value without touching the render position.
    pub(crate) fn record_answer(&mut self, index: usize, value: String) {
        self.revision += 1;
        let field = &mut self.sequence[index];
        field.current_value = value;
        field.error_message = None;
        if let Some(render_id) = field.render_id {
            self.answered_at.insert(render_id, self.revision);
        }
    }

    /// Joins a late background value. Last answer wins: a value for a field
    /// that was re-rendered or answered after the lookup was issued is dropped.
    pub fn join(&mut self, update: BackgroundValue) -> JoinOutcome {
        let Some(index) = self.index_of(update.render_id) else {
            tracing::debug!(render_id = %update.render_id, "dropping background value for superseded field");
            return JoinOutcome::Stale;
        };
        if self
            .answered_at
            .get(&update.render_id)
            .is_some_and(|answered| *answered > update.issued_at)
        {
            tracing::debug!(render_id = %update.render_id, "dropping background value overtaken by an answer");
            return JoinOutcome::Stale;
        }
        self.sequence[index].current_value = update.value;
        JoinOutcome::Applied
    }

    /// Seeds prior responses fetched in the background. Rendered fields are
    /// joined like any other background value; the rest apply when rendered.
    pub fn join_prior_values(
        &mut self,
        priors: BTreeMap<String, String>,
        issued_at: u64,
    ) -> Vec<(RenderId, JoinOutcome)> {
        let updates: Vec<BackgroundValue> = self
            .sequence
            .iter()
            .filter_map(|field| {
                let render_id = field.render_id?;
                let value = lookup_prior(&priors, field)?;
                Some(BackgroundValue {
                    render_id,
                    issued_at,
                    value: value.clone(),
                })
            })
            .collect();
        let outcomes = updates
            .into_iter()
            .map(|update| {
                let render_id = update.render_id;
                (render_id, self.join(update))
            })
            .collect();
        for (key, value) in priors {
            self.prior_values.entry(key).or_insert(value);
        }
        outcomes
    }

    /// Highlights failing fields and clears highlights on fixed ones.
    pub fn apply_errors(&mut self, errors: &[FieldError]) {
        for field in &mut self.sequence {
            field.error_message = field.render_id.and_then(|render_id| {
                errors
                    .iter()
                    .find(|error| error.render_id == render_id)
                    .map(|error| error.message.clone())
            });
        }
    }

    /// Value a field starts with when rendered.
    pub(crate) fn initial_value(&self, field: &FormField) -> String {
        lookup_prior(&self.prior_values, field)
            .cloned()
            .or_else(|| field.default_value.clone())
            .unwrap_or_default()
    }
}

fn lookup_prior<'a>(priors: &'a BTreeMap<String, String>, field: &FormField) -> Option<&'a String> {
    priors
        .get(&field.response_key())
        .or_else(|| priors.get(&field.qnum.to_string()))
}

fn pristine(mut field: FormField) -> FormField {
    field.reset_runtime();
    field.iteration_path.clear();
    field
}
