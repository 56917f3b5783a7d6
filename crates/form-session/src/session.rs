use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use form_spec::{
    Advance, AutoSource, BackgroundValue, DigestAttachments, JoinOutcome, NavigationSignal,
    Reduction, RenderId, ReplyKind, ReplyLinkCoordinator, ReplyPolicy, ResponseReducer,
    SequenceCursor, SessionAutoValues, reduce,
};

use crate::error::SessionError;
use crate::gateway::{
    DispatchKey, DraftGateway, FieldRenderer, PriorResponseSource, SubmissionGateway,
    TemplateSource,
};

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct Gateways {
    pub templates: Arc<dyn TemplateSource>,
    pub priors: Arc<dyn PriorResponseSource>,
    pub drafts: Arc<dyn DraftGateway>,
    pub submissions: Arc<dyn SubmissionGateway>,
}

/// What to open: the action's reply policy and its dispatch context.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub policy: ReplyPolicy,
    pub dispatch: DispatchKey,
    /// Host-supplied values for system-computed fields, e.g. the driver id.
    pub auto: BTreeMap<AutoSource, String>,
}

impl OpenRequest {
    pub fn new(policy: ReplyPolicy, dispatch: DispatchKey) -> Self {
        Self {
            policy,
            dispatch,
            auto: BTreeMap::new(),
        }
    }

    pub fn with_auto(mut self, source: AutoSource, value: impl Into<String>) -> Self {
        self.auto.insert(source, value.into());
        self
    }
}

struct PendingLookup {
    stage: usize,
    render_id: RenderId,
    issued_at: u64,
    handle: JoinHandle<anyhow::Result<String>>,
}

struct PriorLookup {
    issued_at: u64,
    handle: JoinHandle<anyhow::Result<BTreeMap<String, String>>>,
}

/// One driver interaction with a linked set of forms.
pub struct FormSession {
    id: Uuid,
    span: tracing::Span,
    coordinator: ReplyLinkCoordinator,
    reducer: ResponseReducer,
    gateways: Gateways,
    prior_lookup: Option<PriorLookup>,
    pending: Vec<PendingLookup>,
    presented: BTreeSet<(usize, RenderId)>,
    submitted: bool,
    cancelled: bool,
}

impl FormSession {
    /// Fetches the templates, starts the prior-response lookup and enters the
    /// first stage.
    pub async fn open(request: OpenRequest, gateways: Gateways) -> Result<Self, SessionError> {
        let OpenRequest {
            policy,
            dispatch,
            auto,
        } = request;
        let primary_id = policy
            .primary
            .clone()
            .ok_or_else(|| SessionError::CouldNotDisplay {
                reason: "reply policy names no primary form".into(),
            })?;
        let id = Uuid::new_v4();
        let span = tracing::info_span!("form_session", session_id = %id, form = %primary_id);

        let reply_id = match policy.kind {
            ReplyKind::ReplyWithNew => policy.reply.clone(),
            _ => None,
        };
        let templates = gateways.templates.clone();
        let fetch_reply = async {
            match &reply_id {
                Some(reply) => templates
                    .fetch_template(&reply.form_id, &reply.form_class)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };
        let (primary, reply) = futures::try_join!(
            gateways
                .templates
                .fetch_template(&primary_id.form_id, &primary_id.form_class),
            fetch_reply,
        )
        .map_err(SessionError::display)?;

        let mut coordinator =
            ReplyLinkCoordinator::new(policy, primary, reply, SequenceCursor::default())?;

        let captured = [
            (AutoSource::Vehicle, &dispatch.vehicle_id),
            (AutoSource::Dispatch, &dispatch.dispatch_id),
            (AutoSource::Stop, &dispatch.stop_id),
            (AutoSource::Action, &dispatch.action_id),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .fold(SessionAutoValues::now(), |values, (source, value)| {
            values.with(source, value.clone())
        });
        let captured = auto
            .into_iter()
            .fold(captured, |values, (source, value)| values.with(source, value));
        let reducer = ResponseReducer::new(captured, DigestAttachments);

        let priors = gateways.priors.clone();
        let handle = tokio::spawn(
            async move { priors.fetch_prior_responses(&dispatch).await }.instrument(span.clone()),
        );
        coordinator.enter(0)?;
        span.in_scope(|| tracing::info!(stages = coordinator.stages().len(), "session opened"));

        Ok(Self {
            id,
            span,
            coordinator,
            reducer,
            gateways,
            prior_lookup: Some(PriorLookup {
                issued_at: 0,
                handle,
            }),
            pending: Vec::new(),
            presented: BTreeSet::new(),
            submitted: false,
            cancelled: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn coordinator(&self) -> &ReplyLinkCoordinator {
        &self.coordinator
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// The response was synced elsewhere; stages entered from now on are
    /// read-only and completion submits nothing.
    pub fn mark_synced(&mut self) {
        self.coordinator.mark_synced();
    }

    /// Current reduction of one stage.
    pub fn reduce_stage(&self, index: usize) -> Option<Reduction> {
        let stage = self.coordinator.stages().get(index)?;
        Some(reduce(&self.reducer, &stage.state, &stage.template))
    }

    /// Applies an answer to the active stage.
    pub fn answer(
        &mut self,
        render_id: RenderId,
        value: impl Into<String>,
    ) -> Result<Advance, SessionError> {
        if self.cancelled {
            return Err(SessionError::Cancelled);
        }
        Ok(self.coordinator.answer(render_id, value)?)
    }

    /// Starts a background default lookup for a rendered field of the active
    /// stage. The value is joined by [`FormSession::settle_background`].
    pub fn spawn_default_lookup<F>(&mut self, render_id: RenderId, lookup: F)
    where
        F: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let stage = self.coordinator.active_index();
        let issued_at = self.coordinator.active_stage().state.revision;
        let handle = tokio::spawn(lookup.instrument(self.span.clone()));
        self.pending.push(PendingLookup {
            stage,
            render_id,
            issued_at,
            handle,
        });
    }

    /// Waits for outstanding lookups and joins their values. Values whose
    /// field was superseded or answered meanwhile are dropped.
    pub async fn settle_background(&mut self) -> Vec<(RenderId, JoinOutcome)> {
        let mut outcomes = Vec::new();

        if let Some(lookup) = self.prior_lookup.take() {
            match lookup.handle.await {
                Ok(Ok(priors)) => {
                    if let Some(stage) = self.coordinator.stage_mut(0) {
                        outcomes.extend(stage.state.join_prior_values(priors, lookup.issued_at));
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!(parent: &self.span, error = %err, "prior responses unavailable")
                }
                Err(err) => tracing::warn!(parent: &self.span, error = %err, "prior lookup aborted"),
            }
        }

        let (tickets, handles): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|lookup| ((lookup.stage, lookup.render_id, lookup.issued_at), lookup.handle))
            .unzip();
        for ((stage, render_id, issued_at), result) in tickets.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(Ok(value)) => {
                    if let Some(stage) = self.coordinator.stage_mut(stage) {
                        let outcome = stage.state.join(BackgroundValue {
                            render_id,
                            issued_at,
                            value,
                        });
                        outcomes.push((render_id, outcome));
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!(parent: &self.span, %render_id, error = %err, "default lookup failed")
                }
                Err(err) => {
                    tracing::warn!(parent: &self.span, %render_id, error = %err, "default lookup aborted")
                }
            }
        }
        outcomes
    }

    /// Presents fields in render order until the session needs more input or
    /// every stage is done. Completion submits each non-mirrored stage once.
    pub async fn drive(
        &mut self,
        renderer: &dyn FieldRenderer,
    ) -> Result<NavigationSignal, SessionError> {
        let span = self.span.clone();
        self.drive_stages(renderer).instrument(span).await
    }

    async fn drive_stages(
        &mut self,
        renderer: &dyn FieldRenderer,
    ) -> Result<NavigationSignal, SessionError> {
        if self.cancelled {
            return Err(SessionError::Cancelled);
        }
        if self.submitted {
            return Err(SessionError::AlreadySubmitted);
        }
        self.settle_background().await;
        self.coordinator.resume_synced()?;

        loop {
            let index = self.coordinator.active_index();
            let stage = self.coordinator.active_stage();
            let kind = stage.kind;
            let read_only = stage.read_only;
            let next = stage.state.visible_fields().into_iter().find_map(|field| {
                field
                    .render_id
                    .filter(|render_id| !self.presented.contains(&(index, *render_id)))
                    .map(|render_id| (render_id, field.clone()))
            });

            if let Some((render_id, field)) = next {
                self.presented.insert((index, render_id));
                let value = renderer
                    .render(&field, read_only)
                    .await
                    .map_err(SessionError::display)?;
                match value {
                    Some(value) if !read_only => {
                        if let Err(err) = self.coordinator.answer(render_id, value) {
                            if err.is_structural() {
                                tracing::error!(error = %err, "form cannot continue");
                                return Ok(NavigationSignal::invalid(&err));
                            }
                            return Err(err.into());
                        }
                    }
                    None if !read_only && field.awaits_input() => {
                        self.presented.remove(&(index, render_id));
                        return Ok(NavigationSignal::Continue(kind));
                    }
                    _ => {}
                }
                continue;
            }

            match self.coordinator.active_stage().state.status() {
                Advance::Complete => {}
                Advance::AwaitInput(render_id) => {
                    self.presented.remove(&(index, render_id));
                    return Ok(NavigationSignal::Continue(kind));
                }
                Advance::Continue(_) => return Ok(NavigationSignal::Continue(kind)),
            }

            if !read_only {
                self.validate_active()?;
            }
            match self.coordinator.complete_active()? {
                NavigationSignal::Complete => {
                    self.submit_all().await?;
                    return Ok(NavigationSignal::Complete);
                }
                NavigationSignal::Continue(next) => {
                    tracing::debug!(stage = ?next, "entering next stage");
                }
                other => return Ok(other),
            }
        }
    }

    fn validate_active(&mut self) -> Result<(), SessionError> {
        let index = self.coordinator.active_index();
        let stage = self.coordinator.active_stage_mut();
        let reduction = reduce(&self.reducer, &stage.state, &stage.template);
        stage.state.apply_errors(&reduction.errors);
        if reduction.is_submittable() {
            return Ok(());
        }
        for error in &reduction.errors {
            self.presented.remove(&(index, error.render_id));
        }
        tracing::info!(errors = reduction.errors.len(), "stage failed validation");
        Err(SessionError::Validation(reduction.errors))
    }

    async fn submit_all(&mut self) -> Result<(), SessionError> {
        if self.coordinator.is_synced() {
            self.submitted = true;
            return Ok(());
        }
        let submissions = self.gateways.submissions.clone();
        for index in 0..self.coordinator.stages().len() {
            let stage = &self.coordinator.stages()[index];
            if stage.mirrors_primary() || stage.state.is_submitted {
                continue;
            }
            let reduction = reduce(&self.reducer, &stage.state, &stage.template);
            submissions
                .submit(
                    &reduction.response,
                    &stage.template.predefined_recipients,
                    &stage.template.identity,
                )
                .await
                .map_err(SessionError::display)?;
            tracing::info!(form = %stage.template.identity, fields = reduction.response.len(), "submitted");
            if let Some(stage) = self.coordinator.stage_mut(index) {
                stage.state.is_submitted = true;
                stage.state.is_draft = false;
            }
        }
        self.submitted = true;
        Ok(())
    }

    /// Saves every unsubmitted stage that has rendered something. Returns
    /// immediately; the save runs in the background.
    pub fn snapshot_draft(&mut self) -> JoinHandle<()> {
        let mut drafts = Vec::new();
        for index in 0..self.coordinator.stages().len() {
            let Some(stage) = self.coordinator.stage_mut(index) else {
                continue;
            };
            if stage.mirrors_primary()
                || stage.state.is_submitted
                || stage.state.visible_fields().is_empty()
            {
                continue;
            }
            stage.state.is_draft = true;
            let reduction = reduce(&self.reducer, &stage.state, &stage.template);
            drafts.push((reduction.response, stage.template.identity.clone()));
        }

        let gateway = self.gateways.drafts.clone();
        tokio::spawn(
            async move {
                for (response, identity) in drafts {
                    match gateway.save(&response, &identity).await {
                        Ok(()) => tracing::debug!(form = %identity, "draft saved"),
                        Err(err) => tracing::warn!(form = %identity, error = %err, "draft save failed"),
                    }
                }
            }
            .instrument(self.span.clone()),
        )
    }

    /// Returns to the previous stage with its state intact; only its
    /// unanswered fields are presented again. On the first
    /// stage the session is cancelled and a draft is written unless it was
    /// already submitted.
    pub async fn back(&mut self) -> Result<NavigationSignal, SessionError> {
        if self.cancelled {
            return Err(SessionError::Cancelled);
        }
        if let Some(kind) = self.coordinator.back() {
            let index = self.coordinator.active_index();
            let answered = &self.coordinator.active_stage().state.answered_at;
            self.presented
                .retain(|(stage, render_id)| *stage != index || answered.contains_key(render_id));
            return Ok(NavigationSignal::Continue(kind));
        }

        self.cancelled = true;
        if !self.submitted
            && let Err(err) = self.snapshot_draft().await
        {
            tracing::warn!(parent: &self.span, error = %err, "draft snapshot aborted");
        }
        tracing::info!(parent: &self.span, "session cancelled");
        Ok(NavigationSignal::Cancelled)
    }
}

impl std::fmt::Debug for FormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSession")
            .field("id", &self.id)
            .field("active", &self.coordinator.active_index())
            .field("submitted", &self.submitted)
            .finish_non_exhaustive()
    }
}
