use serde::{Deserialize, Serialize};

use crate::cursor::{Advance, SequenceCursor};
use crate::error::FormError;
use crate::state::RenderState;
use crate::template::{FormTemplate, RenderId, ReplyKind, ReplyPolicy};
use crate::validate::check_template;

/// Role of a stage in a linked-form session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Primary,
    Reply,
    Freeform,
}

/// Signal handed to the hosting screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationSignal {
    Continue(StageKind),
    Complete,
    InvalidForm { reason: String },
    Cancelled,
}

impl NavigationSignal {
    pub fn invalid(error: &FormError) -> Self {
        NavigationSignal::InvalidForm {
            reason: error.to_string(),
        }
    }
}

/// How a stage obtains its answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSource {
    /// Runs its own advance cycle.
    Own,
    /// Copies the primary's answers read-only.
    SameAsPrimary,
    /// Editable copy of the primary's answers.
    MirrorOfPrimary,
}

/// One linked form and its preserved render state.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub kind: StageKind,
    pub source: StageSource,
    pub template: FormTemplate,
    pub state: RenderState,
    pub read_only: bool,
    pub entered: bool,
}

impl Stage {
    fn new(kind: StageKind, source: StageSource, template: FormTemplate) -> Self {
        let state = RenderState::new(&template);
        Self {
            kind,
            source,
            template,
            state,
            read_only: false,
            entered: false,
        }
    }

    /// Stages whose response duplicates the primary's submission.
    pub fn mirrors_primary(&self) -> bool {
        self.source == StageSource::SameAsPrimary
    }
}

/// Decides which linked templates are shown and in what order. Exactly one
/// stage is active at a time; each keeps its own state so navigating back
/// restores it exactly.
#[derive(Debug)]
pub struct ReplyLinkCoordinator {
    policy: ReplyPolicy,
    stages: Vec<Stage>,
    active: usize,
    synced: bool,
    cursor: SequenceCursor,
}

impl ReplyLinkCoordinator {
    pub fn new(
        policy: ReplyPolicy,
        primary: FormTemplate,
        reply: Option<FormTemplate>,
        cursor: SequenceCursor,
    ) -> Result<Self, FormError> {
        check_template(&primary)?;
        let stages = match policy.kind {
            ReplyKind::NoReply => {
                let mut stages = vec![Stage::new(
                    StageKind::Primary,
                    StageSource::Own,
                    primary.clone(),
                )];
                if primary.is_driver_editable {
                    stages.push(Stage::new(
                        StageKind::Reply,
                        StageSource::MirrorOfPrimary,
                        primary,
                    ));
                }
                stages
            }
            ReplyKind::ReplyWithSame => vec![
                Stage::new(StageKind::Primary, StageSource::Own, primary.clone()),
                Stage::new(StageKind::Reply, StageSource::SameAsPrimary, primary),
            ],
            ReplyKind::ReplyWithNew => {
                let reply = reply.ok_or_else(|| {
                    FormError::invalid(
                        &primary.identity.form_id,
                        "reply policy requires a reply template",
                    )
                })?;
                check_template(&reply)?;
                vec![
                    Stage::new(StageKind::Primary, StageSource::Own, primary),
                    Stage::new(StageKind::Reply, StageSource::Own, reply),
                ]
            }
            ReplyKind::ReplyWithFreeform => {
                let identity = policy.reply.clone().unwrap_or(primary.identity);
                vec![Stage::new(
                    StageKind::Freeform,
                    StageSource::Own,
                    FormTemplate::freeform(identity),
                )]
            }
        };

        Ok(Self {
            policy,
            stages,
            active: 0,
            synced: false,
            cursor,
        })
    }

    pub fn policy(&self) -> &ReplyPolicy {
        &self.policy
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_stage(&self) -> &Stage {
        &self.stages[self.active]
    }

    pub fn active_stage_mut(&mut self) -> &mut Stage {
        &mut self.stages[self.active]
    }

    pub fn stage_mut(&mut self, index: usize) -> Option<&mut Stage> {
        self.stages.get_mut(index)
    }

    pub fn cursor(&self) -> &SequenceCursor {
        &self.cursor
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Marks the response as already synced; stages entered from now on show
    /// their prior values read-only.
    pub fn mark_synced(&mut self) {
        self.synced = true;
        for stage in &mut self.stages {
            stage.read_only = true;
        }
    }

    /// Activates `index`. A stage entered before comes back exactly as it was
    /// left; a fresh one is prepared and advanced.
    pub fn enter(&mut self, index: usize) -> Result<Advance, FormError> {
        if index >= self.stages.len() {
            return Err(FormError::StageUnavailable);
        }
        self.active = index;

        if self.stages[index].entered {
            return Ok(self.stages[index].state.status());
        }

        let primary_state = self.stages[0].state.clone();
        let synced = self.synced;
        let stage = &mut self.stages[index];
        stage.entered = true;
        match stage.source {
            StageSource::SameAsPrimary => {
                stage.state = primary_state;
                stage.read_only = true;
                Ok(stage.state.status())
            }
            StageSource::MirrorOfPrimary => {
                stage.state = primary_state;
                stage.state.is_submitted = false;
                Ok(stage.state.status())
            }
            StageSource::Own if synced => {
                let advance = self.cursor.start(&mut stage.state)?;
                replay(&self.cursor, &mut stage.state, advance)
            }
            StageSource::Own => self.cursor.start(&mut stage.state),
        }
    }

    /// Carries a synced active stage past halting fields whose values arrived
    /// after it was entered, e.g. priors joined in the background.
    pub fn resume_synced(&mut self) -> Result<Advance, FormError> {
        let stage = &mut self.stages[self.active];
        if !self.synced || stage.source != StageSource::Own {
            return Ok(stage.state.status());
        }
        let advance = stage.state.status();
        replay(&self.cursor, &mut stage.state, advance)
    }

    /// Applies an answer to the active stage.
    pub fn answer(
        &mut self,
        render_id: RenderId,
        value: impl Into<String>,
    ) -> Result<Advance, FormError> {
        let stage = &mut self.stages[self.active];
        if stage.read_only {
            return Err(FormError::ReadOnlyStage);
        }
        self.cursor.answer(&mut stage.state, render_id, value)
    }

    /// Moves past the active stage once it has nothing left to render.
    pub fn complete_active(&mut self) -> Result<NavigationSignal, FormError> {
        let stage = self.active_stage();
        if !stage.state.is_complete() {
            return Ok(NavigationSignal::Continue(stage.kind));
        }
        let next = self.active + 1;
        if next >= self.stages.len() {
            return Ok(NavigationSignal::Complete);
        }
        self.enter(next)?;
        Ok(NavigationSignal::Continue(self.stages[next].kind))
    }

    /// Steps back one stage, restoring its state. `None` on the first stage.
    pub fn back(&mut self) -> Option<StageKind> {
        if self.active == 0 {
            return None;
        }
        self.active -= 1;
        Some(self.stages[self.active].kind)
    }
}

/// Feeds each halting field its already-present value, so a synced response
/// displays the path it was answered along.
fn replay(
    cursor: &SequenceCursor,
    state: &mut RenderState,
    mut advance: Advance,
) -> Result<Advance, FormError> {
    while let Advance::AwaitInput(render_id) = advance {
        let Some(value) = state
            .field(render_id)
            .map(|field| field.current_value.clone())
            .filter(|value| !value.is_empty())
        else {
            break;
        };
        let next = cursor.answer(state, render_id, value)?;
        if next == advance {
            break;
        }
        advance = next;
    }
    Ok(advance)
}
