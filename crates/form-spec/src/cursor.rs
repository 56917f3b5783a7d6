use crate::branch::BranchResolver;
use crate::error::FormError;
use crate::loops::{LoopExpander, LoopFrame, parse_iterations};
use crate::state::RenderState;
use crate::template::RenderId;

/// Result of one cursor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Rendered one field; resume at the given index.
    Continue(usize),
    /// Halted on a field whose answer decides what comes next.
    AwaitInput(RenderId),
    /// Nothing left to render.
    Complete,
}

/// Render-position state machine. Stateless itself: every call takes the
/// session's [`RenderState`], so one cursor can serve any number of stages.
#[derive(Debug, Default)]
pub struct SequenceCursor {
    resolver: BranchResolver,
    expander: LoopExpander,
}

impl SequenceCursor {
    pub fn new(expander: LoopExpander) -> Self {
        Self {
            resolver: BranchResolver,
            expander,
        }
    }

    /// Renders from the top of the sequence until input is needed.
    pub fn start(&self, state: &mut RenderState) -> Result<Advance, FormError> {
        self.pump(state, 0)
    }

    /// Renders the field at `index` and reports where to go next.
    pub fn step(&self, state: &mut RenderState, index: usize) -> Result<Advance, FormError> {
        if index >= state.sequence.len() {
            state.position = state.sequence.len();
            state.awaiting = None;
            return Ok(Advance::Complete);
        }

        let render_id = state.allocate_render_id();
        let value = state.initial_value(&state.sequence[index]);
        let field = &mut state.sequence[index];
        if state.active_branch_target == Some(field.qnum) {
            state.active_branch_target = None;
        }
        field.render_id = Some(render_id);
        field.current_value = value;
        field.error_message = None;

        if let Some(iteration) = field.iteration_path.last().copied()
            && let Some(frame) = state
                .loop_frames
                .iter_mut()
                .rev()
                .find(|frame| frame.contains(index))
        {
            frame.iteration_index = iteration;
            frame.iterations_remaining = frame.iterations.saturating_sub(iteration);
        }

        if field.awaits_input() {
            state.position = index;
            state.awaiting = Some(render_id);
            return Ok(Advance::AwaitInput(render_id));
        }
        state.position = index + 1;
        Ok(Advance::Continue(index + 1))
    }

    /// Steps until the cursor halts or completes.
    pub fn pump(&self, state: &mut RenderState, from: usize) -> Result<Advance, FormError> {
        state.awaiting = None;
        let mut index = from;
        loop {
            match self.step(state, index)? {
                Advance::Continue(next) => index = next,
                halted => return Ok(halted),
            }
        }
    }

    /// Applies a user answer.
    ///
    /// Plain fields only record the value. Branch points and loop heads
    /// invalidate everything rendered after them and re-route the cursor,
    /// unless the cursor already moved past them and the value is unchanged.
    pub fn answer(
        &self,
        state: &mut RenderState,
        render_id: RenderId,
        value: impl Into<String>,
    ) -> Result<Advance, FormError> {
        let value = value.into();
        let index = state
            .index_of(render_id)
            .ok_or(FormError::UnknownRenderId(render_id))?;
        let field = &state.sequence[index];
        let confirmed = state.awaiting != Some(render_id) && field.current_value == value;
        if !field.awaits_input() || confirmed {
            state.record_answer(index, value);
            return Ok(state.status());
        }

        self.invalidate_after(state, render_id);
        let index = state
            .index_of(render_id)
            .ok_or(FormError::UnknownRenderId(render_id))?;
        state.record_answer(index, value.clone());
        state.awaiting = None;
        state.position = index + 1;

        let field = &state.sequence[index];
        if field.is_loop_head() {
            let max = field.constraint.as_ref().and_then(|constraint| constraint.max);
            return match parse_iterations(&value, max) {
                Ok(iterations) => {
                    self.expand_loop(state, index, iterations)?;
                    self.pump(state, index + 1)
                }
                Err(message) => {
                    state.sequence[index].error_message = Some(message);
                    state.position = index;
                    state.awaiting = Some(render_id);
                    Ok(Advance::AwaitInput(render_id))
                }
            };
        }

        match field.chosen_target(&value) {
            Some(target) => {
                let from = field.qnum;
                let resume = self.resolver.resolve_jump(&state.sequence, from, target)?;
                if resume <= index {
                    return Err(FormError::UnresolvedBranchTarget { target, from });
                }
                tracing::debug!(from, target, resume, "branch jump");
                state.active_branch_target = Some(target);
                self.pump(state, resume)
            }
            None => self.pump(state, index + 1),
        }
    }

    /// Drops every instance rendered after `render_id` and undoes loop
    /// expansions started at or after it.
    fn invalidate_after(&self, state: &mut RenderState, render_id: RenderId) {
        while state
            .loop_frames
            .last()
            .is_some_and(|frame| frame.head_render_id >= render_id)
        {
            if let Some(frame) = state.loop_frames.pop() {
                collapse(state, frame);
            }
        }
        for field in &mut state.sequence {
            if field.render_id.is_some_and(|id| id > render_id) {
                field.reset_runtime();
            }
        }
        state.answered_at.retain(|id, _| *id <= render_id);
        state.active_branch_target = None;
        state.awaiting = None;
    }

    fn expand_loop(
        &self,
        state: &mut RenderState,
        head_index: usize,
        iterations: u32,
    ) -> Result<(), FormError> {
        let head = &state.sequence[head_index];
        let head_qnum = head.qnum;
        let Some(end) = head.loop_end_qnum else {
            return Ok(());
        };
        let Some(head_render_id) = head.render_id else {
            return Ok(());
        };
        let end_index = self
            .resolver
            .resolve_loop_end(&state.sequence, head_index, end)?;

        let range_start = head_index + 1;
        let body: Vec<_> = state.sequence[range_start..=end_index].to_vec();
        let copies = self.expander.expand(&body, iterations)?;
        let range_end = range_start + copies.len();
        let removed = body.len();
        let added = copies.len();

        for frame in &mut state.loop_frames {
            if frame.contains(head_index) {
                frame.range_end = frame.range_end + added - removed;
            }
        }
        state.sequence.splice(range_start..=end_index, copies);
        tracing::debug!(head_qnum, iterations, added, "expanded loop");

        state.loop_frames.push(LoopFrame {
            head_render_id,
            head_qnum,
            range_start,
            range_end,
            iterations,
            iteration_index: 0,
            iterations_remaining: iterations,
            body,
        });
        Ok(())
    }
}

/// Restores a frame's original body in place of its expanded copies.
fn collapse(state: &mut RenderState, frame: LoopFrame) {
    let added = frame.range_end - frame.range_start;
    let removed = frame.body.len();
    for outer in &mut state.loop_frames {
        if outer.range_start <= frame.range_start && frame.range_end <= outer.range_end {
            outer.range_end = outer.range_end + removed - added;
        }
    }
    state
        .sequence
        .splice(frame.range_start..frame.range_end, frame.body);
}
