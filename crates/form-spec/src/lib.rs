#![allow(missing_docs)]

pub mod branch;
pub mod cursor;
pub mod error;
pub mod interpolate;
pub mod loops;
pub mod reduce;
pub mod reply;
pub mod state;
pub mod template;
pub mod validate;

pub use branch::BranchResolver;
pub use cursor::{Advance, SequenceCursor};
pub use error::{FieldError, FormError};
pub use interpolate::{DefaultInterpolator, IterationContext, ResolutionMode};
pub use loops::{LoopExpander, LoopFrame, MAX_LOOP_ITERATIONS};
pub use reduce::{
    ATTACHMENT_PREFIX, AttachmentResolver, AutoValues, DigestAttachments, FlatResponse, Reduction,
    ResponseReducer, SessionAutoValues,
};
pub use reply::{NavigationSignal, ReplyLinkCoordinator, Stage, StageKind, StageSource};
pub use state::{BackgroundValue, JoinOutcome, RenderState};
pub use template::{
    AutoSource, Constraint, FormChoice, FormField, FormIdentity, FormTemplate, Qnum,
    QuestionType, RenderId, ReplyKind, ReplyPolicy, template_schema,
};
pub use validate::check_template;

/// Reduces a stage's render state against its template.
pub fn reduce(reducer: &ResponseReducer, state: &RenderState, template: &FormTemplate) -> Reduction {
    reducer.reduce(&state.render_id_to_field(), template)
}
