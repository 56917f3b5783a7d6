use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::template::{Qnum, RenderId};

/// Structural and session errors raised by the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("template '{form_id}' is invalid: {reason}")]
    InvalidTemplate { form_id: String, reason: String },
    #[error("branch target {target} (from qnum {from}) matches no field")]
    UnresolvedBranchTarget { target: Qnum, from: Qnum },
    #[error("loop end {end} (head qnum {head}) matches no following field")]
    UnresolvedLoopEnd { end: Qnum, head: Qnum },
    #[error("no rendered field with id {0}")]
    UnknownRenderId(RenderId),
    #[error("stage is read-only")]
    ReadOnlyStage,
    #[error("no such stage")]
    StageUnavailable,
    #[error("default interpolation failed: {0}")]
    Interpolation(String),
}

impl FormError {
    pub(crate) fn invalid(form_id: &str, reason: impl Into<String>) -> Self {
        FormError::InvalidTemplate {
            form_id: form_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors after which nothing further can render.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FormError::InvalidTemplate { .. }
                | FormError::UnresolvedBranchTarget { .. }
                | FormError::UnresolvedLoopEnd { .. }
                | FormError::Interpolation(_)
        )
    }
}

/// Recoverable per-field validation failure reported by the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldError {
    pub render_id: RenderId,
    pub qnum: Qnum,
    pub field_id: String,
    pub key: String,
    pub message: String,
    pub code: String,
}
