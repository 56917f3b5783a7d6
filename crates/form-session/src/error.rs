use form_spec::{FieldError, FormError};
use thiserror::Error;

/// Everything a hosting screen can see go wrong. Collaborator failures are
/// folded into `CouldNotDisplay`; they never surface raw.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("form cannot be shown: {0}")]
    InvalidForm(#[from] FormError),
    #[error("{} field(s) need attention", .0.len())]
    Validation(Vec<FieldError>),
    #[error("form could not be displayed: {reason}")]
    CouldNotDisplay { reason: String },
    #[error("form was already submitted")]
    AlreadySubmitted,
    #[error("session was cancelled")]
    Cancelled,
}

impl SessionError {
    pub(crate) fn display(err: anyhow::Error) -> Self {
        SessionError::CouldNotDisplay {
            reason: format!("{err:#}"),
        }
    }
}
