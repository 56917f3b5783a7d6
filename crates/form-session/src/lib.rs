#![allow(missing_docs)]

pub mod drafts;
pub mod error;
pub mod gateway;
pub mod session;

pub use drafts::{DraftRecord, FileDraftStore, MemoryDraftStore};
pub use error::SessionError;
pub use gateway::{
    DispatchKey, DraftGateway, FieldRenderer, NoPriors, PriorResponseSource, SubmissionGateway,
    TemplateSource,
};
pub use session::{FormSession, Gateways, OpenRequest};
