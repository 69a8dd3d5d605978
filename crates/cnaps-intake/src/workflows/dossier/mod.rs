//! Dossier lifecycle: document intake, PDF normalization, review statuses,
//! applicant notifications, and the external CNAPS status probe.

pub mod cnaps;
pub(crate) mod convert;
pub mod documents;
pub mod domain;
pub mod json_store;
pub mod notify;
pub mod poller;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use cnaps::{CnapsProbe, CnapsStatus};
pub use documents::{DocumentError, DocumentStore};
pub use domain::{
    Applicant, CaseKey, DocumentCategory, Dossier, DossierId, DossierStatus, DossierSubmission,
    DossierView, EmailAudit, EmailKind, EmailOutcome, StoredFileRef, Upload,
};
pub use json_store::JsonFileRepository;
pub use notify::{NotificationOutcome, Notifier, SmtpNotifier};
pub use repository::{DossierRepository, DossierUpdate, NewDossier, RepositoryError};
pub use router::dossier_router;
pub use service::{DossierService, DossierServiceError, ValidationError};
