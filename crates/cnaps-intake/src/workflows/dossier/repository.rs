use chrono::{DateTime, Utc};

use super::cnaps::CnapsStatus;
use super::domain::{
    Applicant, Dossier, DossierId, DossierStatus, EmailAudit, EmailKind, StoredFileRef,
};

/// Fields of a dossier known before the repository has assigned an identity.
#[derive(Debug, Clone)]
pub struct NewDossier {
    pub applicant: Applicant,
    pub formation: Option<String>,
    pub session: Option<String>,
    pub files: Vec<StoredFileRef>,
    pub cnaps_link: Option<String>,
}

/// Partial update merged into an existing record. Fields left as `None` are
/// not touched.
#[derive(Debug, Clone, Default)]
pub struct DossierUpdate {
    pub status: Option<DossierStatus>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub email: Option<(EmailKind, EmailAudit)>,
    pub cnaps_status: Option<Option<CnapsStatus>>,
}

impl DossierUpdate {
    pub(crate) fn apply(self, dossier: &mut Dossier) {
        if let Some(status) = self.status {
            dossier.status = status;
        }
        if let Some(at) = self.status_changed_at {
            dossier.status_changed_at = Some(at);
        }
        if let Some(comment) = self.comment {
            dossier.comment = comment;
        }
        if let Some((kind, audit)) = self.email {
            dossier.emails.insert(kind, audit);
        }
        if let Some(cnaps_status) = self.cnaps_status {
            dossier.cnaps_status = cnaps_status;
        }
    }
}

/// Storage abstraction so the lifecycle service can be exercised against a
/// JSON file, a relational table, or an in-memory double interchangeably.
pub trait DossierRepository: Send + Sync {
    fn create(&self, draft: NewDossier) -> Result<Dossier, RepositoryError>;
    fn get(&self, id: DossierId) -> Result<Option<Dossier>, RepositoryError>;
    /// All dossiers in insertion order.
    fn list(&self) -> Result<Vec<Dossier>, RepositoryError>;
    fn update(&self, id: DossierId, patch: DossierUpdate) -> Result<Dossier, RepositoryError>;
    /// Removes the record only; stored files are the caller's concern.
    fn delete(&self, id: DossierId) -> Result<bool, RepositoryError>;
    fn clear(&self) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("dossier not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
