use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::cnaps::CnapsProbe;
use super::documents::{DocumentError, DocumentStore};
use super::domain::{
    Applicant, Dossier, DossierId, DossierStatus, DossierSubmission, EmailKind,
};
use super::notify::Notifier;
use super::repository::{DossierRepository, DossierUpdate, NewDossier, RepositoryError};

/// Orchestrates the dossier lifecycle: document store, repository, and
/// notifier are driven in order, with email outcomes recorded but never
/// allowed to fail a state change.
pub struct DossierService<R, N> {
    repository: Arc<R>,
    documents: Arc<DocumentStore>,
    notifier: Arc<N>,
    probe: CnapsProbe,
}

impl<R, N> DossierService<R, N>
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, documents: Arc<DocumentStore>, notifier: Arc<N>) -> Self {
        Self {
            repository,
            documents,
            notifier,
            probe: CnapsProbe::new(),
        }
    }

    /// Stores and normalizes every upload, creates the dossier, and attempts
    /// the acknowledgement email. A submission in which no upload survives
    /// normalization is rejected before any record is created.
    pub async fn submit(
        &self,
        submission: DossierSubmission,
    ) -> Result<Dossier, DossierServiceError> {
        let applicant = Applicant {
            last_name: required(&submission.last_name, "nom")?,
            first_name: required(&submission.first_name, "prenom")?,
            email: required(&submission.email, "email")?,
        };
        let key = applicant.case_key();

        let mut files = Vec::new();
        for upload in &submission.uploads {
            let stored = self.documents.store(
                &key,
                upload.category,
                &upload.bytes,
                &upload.original_filename,
            )?;
            if let Some(normalized) = self.documents.normalize(&stored) {
                files.push(normalized);
            }
        }
        if files.is_empty() {
            return Err(ValidationError::NoUsableDocuments.into());
        }

        let dossier = self.repository.create(NewDossier {
            applicant,
            formation: optional(submission.formation),
            session: optional(submission.session),
            files,
            cnaps_link: optional(submission.cnaps_link),
        })?;
        info!(id = %dossier.id, files = dossier.files.len(), "dossier created");

        let outcome = self.notifier.acknowledge(&dossier).await;
        if !outcome.sent {
            warn!(id = %dossier.id, detail = %outcome.detail, "acknowledgement email failed");
        }
        let dossier = self.repository.update(
            dossier.id,
            DossierUpdate {
                email: Some((EmailKind::Acknowledgement, outcome.audit())),
                ..Default::default()
            },
        )?;
        Ok(dossier)
    }

    pub fn get(&self, id: DossierId) -> Result<Dossier, DossierServiceError> {
        self.repository
            .get(id)?
            .ok_or(DossierServiceError::NotFound)
    }

    /// Applies a status change and fires the outcome email the new status
    /// calls for. Repeating a transition re-sends the email; there is no
    /// deduplication.
    pub async fn set_status(
        &self,
        id: DossierId,
        status: DossierStatus,
        comment: Option<String>,
    ) -> Result<Dossier, DossierServiceError> {
        let updated = self.repository.update(
            id,
            DossierUpdate {
                status: Some(status),
                status_changed_at: Some(Utc::now()),
                comment,
                ..Default::default()
            },
        )?;

        let email = match status {
            DossierStatus::NonConforme => Some((
                EmailKind::NonConforme,
                self.notifier
                    .non_conformant(&updated, &updated.comment)
                    .await,
            )),
            DossierStatus::Conforme => {
                Some((EmailKind::Conforme, self.notifier.conformant(&updated).await))
            }
            DossierStatus::Pending | DossierStatus::Incomplet => None,
        };

        match email {
            Some((kind, outcome)) => {
                if !outcome.sent {
                    warn!(%id, kind = kind.label(), detail = %outcome.detail, "status email failed");
                }
                Ok(self.repository.update(
                    id,
                    DossierUpdate {
                        email: Some((kind, outcome.audit())),
                        ..Default::default()
                    },
                )?)
            }
            None => Ok(updated),
        }
    }

    /// Pure field update, no side effects.
    pub fn set_comment(
        &self,
        id: DossierId,
        text: String,
    ) -> Result<Dossier, DossierServiceError> {
        Ok(self.repository.update(
            id,
            DossierUpdate {
                comment: Some(text),
                ..Default::default()
            },
        )?)
    }

    /// Deletes the dossier's stored files (best effort) and then the record.
    pub fn remove(&self, id: DossierId) -> Result<bool, DossierServiceError> {
        let Some(dossier) = self.repository.get(id)? else {
            return Ok(false);
        };
        for file in &dossier.files {
            if let Err(err) = self.documents.delete(file) {
                warn!(%id, file = %file.as_str(), %err, "cannot delete stored file");
            }
        }
        Ok(self.repository.delete(id)?)
    }

    /// All dossiers in insertion order, each file list filtered down to files
    /// that still resolve on disk. The stored records are left untouched.
    pub fn list_for_admin(&self) -> Result<Vec<Dossier>, DossierServiceError> {
        let mut dossiers = self.repository.list()?;
        for dossier in &mut dossiers {
            dossier.files.retain(|file| self.documents.exists(file));
        }
        Ok(dossiers)
    }

    /// Zip of the dossier's currently resolvable files, plus a download name.
    pub fn archive(&self, id: DossierId) -> Result<(String, Vec<u8>), DossierServiceError> {
        let dossier = self.get(id)?;
        let bytes = self.documents.archive(&dossier.files)?;
        let name = format!("dossier_{}.zip", dossier.applicant.case_key().as_str());
        Ok((name, bytes))
    }

    /// Resolves a stored file name for streaming, refusing names that point
    /// outside the upload directory.
    pub fn upload_path(&self, name: &str) -> Option<std::path::PathBuf> {
        self.documents.resolve(name)
    }

    /// Administrative reset: every stored file and every record goes.
    pub fn purge_all(&self) -> Result<(), DossierServiceError> {
        self.documents.purge()?;
        self.repository.clear()?;
        info!("dossier store reset");
        Ok(())
    }

    /// Probes the dossier's CNAPS tracking link and records the result, even
    /// when the probe comes back empty. Without a link this is a no-op.
    pub async fn refresh_cnaps(&self, id: DossierId) -> Result<Dossier, DossierServiceError> {
        let dossier = self.get(id)?;
        let Some(link) = dossier.cnaps_link.clone() else {
            return Ok(dossier);
        };
        let status = self.probe.check(&link).await;
        Ok(self.repository.update(
            id,
            DossierUpdate {
                cnaps_status: Some(status),
                ..Default::default()
            },
        )?)
    }

    /// Re-checks every dossier that carries a tracking link; used by the
    /// background poller. Returns how many dossiers were refreshed. Writes go
    /// through the same repository update path as request handlers, so
    /// concurrent edits are last-writer-wins.
    pub async fn refresh_all_cnaps(&self) -> usize {
        let dossiers = match self.repository.list() {
            Ok(dossiers) => dossiers,
            Err(err) => {
                warn!(%err, "cnaps refresh cannot list dossiers");
                return 0;
            }
        };
        let mut refreshed = 0;
        for dossier in dossiers {
            if dossier.cnaps_link.is_none() {
                continue;
            }
            match self.refresh_cnaps(dossier.id).await {
                Ok(_) => refreshed += 1,
                Err(err) => warn!(id = %dossier.id, %err, "cnaps refresh failed"),
            }
        }
        refreshed
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Submitter-visible rejection reasons.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("no submitted document could be stored in a supported format")]
    NoUsableDocuments,
    #[error("unknown status '{0}'")]
    UnknownStatus(String),
}

/// Error raised by the dossier lifecycle service.
#[derive(Debug, thiserror::Error)]
pub enum DossierServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("dossier not found")]
    NotFound,
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Documents(#[from] DocumentError),
}

impl From<RepositoryError> for DossierServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}
