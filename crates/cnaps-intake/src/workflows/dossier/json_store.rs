use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use super::domain::{Dossier, DossierId};
use super::repository::{DossierRepository, DossierUpdate, NewDossier, RepositoryError};

/// Dossier repository backed by a single JSON array file.
///
/// The file is rewritten in full after every mutation (write to a sibling
/// temp file, then rename). A missing or unparsable file loads as an empty
/// store; identities are assigned from a monotonic counter seeded with
/// `max(id) + 1` so deleting a dossier never frees its id.
pub struct JsonFileRepository {
    path: PathBuf,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    dossiers: Vec<Dossier>,
}

impl JsonFileRepository {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let dossiers = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<Dossier>>(&bytes) {
                Ok(dossiers) => dossiers,
                Err(err) => {
                    warn!(path = %path.display(), %err, "dossier store unreadable, starting empty");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(RepositoryError::Unavailable(format!(
                    "cannot read {}: {err}",
                    path.display()
                )))
            }
        };

        let next_id = dossiers.iter().map(|d| d.id.0 + 1).max().unwrap_or(1);
        Ok(Self {
            path,
            state: Mutex::new(State { next_id, dossiers }),
        })
    }

    fn persist(path: &Path, dossiers: &[Dossier]) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec_pretty(dossiers)
            .map_err(|err| RepositoryError::Unavailable(format!("serialize store: {err}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|err| {
            RepositoryError::Unavailable(format!("write {}: {err}", tmp.display()))
        })?;
        fs::rename(&tmp, path).map_err(|err| {
            RepositoryError::Unavailable(format!("rename {}: {err}", path.display()))
        })
    }
}

impl DossierRepository for JsonFileRepository {
    fn create(&self, draft: NewDossier) -> Result<Dossier, RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        let dossier = Dossier {
            id: DossierId(state.next_id),
            applicant: draft.applicant,
            formation: draft.formation,
            session: draft.session,
            files: draft.files,
            status: Default::default(),
            comment: String::new(),
            created_at: Utc::now(),
            status_changed_at: None,
            emails: Default::default(),
            cnaps_link: draft.cnaps_link,
            cnaps_status: None,
        };
        state.next_id += 1;
        state.dossiers.push(dossier.clone());
        Self::persist(&self.path, &state.dossiers)?;
        Ok(dossier)
    }

    fn get(&self, id: DossierId) -> Result<Option<Dossier>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state.dossiers.iter().find(|d| d.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<Dossier>, RepositoryError> {
        let state = self.state.lock().expect("repository mutex poisoned");
        Ok(state.dossiers.clone())
    }

    fn update(&self, id: DossierId, patch: DossierUpdate) -> Result<Dossier, RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        let dossier = state
            .dossiers
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(RepositoryError::NotFound)?;
        patch.apply(dossier);
        let updated = dossier.clone();
        Self::persist(&self.path, &state.dossiers)?;
        Ok(updated)
    }

    fn delete(&self, id: DossierId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        let before = state.dossiers.len();
        state.dossiers.retain(|d| d.id != id);
        if state.dossiers.len() == before {
            return Ok(false);
        }
        Self::persist(&self.path, &state.dossiers)?;
        Ok(true)
    }

    fn clear(&self) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        state.dossiers.clear();
        Self::persist(&self.path, &state.dossiers)
    }
}
