use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::workflows::dossier::documents::DocumentStore;
use crate::workflows::dossier::domain::{
    DocumentCategory, Dossier, DossierId, DossierSubmission, Upload,
};
use crate::workflows::dossier::notify::{NotificationOutcome, Notifier};
use crate::workflows::dossier::repository::{
    DossierRepository, DossierUpdate, NewDossier, RepositoryError,
};
use crate::workflows::dossier::service::DossierService;

#[derive(Default)]
pub(super) struct MemoryRepository {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    dossiers: Vec<Dossier>,
}

impl DossierRepository for MemoryRepository {
    fn create(&self, draft: NewDossier) -> Result<Dossier, RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        state.next_id += 1;
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
        state.dossiers.push(dossier.clone());
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
        Ok(dossier.clone())
    }

    fn delete(&self, id: DossierId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        let before = state.dossiers.len();
        state.dossiers.retain(|d| d.id != id);
        Ok(state.dossiers.len() < before)
    }

    fn clear(&self) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        state.dossiers.clear();
        Ok(())
    }
}

/// Records every notification attempt; flips to failure mode on demand.
#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<SentEmail>>,
    fail: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SentEmail {
    pub(super) kind: &'static str,
    pub(super) to: String,
    pub(super) body: String,
}

impl RecordingNotifier {
    pub(super) fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(super) fn events(&self) -> Vec<SentEmail> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    fn record(&self, kind: &'static str, dossier: &Dossier, body: String) -> NotificationOutcome {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(SentEmail {
                kind,
                to: dossier.applicant.email.clone(),
                body: body.clone(),
            });
        if self.fail.swap(false, Ordering::SeqCst) {
            NotificationOutcome {
                sent: false,
                detail: "smtp error: connection refused".to_string(),
                body,
            }
        } else {
            NotificationOutcome {
                sent: true,
                detail: "sent".to_string(),
                body,
            }
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn acknowledge(&self, dossier: &Dossier) -> NotificationOutcome {
        self.record("ack", dossier, format!("reçu {}", dossier.files.len()))
    }

    async fn conformant(&self, dossier: &Dossier) -> NotificationOutcome {
        self.record("conforme", dossier, "dossier conforme".to_string())
    }

    async fn non_conformant(&self, dossier: &Dossier, comment: &str) -> NotificationOutcome {
        self.record("non_conforme", dossier, format!("non conforme: {comment}"))
    }
}

pub(super) struct Fixture {
    pub(super) service: Arc<DossierService<MemoryRepository, RecordingNotifier>>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) documents: Arc<DocumentStore>,
    #[allow(dead_code)]
    upload_dir: tempfile::TempDir,
}

pub(super) fn fixture() -> Fixture {
    let upload_dir = tempfile::tempdir().expect("tempdir");
    let documents = Arc::new(
        DocumentStore::with_converter(upload_dir.path(), None).expect("open document store"),
    );
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = Arc::new(DossierService::new(
        repository.clone(),
        documents.clone(),
        notifier.clone(),
    ));
    Fixture {
        service,
        repository,
        notifier,
        documents,
        upload_dir,
    }
}

pub(super) fn png_bytes() -> Vec<u8> {
    let mut png = Vec::new();
    image::RgbImage::from_pixel(3, 3, image::Rgb([10u8, 120, 10]))
        .write_to(
            &mut std::io::Cursor::new(&mut png),
            image::ImageFormat::Png,
        )
        .expect("encode fixture png");
    png
}

pub(super) fn identity_png() -> Upload {
    Upload {
        category: DocumentCategory::Identity,
        original_filename: "cni.png".to_string(),
        bytes: png_bytes(),
    }
}

pub(super) fn residence_pdf() -> Upload {
    Upload {
        category: DocumentCategory::Residence,
        original_filename: "facture.pdf".to_string(),
        bytes: b"%PDF-1.4 facture".to_vec(),
    }
}

pub(super) fn unsupported_upload() -> Upload {
    Upload {
        category: DocumentCategory::Identity,
        original_filename: "cni.xyz".to_string(),
        bytes: b"opaque bytes".to_vec(),
    }
}

pub(super) fn submission(uploads: Vec<Upload>) -> DossierSubmission {
    DossierSubmission {
        last_name: "Dupont".to_string(),
        first_name: "Jean".to_string(),
        email: "jean@example.com".to_string(),
        formation: Some("CQP APS".to_string()),
        session: Some("2026-09".to_string()),
        cnaps_link: None,
        uploads,
    }
}
