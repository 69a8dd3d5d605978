use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cnaps::CnapsStatus;

/// Identifier wrapper for dossiers. Assigned at creation, immutable, and
/// never reused after deletion within one repository instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DossierId(pub u64);

impl fmt::Display for DossierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File-name prefix derived from the applicant's name, so one applicant's
/// documents group together inside the flat upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseKey(String);

impl CaseKey {
    /// Lowercases both name parts and collapses anything that is not an
    /// ASCII letter or digit into single underscores.
    pub fn derive(last_name: &str, first_name: &str) -> Self {
        let mut key = String::new();
        for part in [last_name, first_name] {
            let mut wrote_separator = true;
            if !key.is_empty() {
                key.push('_');
            }
            for ch in part.trim().chars() {
                if ch.is_ascii_alphanumeric() {
                    key.push(ch.to_ascii_lowercase());
                    wrote_separator = false;
                } else if !wrote_separator {
                    key.push('_');
                    wrote_separator = true;
                }
            }
            while key.ends_with('_') {
                key.pop();
            }
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Applicant identity captured by the submission form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub last_name: String,
    pub first_name: String,
    /// Treated as an opaque string; the form does not strictly validate it.
    pub email: String,
}

impl Applicant {
    pub fn case_key(&self) -> CaseKey {
        CaseKey::derive(&self.last_name, &self.first_name)
    }
}

/// Logical name of a stored document inside the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredFileRef(pub String);

impl StoredFileRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Categories a submitted document can belong to. Labels double as file-name
/// segments and multipart field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentCategory {
    Identity,
    Residence,
    HostIdentity,
    HostAttestation,
}

impl DocumentCategory {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentCategory::Identity => "piece_identite",
            DocumentCategory::Residence => "justificatif_domicile",
            DocumentCategory::HostIdentity => "piece_identite_hebergeant",
            DocumentCategory::HostAttestation => "attestation_hebergement",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "piece_identite" => Some(DocumentCategory::Identity),
            "justificatif_domicile" => Some(DocumentCategory::Residence),
            "piece_identite_hebergeant" => Some(DocumentCategory::HostIdentity),
            "attestation_hebergement" => Some(DocumentCategory::HostAttestation),
            _ => None,
        }
    }
}

/// Review status of a dossier. Transitions carry no ordering; a reviewer can
/// move a dossier between any two states at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DossierStatus {
    /// No review decision recorded yet (the empty status of a fresh dossier).
    #[default]
    Pending,
    Incomplet,
    Conforme,
    NonConforme,
}

impl DossierStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DossierStatus::Pending => "",
            DossierStatus::Incomplet => "incomplet",
            DossierStatus::Conforme => "conforme",
            DossierStatus::NonConforme => "non-conforme",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "" => Some(DossierStatus::Pending),
            "incomplet" => Some(DossierStatus::Incomplet),
            "conforme" => Some(DossierStatus::Conforme),
            "non-conforme" | "non conforme" => Some(DossierStatus::NonConforme),
            _ => None,
        }
    }
}

/// The three applicant-facing email kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum EmailKind {
    Acknowledgement,
    Conforme,
    NonConforme,
}

impl EmailKind {
    pub const fn label(self) -> &'static str {
        match self {
            EmailKind::Acknowledgement => "accuse_reception",
            EmailKind::Conforme => "conforme",
            EmailKind::NonConforme => "non_conforme",
        }
    }
}

/// Last transmission outcome for one email kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailOutcome {
    #[default]
    NotSent,
    Sent,
    Failed,
}

/// Audit trail of the most recent attempt for one email kind. The rendered
/// body is kept even when the send failed so reviewers can preview or replay
/// the message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAudit {
    pub outcome: EmailOutcome,
    pub detail: String,
    pub body: String,
    pub attempted_at: Option<DateTime<Utc>>,
}

/// One dossier: an applicant, their stored documents, and the review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dossier {
    pub id: DossierId,
    pub applicant: Applicant,
    /// Training course the applicant enrolled in, when stated on the form.
    #[serde(default)]
    pub formation: Option<String>,
    /// Session (cohort/date) within the training course.
    #[serde(default)]
    pub session: Option<String>,
    pub files: Vec<StoredFileRef>,
    #[serde(default)]
    pub status: DossierStatus,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status_changed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub emails: BTreeMap<EmailKind, EmailAudit>,
    /// Tracking URL of the application on the CNAPS side, when the applicant
    /// supplied one.
    #[serde(default)]
    pub cnaps_link: Option<String>,
    /// Last result of probing `cnaps_link`.
    #[serde(default)]
    pub cnaps_status: Option<CnapsStatus>,
}

impl Dossier {
    pub fn email_audit(&self, kind: EmailKind) -> Option<&EmailAudit> {
        self.emails.get(&kind)
    }

    pub fn view(&self) -> DossierView {
        DossierView {
            id: self.id,
            last_name: self.applicant.last_name.clone(),
            first_name: self.applicant.first_name.clone(),
            email: self.applicant.email.clone(),
            formation: self.formation.clone(),
            session: self.session.clone(),
            files: self.files.iter().map(|f| f.0.clone()).collect(),
            status: self.status.label(),
            comment: self.comment.clone(),
            created_at: self.created_at,
            status_changed_at: self.status_changed_at,
            emails: self
                .emails
                .iter()
                .map(|(kind, audit)| (kind.label(), audit.clone()))
                .collect(),
            cnaps_status: self.cnaps_status.map(CnapsStatus::label),
        }
    }
}

/// Sanitized representation of a dossier for API responses. Email audits are
/// keyed by kind label so reviewers can preview the last rendered body per
/// kind.
#[derive(Debug, Clone, Serialize)]
pub struct DossierView {
    pub id: DossierId,
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub files: Vec<String>,
    pub status: &'static str,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_changed_at: Option<DateTime<Utc>>,
    pub emails: BTreeMap<&'static str, EmailAudit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnaps_status: Option<&'static str>,
}

/// One uploaded file as parsed out of the multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub category: DocumentCategory,
    pub original_filename: String,
    pub bytes: Vec<u8>,
}

/// Everything a submission carries before any side effect has run.
#[derive(Debug, Clone)]
pub struct DossierSubmission {
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub formation: Option<String>,
    pub session: Option<String>,
    pub cnaps_link: Option<String>,
    pub uploads: Vec<Upload>,
}
