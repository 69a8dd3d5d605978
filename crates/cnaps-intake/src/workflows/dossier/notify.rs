use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::warn;

use crate::config::SmtpConfig;

use super::domain::{Dossier, EmailAudit, EmailOutcome};

/// Result of one notification attempt. `body` always carries the fully
/// rendered message so it can be previewed later, sent or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub sent: bool,
    pub detail: String,
    pub body: String,
}

impl NotificationOutcome {
    pub fn audit(&self) -> EmailAudit {
        EmailAudit {
            outcome: if self.sent {
                EmailOutcome::Sent
            } else {
                EmailOutcome::Failed
            },
            detail: self.detail.clone(),
            body: self.body.clone(),
            attempted_at: Some(Utc::now()),
        }
    }
}

/// Applicant-facing email dispatch. Implementations report the outcome as a
/// value; transport failures never surface as errors to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Confirmation sent right after a dossier is created.
    async fn acknowledge(&self, dossier: &Dossier) -> NotificationOutcome;
    /// Sent on every transition to "conforme".
    async fn conformant(&self, dossier: &Dossier) -> NotificationOutcome;
    /// Sent on every transition to "non-conforme"; includes the reviewer
    /// comment verbatim and a link back to the submission form.
    async fn non_conformant(&self, dossier: &Dossier, comment: &str) -> NotificationOutcome;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid smtp configuration: {0}")]
    InvalidConfig(String),
}

/// Plain-text message templates. Plain text on purpose: reviewer comments are
/// untrusted input and must never be interpolated into HTML.
mod templates {
    use crate::workflows::dossier::domain::Dossier;

    pub(super) fn acknowledgement(dossier: &Dossier) -> (String, String) {
        let subject = "Dossier CNAPS bien reçu".to_string();
        let body = format!(
            "Bonjour {first} {last},\n\n\
             Nous avons bien reçu votre dossier ({count} document(s)).\n\
             Il sera examiné prochainement ; vous recevrez un email dès que son statut évolue.\n\n\
             Cordialement,\nL'équipe formation",
            first = dossier.applicant.first_name,
            last = dossier.applicant.last_name,
            count = dossier.files.len(),
        );
        (subject, body)
    }

    pub(super) fn conformant(dossier: &Dossier) -> (String, String) {
        let subject = "Dossier CNAPS conforme".to_string();
        let body = format!(
            "Bonjour {first} {last},\n\n\
             Votre dossier a été vérifié et déclaré conforme.\n\
             Aucune action n'est attendue de votre part.\n\n\
             Cordialement,\nL'équipe formation",
            first = dossier.applicant.first_name,
            last = dossier.applicant.last_name,
        );
        (subject, body)
    }

    pub(super) fn non_conformant(
        dossier: &Dossier,
        comment: &str,
        form_url: &str,
    ) -> (String, String) {
        let subject = "Dossier CNAPS non conforme".to_string();
        let body = format!(
            "Bonjour {first} {last},\n\n\
             Votre dossier a été examiné et n'est pas conforme :\n\n\
             {comment}\n\n\
             Merci de soumettre les pièces corrigées via le formulaire :\n{form_url}\n\n\
             Cordialement,\nL'équipe formation",
            first = dossier.applicant.first_name,
            last = dossier.applicant.last_name,
        );
        (subject, body)
    }
}

/// SMTP-backed notifier. Port 465 uses implicit TLS, other ports STARTTLS;
/// without `use_tls` the transport is plain (local relay / test inbox).
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    form_url: String,
}

impl SmtpNotifier {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let mut builder = if config.use_tls {
            let tls = TlsParameters::new(config.host.clone())
                .map_err(|err| NotifyError::InvalidConfig(format!("tls parameters: {err}")))?;
            if config.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                    .map_err(|err| NotifyError::InvalidConfig(format!("smtp relay: {err}")))?
                    .port(config.port)
                    .tls(Tls::Wrapper(tls))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|err| NotifyError::InvalidConfig(format!("smtp relay: {err}")))?
                    .port(config.port)
                    .tls(Tls::Required(tls))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
        };

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
            form_url: config.form_url.clone(),
        })
    }

    async fn transmit(&self, to: &str, subject: &str, body: String) -> NotificationOutcome {
        let from: Mailbox = match self.from_address.parse() {
            Ok(mailbox) => mailbox,
            Err(err) => {
                return NotificationOutcome {
                    sent: false,
                    detail: format!("invalid sender address '{}': {err}", self.from_address),
                    body,
                }
            }
        };
        let to_mailbox: Mailbox = match to.parse() {
            Ok(mailbox) => mailbox,
            Err(err) => {
                return NotificationOutcome {
                    sent: false,
                    detail: format!("invalid recipient address '{to}': {err}"),
                    body,
                }
            }
        };

        let message = match Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.clone())
        {
            Ok(message) => message,
            Err(err) => {
                return NotificationOutcome {
                    sent: false,
                    detail: format!("cannot build message: {err}"),
                    body,
                }
            }
        };

        match self.transport.send(message).await {
            Ok(_) => NotificationOutcome {
                sent: true,
                detail: "sent".to_string(),
                body,
            },
            Err(err) => {
                warn!(%to, %err, "smtp send failed");
                NotificationOutcome {
                    sent: false,
                    detail: format!("smtp error: {err}"),
                    body,
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn acknowledge(&self, dossier: &Dossier) -> NotificationOutcome {
        let (subject, body) = templates::acknowledgement(dossier);
        self.transmit(&dossier.applicant.email, &subject, body).await
    }

    async fn conformant(&self, dossier: &Dossier) -> NotificationOutcome {
        let (subject, body) = templates::conformant(dossier);
        self.transmit(&dossier.applicant.email, &subject, body).await
    }

    async fn non_conformant(&self, dossier: &Dossier, comment: &str) -> NotificationOutcome {
        let (subject, body) = templates::non_conformant(dossier, comment, &self.form_url);
        self.transmit(&dossier.applicant.email, &subject, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::dossier::domain::{Applicant, DossierId, StoredFileRef};
    use chrono::Utc;

    fn dossier() -> Dossier {
        Dossier {
            id: DossierId(1),
            applicant: Applicant {
                last_name: "Dupont".to_string(),
                first_name: "Jean".to_string(),
                email: "jean@example.com".to_string(),
            },
            formation: None,
            session: None,
            files: vec![StoredFileRef("dupont_jean_piece_identite_1.pdf".to_string())],
            status: Default::default(),
            comment: String::new(),
            created_at: Utc::now(),
            status_changed_at: None,
            emails: Default::default(),
            cnaps_link: None,
            cnaps_status: None,
        }
    }

    #[test]
    fn non_conformant_body_quotes_comment_and_form_link() {
        let (_, body) = templates::non_conformant(
            &dossier(),
            "La pièce d'identité est illisible.",
            "https://forms.example.org/cnaps",
        );
        assert!(body.contains("La pièce d'identité est illisible."));
        assert!(body.contains("https://forms.example.org/cnaps"));
    }

    #[test]
    fn acknowledgement_mentions_document_count() {
        let (subject, body) = templates::acknowledgement(&dossier());
        assert!(subject.contains("reçu"));
        assert!(body.contains("1 document(s)"));
    }

    #[test]
    fn failed_outcome_still_audits_the_body() {
        let outcome = NotificationOutcome {
            sent: false,
            detail: "smtp error: connection refused".to_string(),
            body: "Bonjour".to_string(),
        };
        let audit = outcome.audit();
        assert_eq!(audit.outcome, EmailOutcome::Failed);
        assert_eq!(audit.body, "Bonjour");
        assert!(audit.attempted_at.is_some());
    }

    #[tokio::test]
    async fn invalid_recipient_is_reported_not_raised() {
        let notifier = SmtpNotifier::from_config(&SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: None,
            password: None,
            from_address: "no-reply@example.org".to_string(),
            use_tls: false,
            form_url: "http://localhost:3000/submit".to_string(),
        })
        .expect("builds without tls");

        let mut dossier = dossier();
        dossier.applicant.email = "not an address".to_string();
        let outcome = notifier.acknowledge(&dossier).await;
        assert!(!outcome.sent);
        assert!(outcome.detail.contains("invalid recipient"));
        assert!(outcome.body.contains("Bonjour"));
    }
}
