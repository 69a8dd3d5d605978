use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status keywords recognized on the CNAPS tracking page. The page is an
/// opaque HTML document; matching is plain lowercase substring search, which
/// is all the authority's wording supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CnapsStatus {
    Accepte,
    InstructionEnCours,
    DecisionEnCours,
}

impl CnapsStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CnapsStatus::Accepte => "accepté",
            CnapsStatus::InstructionEnCours => "instruction en cours",
            CnapsStatus::DecisionEnCours => "décision en cours",
        }
    }

    /// Classifies page text. Keyword precedence mirrors the tracking page:
    /// an acceptance notice wins over the in-progress wording.
    pub fn from_page_text(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        if text.contains("accepté") {
            Some(CnapsStatus::Accepte)
        } else if text.contains("instruction") {
            Some(CnapsStatus::InstructionEnCours)
        } else if text.contains("décision") {
            Some(CnapsStatus::DecisionEnCours)
        } else {
            None
        }
    }
}

/// HTTP collaborator fetching a dossier's tracking page. Every failure mode
/// (bad link, timeout, non-text body) collapses to `None`; the probe result
/// is advisory and never blocks a request.
pub struct CnapsProbe {
    client: reqwest::Client,
}

impl CnapsProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub async fn check(&self, link: &str) -> Option<CnapsStatus> {
        if link.trim().is_empty() {
            return None;
        }
        let response = match self.client.get(link).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(%link, %err, "cnaps probe request failed");
                return None;
            }
        };
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                debug!(%link, %err, "cnaps probe body unreadable");
                return None;
            }
        };
        CnapsStatus::from_page_text(&text)
    }
}

impl Default for CnapsProbe {
    fn default() -> Self {
        Self::new()
    }
}
