//! Dossier intake and review workflows for the CNAPS clearance process.
//!
//! Trainees submit identity and residency documents through a multipart form;
//! the service stores the files, normalizes them to PDF, records a dossier,
//! and emails an acknowledgement. Reviewers then drive the dossier through
//! its statuses, each outcome status triggering its own applicant email.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
