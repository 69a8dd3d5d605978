pub mod dossier;
