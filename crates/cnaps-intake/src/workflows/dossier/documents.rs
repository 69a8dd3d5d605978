use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::convert::{self, SourceFormat};
use super::domain::{CaseKey, DocumentCategory, StoredFileRef};

pub use super::convert::{ConvertError, DocumentConverter, LibreOfficeConverter};

/// File persistence for submitted documents: one flat directory, file names
/// as the only namespacing (`{case_key}_{category}_{seq}.{ext}`).
pub struct DocumentStore {
    root: PathBuf,
    converter: Option<Arc<dyn DocumentConverter>>,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl DocumentStore {
    /// Opens the store, creating the upload directory if needed. Office
    /// document conversion is wired up only when a LibreOffice binary is
    /// discoverable on the host.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let converter = LibreOfficeConverter::discover()
            .map(|c| Arc::new(c) as Arc<dyn DocumentConverter>);
        Self::with_converter(root, converter)
    }

    pub fn with_converter(
        root: impl Into<PathBuf>,
        converter: Option<Arc<dyn DocumentConverter>>,
    ) -> Result<Self, DocumentError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, converter })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists raw upload bytes under a collision-free name. The sequence
    /// number is one past the highest already stored for this key+category,
    /// so re-submissions never overwrite earlier files.
    pub fn store(
        &self,
        key: &CaseKey,
        category: DocumentCategory,
        bytes: &[u8],
        original_filename: &str,
    ) -> Result<StoredFileRef, DocumentError> {
        let extension = sanitize_extension(original_filename);
        let prefix = format!("{}_{}_", key.as_str(), category.label());
        let seq = self.next_sequence(&prefix)?;
        let name = format!("{prefix}{seq}.{extension}");
        fs::write(self.root.join(&name), bytes)?;
        debug!(file = %name, "stored upload");
        Ok(StoredFileRef(name))
    }

    fn next_sequence(&self, prefix: &str) -> Result<u32, DocumentError> {
        let mut highest = 0u32;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(prefix) else {
                continue;
            };
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(seq) = digits.parse::<u32>() {
                highest = highest.max(seq);
            }
        }
        Ok(highest + 1)
    }

    /// Normalizes a stored file to PDF per the intake policy. Returns `None`
    /// for unsupported formats and for any conversion failure; neither may
    /// abort the enclosing submission. A file that failed to normalize is
    /// removed from disk so it cannot linger as an orphan.
    pub fn normalize(&self, file: &StoredFileRef) -> Option<StoredFileRef> {
        let path = self.root.join(file.as_str());
        let head = read_head(&path).unwrap_or_default();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match convert::classify(&extension, &head) {
            SourceFormat::Pdf => {
                if extension == "pdf" {
                    return Some(file.clone());
                }
                let renamed = path.with_extension("pdf");
                match fs::rename(&path, &renamed) {
                    Ok(()) => Some(stored_ref(&renamed)),
                    Err(err) => {
                        warn!(file = %file.as_str(), %err, "cannot rename pdf upload");
                        Some(file.clone())
                    }
                }
            }
            SourceFormat::Raster => {
                let bytes = match fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(file = %file.as_str(), %err, "cannot read upload back");
                        return None;
                    }
                };
                let target = path.with_extension("pdf");
                match convert::raster_to_pdf(&bytes, &target) {
                    Ok(()) => {
                        let _ = fs::remove_file(&path);
                        Some(stored_ref(&target))
                    }
                    Err(err) => {
                        warn!(file = %file.as_str(), %err, "raster conversion failed, dropping file");
                        let _ = fs::remove_file(&path);
                        None
                    }
                }
            }
            SourceFormat::OfficeDocument => {
                let Some(converter) = self.converter.as_ref() else {
                    warn!(file = %file.as_str(), "no document converter available, dropping file");
                    let _ = fs::remove_file(&path);
                    return None;
                };
                match converter.to_pdf(&path, &self.root) {
                    Ok(produced) => {
                        let _ = fs::remove_file(&path);
                        Some(stored_ref(&produced))
                    }
                    Err(err) => {
                        warn!(file = %file.as_str(), %err, "document conversion failed, dropping file");
                        let _ = fs::remove_file(&path);
                        None
                    }
                }
            }
            SourceFormat::Unsupported => {
                warn!(file = %file.as_str(), "unsupported upload format, dropping file");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    pub fn exists(&self, file: &StoredFileRef) -> bool {
        self.resolve(file.as_str()).is_some()
    }

    /// Maps a logical name back to a path inside the store, rejecting names
    /// that attempt to escape the upload directory. Returns `None` when the
    /// file does not exist.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return None;
        }
        let path = self.root.join(name);
        path.is_file().then_some(path)
    }

    /// Removes a stored file. Absent files are not an error.
    pub fn delete(&self, file: &StoredFileRef) -> Result<(), DocumentError> {
        match fs::remove_file(self.root.join(file.as_str())) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Builds an in-memory zip of the given files, silently skipping any
    /// that no longer resolve on disk.
    pub fn archive(&self, files: &[StoredFileRef]) -> Result<Vec<u8>, DocumentError> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for file in files {
            let Some(path) = self.resolve(file.as_str()) else {
                continue;
            };
            let bytes = fs::read(path)?;
            writer.start_file(file.as_str(), options)?;
            writer.write_all(&bytes)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Removes every file in the upload directory.
    pub fn purge(&self) -> Result<(), DocumentError> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

fn stored_ref(path: &Path) -> StoredFileRef {
    StoredFileRef(
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    )
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut head = vec![0u8; 8];
    let mut file = fs::File::open(path)?;
    let read = file.read(&mut head)?;
    head.truncate(read);
    Ok(head)
}

/// Keeps only a short, lowercase, alphanumeric extension; anything else
/// becomes `bin`.
fn sanitize_extension(original_filename: &str) -> String {
    let extension = Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if extension.is_empty()
        || extension.len() > 8
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        "bin".to_string()
    } else {
        extension
    }
}
