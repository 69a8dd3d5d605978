//! PDF normalization backends: raster flattening via `image` + `lopdf`, and
//! office-document conversion delegated to a LibreOffice binary when one is
//! installed on the host.

use std::path::{Path, PathBuf};
use std::process::Command;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// Coarse classification of an uploaded file, driving the normalization
/// policy. PDF detection prefers the magic bytes over the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceFormat {
    Pdf,
    Raster,
    OfficeDocument,
    Unsupported,
}

pub(crate) const PDF_MAGIC: &[u8] = b"%PDF-";

pub(crate) fn classify(extension: &str, head: &[u8]) -> SourceFormat {
    if head.starts_with(PDF_MAGIC) || extension == "pdf" {
        return SourceFormat::Pdf;
    }
    match extension {
        "jpg" | "jpeg" | "png" | "webp" | "tif" | "tiff" | "heic" | "heif" => SourceFormat::Raster,
        "doc" | "docx" | "odt" | "txt" | "rtf" => SourceFormat::OfficeDocument,
        _ => SourceFormat::Unsupported,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("cannot assemble pdf: {0}")]
    Assemble(String),
    #[error("no document converter available")]
    ConverterUnavailable,
    #[error("converter failed: {0}")]
    Converter(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Flattens a raster image (first frame, alpha discarded) into a single-page
/// PDF whose page is sized to the pixel dimensions in points.
pub(crate) fn raster_to_pdf(bytes: &[u8], output: &Path) -> Result<(), ConvertError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| ConvertError::Decode(err.to_string()))?
        .to_rgb8();
    let (width, height) = (decoded.width() as i64, decoded.height() as i64);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        decoded.into_raw(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|err| ConvertError::Assemble(err.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save(output)
        .map_err(|err| ConvertError::Assemble(err.to_string()))?;
    Ok(())
}

/// External office-document conversion collaborator.
pub trait DocumentConverter: Send + Sync {
    /// Converts `input` to a PDF placed in `output_dir`, returning the
    /// produced path.
    fn to_pdf(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConvertError>;
}

/// Shells out to a LibreOffice/soffice binary in headless mode.
pub struct LibreOfficeConverter {
    binary: PathBuf,
}

impl LibreOfficeConverter {
    /// Looks for `soffice` (then `libreoffice`) on PATH.
    pub fn discover() -> Option<Self> {
        let binary = which::which("soffice")
            .or_else(|_| which::which("libreoffice"))
            .ok()?;
        Some(Self { binary })
    }
}

impl DocumentConverter for LibreOfficeConverter {
    fn to_pdf(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConvertError> {
        let output = Command::new(&self.binary)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(output_dir)
            .arg(input)
            .output()?;
        if !output.status.success() {
            return Err(ConvertError::Converter(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let produced = output_dir.join(input.with_extension("pdf").file_name().ok_or_else(
            || ConvertError::Converter("input has no file name".to_string()),
        )?);
        if produced.is_file() {
            Ok(produced)
        } else {
            Err(ConvertError::Converter(format!(
                "expected output {} was not produced",
                produced.display()
            )))
        }
    }
}
