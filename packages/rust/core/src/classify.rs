//! Input classification: raw file-like payloads → tagged queue entries.
//!
//! Classification looks only at metadata (declared media type and name);
//! payload bytes are not read until a build runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use everythingpdf_shared::{
    EverythingPdfError, ImageSubkind, InputKind, PDF_MEDIA_TYPE, Result,
};

// ---------------------------------------------------------------------------
// Raw inputs
// ---------------------------------------------------------------------------

/// Where an input's bytes live.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Bytes already in memory (shared, cheap to clone).
    Memory(Arc<[u8]>),
    /// A file read lazily at build time.
    File(PathBuf),
}

impl Payload {
    /// Read the full payload.
    pub async fn read(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Memory(bytes) => Ok(bytes.to_vec()),
            Payload::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| EverythingPdfError::io(path, e)),
        }
    }
}

/// A file-like input as handed over by a picker, drop target, or the CLI.
#[derive(Debug, Clone)]
pub struct RawInput {
    /// Display name (usually the file name).
    pub name: String,
    /// Declared media type, e.g. `application/pdf` or `image/png`.
    pub media_type: String,
    /// Size in bytes.
    pub byte_len: u64,
    /// The bytes themselves.
    pub payload: Payload,
}

impl RawInput {
    /// Wrap in-memory bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            media_type: media_type.into(),
            byte_len: bytes.len() as u64,
            payload: Payload::Memory(bytes),
        }
    }

    /// Describe a file on disk, guessing its media type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| EverythingPdfError::io(path, e))?;
        if !metadata.is_file() {
            return Err(EverythingPdfError::validation(format!(
                "'{}' is not a file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            media_type: media_type_for_path(path).to_string(),
            name,
            byte_len: metadata.len(),
            payload: Payload::File(path.to_path_buf()),
        })
    }
}

/// Best-effort media type from a file extension.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => PDF_MEDIA_TYPE,
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "txt" => "text/plain",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Classification result
// ---------------------------------------------------------------------------

/// A classified input, ready to be queued.
#[derive(Debug, Clone)]
pub struct QueuedInput {
    /// Display name.
    pub display_name: String,
    /// Size in bytes.
    pub byte_size: u64,
    /// Document or image (with subkind).
    pub kind: InputKind,
    /// The bytes.
    pub payload: Payload,
}

/// Why an input was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Neither a PDF nor an image.
    UnsupportedType,
    /// A raster image in a format other than PNG or JPEG.
    UnsupportedImageFormat(String),
}

/// An input the classifier refused.
#[derive(Debug, Clone)]
pub struct RejectedInput {
    /// Original display name, for the user-facing message.
    pub name: String,
    /// Declared media type.
    pub media_type: String,
    pub reason: RejectReason,
}

impl RejectedInput {
    /// User-facing explanation.
    pub fn message(&self) -> String {
        match &self.reason {
            RejectReason::UnsupportedType => format!(
                "Unsupported: {}. Tip: export or print documents to PDF first, then upload.",
                self.name
            ),
            RejectReason::UnsupportedImageFormat(subtype) => format!(
                "Unsupported image format '{subtype}': {}. Only PNG and JPEG images can be added.",
                self.name
            ),
        }
    }
}

impl From<&RejectedInput> for EverythingPdfError {
    fn from(rejected: &RejectedInput) -> Self {
        EverythingPdfError::Classification {
            name: rejected.name.clone(),
            reason: match &rejected.reason {
                RejectReason::UnsupportedType => {
                    format!("media type '{}' is not supported", rejected.media_type)
                }
                RejectReason::UnsupportedImageFormat(subtype) => {
                    format!("image format '{subtype}' is not supported")
                }
            },
        }
    }
}

/// Outcome of classifying one input.
#[derive(Debug, Clone)]
pub enum Classification {
    Accepted(QueuedInput),
    Rejected(RejectedInput),
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classify a single input. Never fails; unsupported inputs come back as
/// [`Classification::Rejected`].
pub fn classify(input: RawInput) -> Classification {
    let essence = media_type_essence(&input.media_type);

    let kind = if essence == PDF_MEDIA_TYPE || has_pdf_extension(&input.name) {
        Some(InputKind::Document)
    } else if let Some(subtype) = essence.strip_prefix("image/") {
        match image_subkind(subtype) {
            Some(subkind) => Some(InputKind::Image(subkind)),
            None => {
                debug!(name = %input.name, subtype, "rejecting unsupported image format");
                return Classification::Rejected(RejectedInput {
                    name: input.name,
                    media_type: input.media_type,
                    reason: RejectReason::UnsupportedImageFormat(subtype.to_string()),
                });
            }
        }
    } else {
        None
    };

    match kind {
        Some(kind) => Classification::Accepted(QueuedInput {
            display_name: input.name,
            byte_size: input.byte_len,
            kind,
            payload: input.payload,
        }),
        None => {
            debug!(name = %input.name, media_type = %input.media_type, "rejecting unsupported input");
            Classification::Rejected(RejectedInput {
                name: input.name,
                media_type: input.media_type,
                reason: RejectReason::UnsupportedType,
            })
        }
    }
}

/// Classify a batch, splitting it into accepted inputs (in original order)
/// and rejections.
pub fn classify_batch(
    inputs: impl IntoIterator<Item = RawInput>,
) -> (Vec<QueuedInput>, Vec<RejectedInput>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for input in inputs {
        match classify(input) {
            Classification::Accepted(item) => accepted.push(item),
            Classification::Rejected(r) => rejected.push(r),
        }
    }
    (accepted, rejected)
}

/// Lowercased media type without parameters (`Image/PNG; q=1` → `image/png`).
fn media_type_essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn has_pdf_extension(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

fn image_subkind(subtype: &str) -> Option<ImageSubkind> {
    match subtype {
        "png" => Some(ImageSubkind::Png),
        "jpeg" | "jpg" | "pjpeg" => Some(ImageSubkind::Jpeg),
        _ => None,
    }
}
