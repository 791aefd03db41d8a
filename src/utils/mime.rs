//! Content-based MIME detection and document classification.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Fallback when neither content nor extension identify a file.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Broad document kind used to route extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Pdf,
    Image,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Image => "IMAGE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect a file's MIME type from its leading bytes, falling back to the
/// file extension.
pub fn detect_mime_type(path: &Path) -> String {
    if let Some(mime) = sniff(path) {
        return mime;
    }
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

fn sniff(path: &Path) -> Option<String> {
    // Read first 8KB for magic byte detection
    let mut file = File::open(path).ok()?;
    let mut buffer = [0u8; 8192];
    let bytes_read = file.read(&mut buffer).ok()?;
    if bytes_read == 0 {
        return None;
    }
    infer::get(&buffer[..bytes_read]).map(|t| t.mime_type().to_string())
}

/// Classify a MIME type into the kinds the pipeline can handle.
pub fn document_type(mime: &str) -> DocumentType {
    let mime = mime.split(';').next().unwrap_or(mime).trim().to_lowercase();
    if mime == "application/pdf" {
        DocumentType::Pdf
    } else if mime.starts_with("image/") {
        DocumentType::Image
    } else {
        DocumentType::Unknown
    }
}
