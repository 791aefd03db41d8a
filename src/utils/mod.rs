//! Shared utility functions.
//!
//! - `mime`: content-based MIME detection and document classification
//! - `format`: human-readable sizes

mod format;
mod mime;

pub use format::{format_size, size_in_mb};
pub use mime::{detect_mime_type, document_type, DocumentType, OCTET_STREAM};
