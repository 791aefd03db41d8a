//! Direct extraction of embedded text using Poppler's pdftotext and pdfinfo.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

use super::tools::{classify_output, CommandOutcome};

/// Page separator emitted by pdftotext.
const PAGE_BREAK: char = '\u{000C}';

/// Errors that can occur during direct text extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document cannot be opened or parsed at all.
    #[error("Document is unreadable: {0}")]
    Unreadable(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of embedded text and page counts for a document.
pub trait TextSource: Send + Sync {
    /// Concatenate all page-level embedded text in page order.
    fn extract_embedded_text(&self, path: &Path) -> Result<String, ExtractError>;

    /// Embedded text of pages `first..=last` (1-based), joined the same way.
    fn extract_pages(&self, path: &Path, first: u32, last: u32) -> Result<String, ExtractError>;

    /// Number of pages in the document.
    fn page_count(&self, path: &Path) -> Result<u32, ExtractError>;
}

fn run_poppler(tool: &'static str, mut cmd: Command) -> Result<String, ExtractError> {
    match classify_output(cmd.output())? {
        CommandOutcome::Success(stdout) => Ok(String::from_utf8_lossy(&stdout).into_owned()),
        CommandOutcome::Failed(stderr) => {
            Err(ExtractError::Unreadable(format!("{} failed: {}", tool, stderr)))
        }
        CommandOutcome::NotFound => Err(ExtractError::ToolNotFound(format!(
            "{} (install poppler-utils)",
            tool
        ))),
    }
}

/// Join pdftotext's form-feed separated pages with newlines, preserving order.
fn join_pages(raw: &str) -> String {
    let pages: Vec<&str> = raw
        .split(PAGE_BREAK)
        .map(|p| p.trim_end_matches(['\r', '\n']))
        .collect();
    let end = pages
        .iter()
        .rposition(|p| !p.trim().is_empty())
        .map_or(0, |i| i + 1);
    pages[..end].join("\n")
}

fn pdftotext_command(path: &Path, pages: Option<(u32, u32)>) -> Command {
    let mut cmd = Command::new("pdftotext");
    cmd.args(["-layout", "-enc", "UTF-8"]);
    if let Some((first, last)) = pages {
        cmd.arg("-f")
            .arg(first.to_string())
            .arg("-l")
            .arg(last.to_string());
    }
    cmd.arg(path).arg("-");
    cmd
}

/// Parse the `Pages:` line of pdfinfo output.
fn parse_page_count(info: &str) -> Option<u32> {
    info.lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|count| count.parse().ok())
}

/// Text extractor backed by Poppler command-line tools.
#[derive(Debug, Clone, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextSource for PdfTextExtractor {
    fn extract_embedded_text(&self, path: &Path) -> Result<String, ExtractError> {
        run_poppler("pdftotext", pdftotext_command(path, None)).map(|raw| join_pages(&raw))
    }

    fn extract_pages(&self, path: &Path, first: u32, last: u32) -> Result<String, ExtractError> {
        let first = first.max(1);
        let cmd = pdftotext_command(path, Some((first, last.max(first))));
        run_poppler("pdftotext", cmd).map(|raw| join_pages(&raw))
    }

    fn page_count(&self, path: &Path) -> Result<u32, ExtractError> {
        let mut cmd = Command::new("pdfinfo");
        cmd.arg(path);
        let info = run_poppler("pdfinfo", cmd)?;
        parse_page_count(&info).ok_or_else(|| {
            ExtractError::Unreadable(format!("no page count reported for {}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_pages_keeps_order_and_drops_trailing_break() {
        let raw = "first page\n\u{000C}second page\n\u{000C}\u{000C}fourth\n\u{000C}";
        assert_eq!(join_pages(raw), "first page\nsecond page\n\nfourth");
    }

    #[test]
    fn test_join_pages_empty_document() {
        assert_eq!(join_pages(""), "");
        assert_eq!(join_pages("\u{000C}\u{000C}"), "");
    }

    #[test]
    fn test_parse_page_count() {
        let info = "Title:          report\nProducer:       x\nPages:          25\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info), Some(25));
        assert_eq!(parse_page_count("Title: nothing"), None);
        assert_eq!(parse_page_count("Pages: many"), None);
    }

    #[test]
    fn test_page_range_arguments() {
        let args = |cmd: &Command| -> Vec<String> {
            cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
        };
        let doc = Path::new("/docs/report.pdf");

        assert_eq!(
            args(&pdftotext_command(doc, None)),
            ["-layout", "-enc", "UTF-8", "/docs/report.pdf", "-"]
        );
        assert_eq!(
            args(&pdftotext_command(doc, Some((1, 5)))),
            ["-layout", "-enc", "UTF-8", "-f", "1", "-l", "5", "/docs/report.pdf", "-"]
        );
    }

    #[test]
    fn test_corrupt_file_is_unreadable_or_tool_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        match PdfTextExtractor::new().extract_embedded_text(&path) {
            Err(ExtractError::Unreadable(_)) | Err(ExtractError::ToolNotFound(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
