//! Text quality heuristics used to decide whether extracted text is usable
//! or whether the document has to go through OCR.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::ExtractionConfig;

/// Punctuation counted as recognizable in addition to ASCII letters, digits and whitespace.
const RECOGNIZABLE_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '"', '\'', '`', '-',
];

/// Three or more consecutive words of at least two ASCII letters.
fn meaningful_text_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?-u)[a-zA-Z]{2,}(?:\s+[a-zA-Z]{2,}){2,}")
            .expect("meaningful text pattern is valid")
    })
}

/// Signals computed from a text sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    /// Normalized characters per page, in `[0, 1]`.
    pub density: f64,
    /// Fraction of recognizable characters, in `[0, 1]`.
    pub quality: f64,
    /// Whether the text contains a run of prose-like words.
    pub has_meaningful_text: bool,
}

/// Thresholds for the accept/reject decision.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityAnalyzer {
    quality_threshold: f64,
    min_text_density: f64,
    expected_min_chars_per_page: f64,
    minimum_text_length: usize,
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

impl QualityAnalyzer {
    /// Build an analyzer from the extraction configuration.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            quality_threshold: config.quality_threshold,
            min_text_density: config.min_text_density,
            expected_min_chars_per_page: config.expected_min_chars_per_page,
            minimum_text_length: config.minimum_text_length as usize,
        }
    }

    /// Compute all metrics for `text` spread over `page_count` pages.
    pub fn analyze(&self, text: &str, page_count: u32) -> TextMetrics {
        TextMetrics {
            density: self.density(text, page_count),
            quality: quality(text),
            has_meaningful_text: has_meaningful_text(text),
        }
    }

    /// Characters per page normalized against the expected minimum, capped at 1.
    pub fn density(&self, text: &str, page_count: u32) -> f64 {
        if self.expected_min_chars_per_page <= 0.0 {
            return 1.0;
        }
        let chars_per_page = text.chars().count() as f64 / f64::from(page_count.max(1));
        (chars_per_page / self.expected_min_chars_per_page).min(1.0)
    }

    /// Returns true when the text is not good enough to skip OCR.
    pub fn should_use_ocr(&self, metrics: &TextMetrics, text: &str) -> bool {
        if text.trim().chars().count() < self.minimum_text_length {
            return true;
        }

        !metrics.has_meaningful_text
            || metrics.density < self.min_text_density
            || metrics.quality < self.quality_threshold
    }
}

/// ASCII letters and digits, ASCII whitespace (vertical tab included) and
/// the fixed punctuation set. Accented and non-Latin letters do not count.
fn is_recognizable(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r')
        || RECOGNIZABLE_PUNCTUATION.contains(&c)
}

/// Fraction of recognizable characters. Empty text scores 0.
pub fn quality(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let recognizable = text.chars().filter(|c| is_recognizable(*c)).count();
    recognizable as f64 / total as f64
}

/// Detect at least three consecutive word-like tokens.
pub fn has_meaningful_text(text: &str) -> bool {
    meaningful_text_pattern().is_match(text)
}
