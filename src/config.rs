//! Configuration management for doctext using the prefer crate.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ocr::RenderMode;

/// Errors raised by configuration validation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Tuning for quality checks, rasterization and the parallel OCR pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Pages per OCR chunk task.
    pub chunk_size: u32,
    /// Upper bound on concurrently running OCR workers.
    pub max_threads: u32,
    /// Global timeout for all chunk tasks of one document.
    pub timeout_minutes: u32,
    /// Rasterization resolution.
    pub dpi: f32,
    /// Color mode used when rendering pages for OCR.
    pub render_mode: RenderMode,
    /// Minimum fraction of recognizable characters.
    pub quality_threshold: f64,
    /// Minimum normalized characters-per-page signal.
    pub min_text_density: f64,
    /// Characters per page that count as a full page of text.
    pub expected_min_chars_per_page: f64,
    /// Trimmed text shorter than this always goes to OCR.
    pub minimum_text_length: u32,
    /// Tesseract language specification (e.g. "eng+vie").
    pub ocr_language: String,
    /// Directory containing Tesseract trained data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_data_path: Option<PathBuf>,
    /// Documents with at most this many pages are OCR'd sequentially.
    pub ocr_page_threshold: u32,
    /// Parent directory for scoped workspaces (system temp dir if unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// PDFs larger than this are judged from a sample of their first pages.
    pub large_size_threshold_mb: u64,
    /// Leading pages sampled for large PDFs.
    pub sample_pages: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            max_threads: 4,
            timeout_minutes: 60,
            dpi: 300.0,
            render_mode: RenderMode::Color,
            quality_threshold: 0.8,
            min_text_density: 0.01,
            expected_min_chars_per_page: 250.0,
            minimum_text_length: 50,
            ocr_language: "eng+vie".to_string(),
            trained_data_path: None,
            ocr_page_threshold: 5,
            temp_dir: None,
            large_size_threshold_mb: 50,
            sample_pages: 5,
        }
    }
}

impl ExtractionConfig {
    /// Chunks allowed to wait for a free worker slot.
    pub fn queue_capacity(&self) -> usize {
        2 * self.max_threads as usize
    }

    /// Global OCR timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_minutes) * 60)
    }

    /// Whether a file of `size_bytes` takes the sampled large-file path.
    pub fn is_large_file(&self, size_bytes: u64) -> bool {
        size_bytes > self.large_size_threshold_mb.saturating_mul(1024 * 1024)
    }

    /// Parent directory for scoped workspaces.
    pub fn workspace_parent(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(env::temp_dir)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be at least 1"));
        }
        if self.max_threads == 0 {
            return Err(invalid("max_threads", "must be at least 1"));
        }
        if !(self.dpi.is_finite() && self.dpi > 0.0) {
            return Err(invalid("dpi", format!("must be positive, got {}", self.dpi)));
        }
        for (field, value) in [
            ("quality_threshold", self.quality_threshold),
            ("min_text_density", self.min_text_density),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("must be within [0, 1], got {}", value)));
            }
        }
        if self.expected_min_chars_per_page < 0.0 {
            return Err(invalid("expected_min_chars_per_page", "must not be negative"));
        }
        if self.sample_pages == 0 {
            return Err(invalid("sample_pages", "must be at least 1"));
        }
        if self.ocr_language.trim().is_empty() {
            return Err(invalid("ocr_language", "must not be empty"));
        }
        Ok(())
    }

    /// Apply `DOCTEXT_*` environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(lang) = env::var("DOCTEXT_OCR_LANGUAGE") {
            if !lang.is_empty() {
                self.ocr_language = lang;
            }
        }

        if let Ok(path) = env::var("DOCTEXT_TESSDATA") {
            if !path.is_empty() {
                self.trained_data_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(threads) = env::var("DOCTEXT_MAX_THREADS") {
            match threads.parse::<u32>() {
                Ok(n) if n > 0 => self.max_threads = n,
                _ => tracing::warn!("Ignoring invalid DOCTEXT_MAX_THREADS value: {}", threads),
            }
        }

        self
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Text extraction and OCR settings.
    #[serde(default)]
    pub ocr: ExtractionConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers doctext config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("doctext").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}, using defaults", e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self {
            ocr: ExtractionConfig::default().with_env_overrides(),
            source_path: None,
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        config.ocr = config.ocr.with_env_overrides();
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

        match ext {
            "json" => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e)),
        }
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {}", e))
    }
}
