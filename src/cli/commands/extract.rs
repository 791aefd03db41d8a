//! Document text extraction command.

use std::path::Path;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::icons::{dim_arrow, success, warn};
use crate::config::Config;
use crate::services::{OcrPipeline, PageProgress};
use crate::utils::format_size;

/// Extract text from one document and print it.
pub async fn cmd_extract(
    config: &Config,
    file: &Path,
    pages: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let pipeline = OcrPipeline::new(config.ocr.clone())?;
    let progress = PageProgress::new();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let task = {
        let pipeline = pipeline.clone();
        let progress = progress.clone();
        let file = file.to_path_buf();
        tokio::spawn(async move { pipeline.extract_with_progress(&file, pages, progress).await })
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    while !task.is_finished() {
        ticker.tick().await;
        pb.set_length(u64::from(progress.total()));
        pb.set_position(u64::from(progress.completed()));
    }
    pb.finish_and_clear();

    let output = task.await??;
    let metadata = output.metadata();
    let size = output
        .file_size
        .map_or_else(|| "size unknown".to_string(), format_size);

    if json {
        let body = serde_json::json!({
            "text": output.extracted.text,
            "used_ocr": output.extracted.used_ocr,
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let icon = if output.extracted.text.trim().is_empty() {
        warn()
    } else {
        success()
    };
    eprintln!(
        "{} {} ({}, {} pages, {})",
        icon,
        style(file.display()).bold(),
        output.method,
        output.page_count,
        size
    );
    for (key, value) in &metadata {
        eprintln!("  {} {}: {}", dim_arrow(), key, style(value).dim());
    }
    println!("{}", output.extracted.text);
    Ok(())
}
