//! Tool availability check.

use console::style;

use crate::cli::icons::{error, success};
use crate::config::Config;
use crate::ocr::tools::check_tools;
use crate::ocr::{OcrSettings, TesseractFactory};

/// Check if required extraction and OCR tools are installed.
pub async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("Extraction Tool Status").bold());
    println!("{}", "-".repeat(50));

    let mut all_found = true;
    for (tool, available) in check_tools() {
        let status = if available {
            style("✓ found").green()
        } else {
            all_found = false;
            style("✗ not found").red()
        };
        println!("  {:<15} {}", tool, status);
    }

    let tesseract = TesseractFactory::new(OcrSettings::from_config(&config.ocr));
    let engine_status = if tesseract.is_available() {
        style("✓ available").green()
    } else {
        all_found = false;
        style("✗ not available").red()
    };
    println!(
        "  {:<15} {} ({})",
        "OCR engine",
        engine_status,
        style(&config.ocr.ocr_language).dim()
    );

    println!();
    if all_found {
        println!("{} All tools available", success());
    } else {
        println!(
            "{} Some tools are missing. Install with: apt install poppler-utils tesseract-ocr",
            error()
        );
    }
    Ok(())
}
