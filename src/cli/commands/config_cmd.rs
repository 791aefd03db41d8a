//! Configuration commands.

use console::style;

use crate::cli::icons::dim_arrow;
use crate::config::Config;

/// Print the effective configuration.
pub async fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());

    config.ocr.validate()?;
    let rendered = config.to_toml().map_err(|e| anyhow::anyhow!(e))?;

    eprintln!("{} Source: {}", dim_arrow(), style(source).dim());
    eprintln!(
        "{} Worker pool: {} concurrent chunks, queue {}",
        dim_arrow(),
        config.ocr.max_threads,
        config.ocr.queue_capacity()
    );
    eprintln!(
        "{} Large PDFs: over {} MB, first {} pages sampled",
        dim_arrow(),
        config.ocr.large_size_threshold_mb,
        config.ocr.sample_pages
    );
    println!("{}", rendered);
    Ok(())
}
