//! Kickseg - Kick trial segmentation and angular momentum analysis
//!
//! Runs the stages described by a JSON configuration file.

use anyhow::{Context, Result};
use kickseg::{Pipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: kickseg <config.json>")?;
    let config = PipelineConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {path}"))?;

    let report = Pipeline::new(config)
        .run()
        .context("pipeline failed")?;
    info!(
        "Done: {} sliced, {} scaled, {} averaged, {} momentum files",
        report.sliced.len(),
        report.scaled.len(),
        report.averaged.len(),
        report.momentum.len()
    );
    Ok(())
}
