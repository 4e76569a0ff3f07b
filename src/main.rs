use anyhow::Context;
use clap::Parser;
use infocard::config::{Args, CrawlConfig};
use infocard::crawler;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = CrawlConfig::try_from(args).context("invalid configuration")?;

    let summary = crawler::run(&config)
        .await
        .with_context(|| format!("extraction run aborted, output: {}", config.output.display()))?;

    if summary.fetch_failed > 0 || summary.serialize_failed > 0 {
        warn!(
            fetch_failed = summary.fetch_failed,
            serialize_failed = summary.serialize_failed,
            "some targets produced no record"
        );
    }
    info!(
        targets = summary.targets,
        written = summary.records_written,
        "Extraction complete. Check '{}' for the results.",
        config.output.display()
    );

    Ok(())
}
