use futures::TryStreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{CrawlConfig, CrawlTarget, ExtractionMode};
use crate::http_client::HttpClient;
use crate::parser::{self, Record};
use crate::writer::{BufferedWriter, RecordSink, SinkError};

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("writer task failed: {0}")]
    WriterTask(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub targets: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    pub records_written: usize,
    pub serialize_failed: usize,
}

#[derive(Default)]
struct CrawlStats {
    fetched: AtomicUsize,
    fetch_failed: AtomicUsize,
}

/// Fetch, extract and write every target. Per-target failures are logged and
/// counted; only a sink failure aborts the run.
pub async fn run(config: &CrawlConfig) -> Result<CrawlSummary, CrawlError> {
    let http_client = Arc::new(HttpClient::new(config)?);
    let (writer, sink) = BufferedWriter::<Record>::open(&config.output)?;
    let writer_task = tokio::spawn(writer.run());
    let stats = Arc::new(CrawlStats::default());

    info!(
        targets = config.targets.len(),
        output = %config.output.display(),
        mode = ?config.mode,
        concurrency = config.concurrency,
        "starting extraction run"
    );

    let processed = tokio_stream::iter(config.targets.iter().cloned().map(Ok))
        .try_for_each_concurrent(config.concurrency, |target| {
            let http_client = http_client.clone();
            let sink = sink.clone();
            let stats = stats.clone();
            let mode = config.mode;

            async move { process_target(target, &http_client, &sink, mode, &stats).await }
        })
        .await;

    // Closing the last sink lets the writer drain and finish.
    drop(sink);
    let sink_summary = writer_task.await??;
    processed?;

    Ok(CrawlSummary {
        targets: config.targets.len(),
        fetched: stats.fetched.load(Ordering::Relaxed),
        fetch_failed: stats.fetch_failed.load(Ordering::Relaxed),
        records_written: sink_summary.written,
        serialize_failed: sink_summary.serialize_failed,
    })
}

async fn process_target(
    target: CrawlTarget,
    http_client: &HttpClient,
    sink: &RecordSink<Record>,
    mode: ExtractionMode,
    stats: &CrawlStats,
) -> Result<(), SinkError> {
    let document = match http_client.fetch(&target).await {
        Ok(document) => document,
        Err(e) => {
            stats.fetch_failed.fetch_add(1, Ordering::Relaxed);
            warn!(url = %target, error = %e.cause, "fetch failed, skipping target");
            return Ok(());
        }
    };
    stats.fetched.fetch_add(1, Ordering::Relaxed);

    let record = parser::extract(&document, mode);
    sink.append(record).await
}
