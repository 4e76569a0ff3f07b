use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL_SECS: u64 = 5;
const MAX_BUFFER_SIZE: usize = 1_000_000;
const CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open output file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write output file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("record sink is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub written: usize,
    pub serialize_failed: usize,
}

/// Single owner of the JSON-lines output file. Records arrive over a channel,
/// so concurrent producers never interleave partial lines.
pub struct BufferedWriter<T> {
    receiver: mpsc::Receiver<T>,
    writer: BufWriter<File>,
    path: PathBuf,
    batch: Vec<String>,
    batch_bytes: usize,
    last_flush: Instant,
    summary: SinkSummary,
}

/// Producer side of a [`BufferedWriter`].
pub struct RecordSink<T> {
    sender: mpsc::Sender<T>,
}

impl<T> RecordSink<T> {
    /// Queue a record for writing. Fails only once the writer has stopped.
    pub async fn append(&self, record: T) -> Result<(), SinkError> {
        self.sender.send(record).await.map_err(|_| SinkError::Closed)
    }
}

impl<T> Clone for RecordSink<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Serialize> BufferedWriter<T> {
    /// Open (or create) the output file in append mode and return the writer
    /// together with its sink.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, RecordSink<T>), SinkError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| SinkError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(open_error)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_error)?;

        let writer = BufWriter::with_capacity(8192, file);
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

        Ok((
            Self {
                receiver,
                writer,
                path,
                batch: Vec::with_capacity(BATCH_SIZE),
                batch_bytes: 0,
                last_flush: Instant::now(),
                summary: SinkSummary::default(),
            },
            RecordSink { sender },
        ))
    }

    /// Writer loop, run as its own task. Ends when every sink is dropped, or
    /// with an error as soon as the file cannot be written.
    pub async fn run(mut self) -> Result<SinkSummary, SinkError> {
        while let Some(record) = self.receiver.recv().await {
            self.add_to_batch(&record);

            if self.should_flush() {
                self.flush()?;
            }
        }

        self.flush()?;
        debug!(path = %self.path.display(), written = self.summary.written, "record sink closed");
        Ok(self.summary)
    }

    fn add_to_batch(&mut self, record: &T) {
        match serde_json::to_string(record) {
            Ok(json_line) => {
                self.batch_bytes += json_line.len() + 1;
                self.batch.push(json_line);
            }
            Err(e) => {
                self.summary.serialize_failed += 1;
                error!(error = %e, "failed to serialize record, skipping");
            }
        }
    }

    fn should_flush(&self) -> bool {
        self.batch.len() >= BATCH_SIZE
            || self.batch_bytes >= MAX_BUFFER_SIZE
            || self.last_flush.elapsed() >= Duration::from_secs(FLUSH_INTERVAL_SECS)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        for line in &self.batch {
            writeln!(self.writer, "{}", line).map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        self.writer.flush().map_err(|source| SinkError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.summary.written += self.batch.len();
        self.batch.clear();
        self.batch_bytes = 0;
        self.last_flush = Instant::now();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ExtractedRecord, Record, TextRecord};
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to serialize"))
        }
    }

    #[derive(Serialize)]
    #[serde(untagged)]
    enum MaybeRecord {
        Ok(Record),
        Broken(Unserializable),
    }

    fn record(title: &str) -> Record {
        Record::Full(ExtractedRecord {
            title: title.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_appends_one_line_per_record_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jl");

        let (writer, sink) = BufferedWriter::open(&path).unwrap();
        let task = tokio::spawn(writer.run());
        for i in 0..250 {
            sink.append(record(&format!("doc {i}"))).await.unwrap();
        }
        sink.append(Record::Text(TextRecord { text: "multi\nline".to_string() }))
            .await
            .unwrap();
        drop(sink);
        let summary = task.await.unwrap().unwrap();

        assert_eq!(summary, SinkSummary { written: 251, serialize_failed: 0 });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with('\n'));
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 251);
        for (i, line) in lines[..250].iter().enumerate() {
            let parsed: ExtractedRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.title, format!("doc {i}"));
        }
        let last: TextRecord = serde_json::from_str(lines[250]).unwrap();
        assert_eq!(last.text, "multi\nline");
    }

    #[tokio::test]
    async fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jl");
        std::fs::write(&path, "{\"text\":\"earlier run\"}\n").unwrap();

        let (writer, sink) = BufferedWriter::open(&path).unwrap();
        let task = tokio::spawn(writer.run());
        sink.append(record("new")).await.unwrap();
        drop(sink);
        task.await.unwrap().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("{\"text\":\"earlier run\"}\n"));
    }

    #[tokio::test]
    async fn test_serialization_failure_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jl");

        let (writer, sink) = BufferedWriter::open(&path).unwrap();
        let task = tokio::spawn(writer.run());
        sink.append(MaybeRecord::Ok(record("first"))).await.unwrap();
        sink.append(MaybeRecord::Broken(Unserializable)).await.unwrap();
        sink.append(MaybeRecord::Ok(record("second"))).await.unwrap();
        drop(sink);
        let summary = task.await.unwrap().unwrap();

        assert_eq!(summary, SinkSummary { written: 2, serialize_failed: 1 });
        let contents = std::fs::read_to_string(&path).unwrap();
        let titles: Vec<String> = contents
            .lines()
            .map(|line| serde_json::from_str::<ExtractedRecord>(line).unwrap().title)
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("records.jl");

        let (writer, sink) = BufferedWriter::<Record>::open(&path).unwrap();
        drop(sink);
        writer.run().await.unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();

        let result = BufferedWriter::<Record>::open(dir.path());

        assert!(matches!(result, Err(SinkError::Open { .. })));
    }

    #[tokio::test]
    async fn test_append_after_writer_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, sink) = BufferedWriter::<Record>::open(dir.path().join("records.jl")).unwrap();
        drop(writer);

        let err = sink.append(record("late")).await.unwrap_err();

        assert!(matches!(err, SinkError::Closed));
    }
}
