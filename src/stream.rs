//! Wire framing of batch output.
//!
//! [`event_stream`] turns the runner's [`LogEvent`]s into [`WireMessage`]s,
//! appending each event's text to the batch transcript before the message is
//! handed on. The transcript therefore never lags behind what a client saw.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::batch::{LogEvent, Progress, StartInfo};
use crate::error::BenchError;

/// Append-only text record of one batch.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    file: File,
}

impl Transcript {
    /// Open `<logs_dir>/<name>` for appending, creating both if needed.
    pub fn open(logs_dir: &Path, name: &str) -> Result<Self, BenchError> {
        std::fs::create_dir_all(logs_dir)?;
        let path = logs_dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, text: &str) -> std::io::Result<()> {
        self.file.write_all(text.as_bytes())?;
        self.file.flush()
    }
}

/// One self-contained message of the batch event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub log: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_info: Option<StartInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    pub done: bool,
}

impl WireMessage {
    pub fn from_event(event: LogEvent) -> Self {
        let done = event.is_batch_complete();
        Self {
            log: event.text,
            results: event.results,
            path: event.path,
            start_info: event.start_info,
            progress: event.progress,
            done,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            warn!(error = %err, "failed to encode wire message");
            format!(r#"{{"log":"","done":{}}}"#, self.done)
        })
    }
}

/// Mirror every event into `transcript`, then frame it as a [`WireMessage`].
///
/// A failed transcript write is logged and the message is still emitted.
pub fn event_stream<S>(events: S, mut transcript: Transcript) -> impl Stream<Item = WireMessage>
where
    S: Stream<Item = LogEvent>,
{
    events.map(move |event| {
        if let Err(err) = transcript.append(&event.text) {
            warn!(path = %transcript.path().display(), error = %err, "transcript write failed");
        }
        WireMessage::from_event(event)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_events() -> Vec<LogEvent> {
        vec![
            LogEvent::started("--- BATCH STARTED: 1 Models Scheduled ---\n", "BATCH_20240101_000000.log"),
            LogEvent::job_header("JOB 1/1: m.gguf\n", Progress { job: 1, total: 1 }),
            LogEvent::text("hellaswag | acc | 0.51\n"),
            LogEvent::saved("[SUCCESS] Results saved: db/abc.json\n", PathBuf::from("db/abc.json")),
            LogEvent::batch_complete(),
        ]
    }

    #[tokio::test]
    async fn transcript_is_concatenation_of_event_text() {
        let dir = TempDir::new().unwrap();
        let transcript = Transcript::open(dir.path(), "BATCH_20240101_000000.log").unwrap();
        let path = transcript.path().to_path_buf();
        let events = sample_events();
        let expected: String = events.iter().map(|e| e.text.as_str()).collect();

        let messages: Vec<_> = event_stream(tokio_stream::iter(events), transcript)
            .collect()
            .await;

        assert_eq!(messages.len(), 5);
        assert_eq!(std::fs::read_to_string(path).unwrap(), expected);
    }

    #[tokio::test]
    async fn only_sentinel_message_is_done() {
        let dir = TempDir::new().unwrap();
        let transcript = Transcript::open(dir.path(), "t.log").unwrap();
        let messages: Vec<_> = event_stream(tokio_stream::iter(sample_events()), transcript)
            .collect()
            .await;

        let done: Vec<bool> = messages.iter().map(|m| m.done).collect();
        assert_eq!(done, vec![false, false, false, false, true]);
        assert_eq!(messages[4].results, Some(Vec::new()));
        assert_eq!(messages[3].path, Some(PathBuf::from("db/abc.json")));
    }

    #[test]
    fn wire_json_omits_absent_fields() {
        let msg = WireMessage::from_event(LogEvent::text("line\n"));
        assert_eq!(msg.to_json(), r#"{"log":"line\n","done":false}"#);

        let first = WireMessage::from_event(LogEvent::started("start\n", "BATCH_x.log"));
        let value: serde_json::Value = serde_json::from_str(&first.to_json()).unwrap();
        assert_eq!(value["start_info"]["log_file"], "BATCH_x.log");
    }

    #[test]
    fn transcript_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let mut first = Transcript::open(&dir.path().join("logs"), "b.log").unwrap();
        first.append("one\n").unwrap();
        drop(first);
        let mut second = Transcript::open(&dir.path().join("logs"), "b.log").unwrap();
        second.append("two\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(second.path()).unwrap(),
            "one\ntwo\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn batch_transcript_matches_streamed_text() {
        use crate::batch::{Batch, BatchParams, BatchRunner, Job, RetryPolicy};
        use crate::config::WorkerConfig;
        use crate::delivery::HttpCollector;
        use crate::store::ResultStore;
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;

        let dir = TempDir::new().unwrap();
        let worker = WorkerConfig {
            program: "sh".into(),
            args: vec!["-c".into(), "echo one; echo two >&2; exit 1".into(), "worker".into()],
            ..WorkerConfig::default()
        };
        let runner: BatchRunner<HttpCollector> =
            BatchRunner::new(ResultStore::new(dir.path().join("db")), worker, dir.path().join("tmp"))
                .with_execution_policy(RetryPolicy::new(2, Duration::ZERO))
                .with_job_pause(Duration::ZERO);
        let batch = Batch::new(vec![Job::new("org/model", "m.gguf")], BatchParams::default());
        let transcript = Transcript::open(&dir.path().join("logs"), &batch.transcript_name()).unwrap();
        let path = transcript.path().to_path_buf();

        let messages: Vec<_> =
            event_stream(runner.run(batch, CancellationToken::new()), transcript)
                .collect()
                .await;

        let streamed: String = messages.iter().map(|m| m.log.as_str()).collect();
        assert_eq!(std::fs::read_to_string(path).unwrap(), streamed);
        assert!(messages.last().unwrap().done);
        assert_eq!(messages.iter().filter(|m| m.done).count(), 1);
    }
}
