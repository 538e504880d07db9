//! Worker process supervision.
//!
//! [`ProcessSupervisor::spawn`] starts one evaluation worker per attempt and
//! returns an [`Attempt`] handle. The handle yields the worker's merged
//! stdout/stderr one line at a time, drops progress-bar noise, and kills the
//! process as soon as the batch's cancellation token fires.

use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{BatchParams, Job};
use crate::config::WorkerConfig;
use crate::error::BenchError;

/// Substrings of worker output lines that are never forwarded.
const NOISE_MARKERS: &[&str] = &["%|", "Running loglikelihood"];

type LineStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

/// Returns true for progress-bar fragments and per-request chatter.
pub fn is_noise(line: &str) -> bool {
    NOISE_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Terminal status of one worker attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Success,
    /// Non-zero exit. `None` when a foreign signal ended the process.
    Failed(Option<i32>),
    /// Killed through the cancellation token before it finished.
    Cancelled,
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerExit::Success => write!(f, "Code 0"),
            WorkerExit::Failed(Some(code)) => write!(f, "Code {code}"),
            WorkerExit::Failed(None) => write!(f, "terminated by signal"),
            WorkerExit::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Fully resolved worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    /// Build the `lm_eval` invocation for one job.
    pub fn for_job(
        worker: &WorkerConfig,
        job: &Job,
        params: &BatchParams,
        output_dir: &Path,
    ) -> Self {
        let mut args = worker.args.clone();
        args.extend([
            "--model".to_string(),
            worker.model_backend.clone(),
            "--model_args".to_string(),
            format!("pretrained={},gguf_file={}", job.model_ref, job.artifact_ref),
            "--tasks".to_string(),
            job.tasks.join(","),
            "--output_path".to_string(),
            output_dir.display().to_string(),
            "--batch_size".to_string(),
            params.batch_size.to_string(),
        ]);
        if job.limit > 0 {
            args.extend(["--limit".to_string(), job.limit.to_string()]);
        }
        if !params.device.is_empty() && params.device != "auto" {
            args.extend(["--device".to_string(), params.device.clone()]);
        }
        if !params.verbosity.is_empty() {
            args.extend(["--verbosity".to_string(), params.verbosity.clone()]);
        }

        let mut env = vec![
            ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
            ("HF_HUB_DISABLE_PROGRESS_BARS".to_string(), "1".to_string()),
        ];
        env.extend(worker.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            env,
            ..Self::new(worker.program.clone(), args)
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Spawns worker attempts.
pub struct ProcessSupervisor;

impl ProcessSupervisor {
    /// Start the worker with stdout and stderr piped into one line stream.
    pub fn spawn(cmd: &WorkerCommand, cancel: CancellationToken) -> Result<Attempt, BenchError> {
        debug!(program = %cmd.program(), args = ?cmd.args(), "spawning worker");

        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BenchError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        let stdout: LineStream = match child.stdout.take() {
            Some(out) => Box::pin(read_lines(out)),
            None => Box::pin(tokio_stream::empty::<std::io::Result<String>>()),
        };
        let stderr: LineStream = match child.stderr.take() {
            Some(err) => Box::pin(read_lines(err)),
            None => Box::pin(tokio_stream::empty::<std::io::Result<String>>()),
        };

        Ok(Attempt {
            child: Some(child),
            lines: Box::pin(stdout.merge(stderr)),
            cancel,
            killed: false,
        })
    }
}

// Lines are decoded lossily so one bad byte never ends the stream.
fn read_lines<R>(reader: R) -> impl Stream<Item = std::io::Result<String>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async_stream::try_stream! {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(512);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            yield line.trim_end_matches(['\r', '\n']).to_string();
        }
    }
}

/// A live worker process. Exactly one exists per attempt.
pub struct Attempt {
    child: Option<Child>,
    lines: LineStream,
    cancel: CancellationToken,
    killed: bool,
}

impl Attempt {
    /// Next non-noise output line, or `None` once output ends or the attempt
    /// is cancelled.
    pub async fn next_line(&mut self) -> Result<Option<String>, BenchError> {
        loop {
            if self.killed {
                return Ok(None);
            }
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("cancellation requested; killing worker");
                    self.kill();
                    return Ok(None);
                }
                line = self.lines.next() => match line {
                    Some(Ok(line)) if is_noise(&line) => continue,
                    Some(Ok(line)) => return Ok(Some(line)),
                    Some(Err(err)) => {
                        self.kill();
                        return Err(err.into());
                    }
                    None => return Ok(None),
                },
            }
        }
    }

    /// Request termination without waiting for the process to exit.
    pub fn kill(&mut self) {
        self.killed = true;
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.start_kill() {
                warn!(error = %err, "failed to signal worker");
            }
        }
    }

    /// Exit status if the worker has already ended, `None` while it runs.
    pub fn poll(&mut self) -> Result<Option<WorkerExit>, BenchError> {
        if self.killed {
            return Ok(Some(WorkerExit::Cancelled));
        }
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?.map(classify)),
            None => Ok(Some(WorkerExit::Cancelled)),
        }
    }

    /// Wait for the worker to exit and classify its status.
    pub async fn finish(mut self) -> Result<WorkerExit, BenchError> {
        if let Some(exit) = self.poll()? {
            return Ok(exit);
        }
        let Some(mut child) = self.child.take() else {
            return Ok(WorkerExit::Cancelled);
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                info!("cancellation requested; killing worker");
                if let Err(err) = child.start_kill() {
                    warn!(error = %err, "failed to signal worker");
                }
                Ok(WorkerExit::Cancelled)
            }
            status = child.wait() => Ok(classify(status?)),
        }
    }
}

fn classify(status: ExitStatus) -> WorkerExit {
    match status.code() {
        Some(0) => WorkerExit::Success,
        code => WorkerExit::Failed(code),
    }
}
