use std::path::{Path, PathBuf};
use std::pin::pin;
use std::time::Duration;

use chrono::Local;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job::{Batch, Job, LogEvent, Progress};
use super::retry::{AttemptOutcome, RetryPolicy, Transition};
use crate::config::{BenchConfig, WorkerConfig};
use crate::delivery::Deliver;
use crate::error::BenchError;
use crate::store::{Artifact, ResultStore, find_result_file};
use crate::supervisor::{ProcessSupervisor, WorkerCommand, WorkerExit};

const DEFAULT_JOB_PAUSE: Duration = Duration::from_secs(2);

/// Drives a batch of jobs through worker execution, persistence and delivery.
pub struct BatchRunner<D> {
    store: ResultStore,
    worker: WorkerConfig,
    scratch_root: PathBuf,
    execution: RetryPolicy,
    delivery: RetryPolicy,
    collector: Option<D>,
    job_pause: Duration,
}

impl<D> BatchRunner<D>
where
    D: Deliver + Send + Sync + 'static,
{
    pub fn new(store: ResultStore, worker: WorkerConfig, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            worker,
            scratch_root: scratch_root.into(),
            execution: RetryPolicy::execution(),
            delivery: RetryPolicy::delivery(),
            collector: None,
            job_pause: DEFAULT_JOB_PAUSE,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(
            ResultStore::new(&config.results_dir),
            config.worker.clone(),
            &config.scratch_dir,
        )
        .with_execution_policy(config.retry.execution.policy())
        .with_delivery_policy(config.retry.delivery.policy())
        .with_job_pause(config.job_pause())
    }

    pub fn with_execution_policy(mut self, policy: RetryPolicy) -> Self {
        self.execution = policy;
        self
    }

    pub fn with_delivery_policy(mut self, policy: RetryPolicy) -> Self {
        self.delivery = policy;
        self
    }

    pub fn with_collector(mut self, collector: D) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_job_pause(mut self, pause: Duration) -> Self {
        self.job_pause = pause;
        self
    }

    /// Lazily run every job of `batch` in order.
    ///
    /// Nothing executes until the returned stream is polled, and the next job
    /// only starts once the consumer has taken every event of the current
    /// one. Cancelling `cancel` kills the live worker, cuts the pause between
    /// jobs short and ends the batch before the next job header; the stream
    /// always finishes with a [`LogEvent::batch_complete`] event.
    pub fn run(self, batch: Batch, cancel: CancellationToken) -> impl Stream<Item = LogEvent> + Send + 'static {
        async_stream::stream! {
            let total = batch.jobs().len();
            let params = batch.params().clone();
            info!(
                batch = %batch.id(),
                jobs = total,
                max_attempts = self.execution.max_attempts(),
                results = %self.store.root().display(),
                "batch started"
            );

            yield LogEvent::started(
                format!(
                    "--- BATCH STARTED: {total} Models Scheduled ---\nDevice: {} | Batch Size: {}\n\n",
                    params.device, params.batch_size
                ),
                batch.transcript_name(),
            );

            let rule = "=".repeat(40);

            'jobs: for (index, job) in batch.jobs().iter().enumerate() {
                if cancel.is_cancelled() {
                    info!(batch = %batch.id(), "batch cancelled");
                    yield LogEvent::text("\n[STOPPED] User Cancelled.\n");
                    break 'jobs;
                }

                yield LogEvent::job_header(
                    format!("\n{rule}\nJOB {}/{total}: {}\n{rule}\n", index + 1, job.artifact_ref),
                    Progress { job: index + 1, total },
                );

                let scratch = self.scratch_dir(batch.id(), index);
                let cmd = WorkerCommand::for_job(&self.worker, job, &params, &scratch);
                let mut retry = self.execution.start();
                let mut stopped = false;

                loop {
                    let mut outcome = AttemptOutcome::Cancelled;
                    if !cancel.is_cancelled() {
                        let spawned = std::fs::create_dir_all(&scratch)
                            .map_err(BenchError::from)
                            .and_then(|()| ProcessSupervisor::spawn(&cmd, cancel.clone()));
                        match spawned {
                            Err(err) => {
                                warn!(artifact = %job.artifact_ref, error = %err, "worker fault");
                                yield LogEvent::text(format!("\n[CRITICAL] Job Exception: {err}\n"));
                                outcome = AttemptOutcome::Failure(err.to_string());
                            }
                            Ok(mut attempt) => {
                                let mut fault: Option<BenchError> = None;
                                loop {
                                    match attempt.next_line().await {
                                        Ok(Some(line)) => {
                                            yield LogEvent::text(format!("{line}\n"));
                                        }
                                        Ok(None) => break,
                                        Err(err) => {
                                            fault = Some(err);
                                            break;
                                        }
                                    }
                                }

                                let exit = match fault {
                                    Some(err) => Err(err),
                                    None => attempt.finish().await,
                                };

                                match exit {
                                    Ok(WorkerExit::Success) => {
                                        match find_result_file(&scratch) {
                                            None => {
                                                warn!(artifact = %job.artifact_ref, "worker exited 0 without a result file");
                                                yield LogEvent::text("\n[ERROR] No JSON output generated.\n");
                                            }
                                            Some(result_file) => match self.persist(job, &result_file) {
                                                Err(err) => {
                                                    warn!(artifact = %job.artifact_ref, error = %err, "result processing failed");
                                                    yield LogEvent::text(format!("\n[ERROR] Result Processing Failed: {err}\n"));
                                                }
                                                Ok(saved) => {
                                                    info!(artifact = %job.artifact_ref, path = %saved.display(), "result saved");
                                                    yield LogEvent::saved(
                                                        format!("\n[SUCCESS] Results saved: {}\n", saved.display()),
                                                        saved.clone(),
                                                    );
                                                    let mut deliveries = pin!(self.delivery_events(&saved));
                                                    while let Some(event) = deliveries.next().await {
                                                        yield event;
                                                    }
                                                }
                                            },
                                        }
                                        outcome = AttemptOutcome::Success;
                                    }
                                    Ok(WorkerExit::Cancelled) => {}
                                    Ok(exit @ WorkerExit::Failed(_)) => {
                                        warn!(artifact = %job.artifact_ref, %exit, "worker failed");
                                        yield LogEvent::text(format!("\n[FAILURE] Crashed ({exit}).\n"));
                                        outcome = AttemptOutcome::Failure(exit.to_string());
                                    }
                                    Err(err) => {
                                        warn!(artifact = %job.artifact_ref, error = %err, "worker fault");
                                        yield LogEvent::text(format!("\n[CRITICAL] Job Exception: {err}\n"));
                                        outcome = AttemptOutcome::Failure(err.to_string());
                                    }
                                }
                            }
                        }
                    }

                    match retry.next(outcome) {
                        Transition::Done => break,
                        Transition::Retry { retry: n, max_retries, delay, .. } => {
                            yield LogEvent::text(format!(
                                "\n[RETRY] Benchmark Attempt {n}/{max_retries}. Waiting {}...\n",
                                format_delay(delay)
                            ));
                            if !self.execution.wait_or_cancel(&cancel).await {
                                stopped = true;
                                break;
                            }
                        }
                        Transition::Exhausted(_) => {
                            warn!(artifact = %job.artifact_ref, attempts = retry.attempts(), "job abandoned");
                            yield LogEvent::text(format!(
                                "\n[FAILURE] Giving up on {} after {} attempts.\n",
                                job.artifact_ref,
                                retry.attempts()
                            ));
                            break;
                        }
                        Transition::Cancelled => {
                            stopped = true;
                            break;
                        }
                    }
                }

                discard_scratch(&scratch);

                if stopped {
                    info!(batch = %batch.id(), "batch cancelled");
                    yield LogEvent::text("\n[STOPPED] User Cancelled.\n");
                    break 'jobs;
                }

                if !self.job_pause.is_zero() {
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(self.job_pause) => {}
                    }
                }
            }

            info!(batch = %batch.id(), "batch complete");
            yield LogEvent::batch_complete();
        }
    }

    /// Push a saved record to the collector under the delivery policy.
    fn delivery_events<'a>(&'a self, saved: &'a Path) -> impl Stream<Item = LogEvent> + Send + 'a {
        async_stream::stream! {
            let Some(collector) = &self.collector else {
                yield LogEvent::text("[UPLOAD] Skipped: no collector configured.\n");
                return;
            };

            let mut retry = self.delivery.start();
            loop {
                yield LogEvent::text(format!(
                    "[UPLOAD] Auto-uploading (Attempt {})...\n",
                    retry.attempts() + 1
                ));
                let outcome = match collector.deliver(saved).await {
                    Ok(confirmation) => {
                        yield LogEvent::text(format!("[UPLOAD] {confirmation}\n"));
                        AttemptOutcome::Success
                    }
                    Err(err) => AttemptOutcome::Failure(err),
                };

                match retry.next(outcome) {
                    Transition::Done => break,
                    Transition::Retry { delay, reason, .. } => {
                        debug!(path = %saved.display(), error = %reason, "delivery failed; retrying");
                        yield LogEvent::text(format!(
                            "[UPLOAD ERROR] {reason}. Retrying in {}...\n",
                            format_delay(delay)
                        ));
                        self.delivery.wait().await;
                    }
                    Transition::Exhausted(reason) => {
                        warn!(path = %saved.display(), error = %reason, "delivery failed");
                        yield LogEvent::text(format!("[UPLOAD ERROR] {reason}.\n"));
                        yield LogEvent::text("[UPLOAD] Failed after retries. Result is saved locally.\n");
                        break;
                    }
                    Transition::Cancelled => break,
                }
            }
        }
    }

    fn scratch_dir(&self, batch_id: &str, index: usize) -> PathBuf {
        let stamp = Local::now().format("%H%M%S%3f");
        self.scratch_root.join(format!("{batch_id}_{index}_{stamp}"))
    }

    fn persist(&self, job: &Job, result_file: &Path) -> Result<PathBuf, BenchError> {
        let mut artifact = Artifact::from_file(result_file)?;
        artifact.inject_origin(&job.model_ref, &job.artifact_ref);
        let identity = self.store.identity(&job.model_ref, &job.artifact_ref);
        self.store.save(&identity, &artifact)
    }
}

/// Remove a job's scratch directory. A failure is logged and otherwise ignored.
fn discard_scratch(dir: &Path) {
    if let Err(err) = std::fs::remove_dir_all(dir) {
        debug!(path = %dir.display(), error = %err, "scratch cleanup failed");
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        format!("{}s", delay.as_secs())
    } else {
        format!("{}ms", delay.as_millis())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::batch::BatchParams;
    use crate::delivery::DeliveryError;
    use crate::store::{ARTIFACT_REF_FIELD, Identity, MODEL_REF_FIELD};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Keeps the worker arguments in `$all` and `--output_path` in `$out`.
    const PARSE_OUT: &str = r#"all="$*"; out=""; while [ $# -gt 0 ]; do if [ "$1" = "--output_path" ]; then out="$2"; fi; shift; done; "#;

    struct MockCollector {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    impl MockCollector {
        fn failing(failures: u32) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    failures,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl Deliver for MockCollector {
        async fn deliver(&self, path: &Path) -> Result<String, DeliveryError> {
            assert!(path.exists());
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(DeliveryError::Rejected {
                    status: 503,
                    message: "collector busy".into(),
                })
            } else {
                Ok("Submitted".into())
            }
        }
    }

    /// Accepts the record, then stops the batch it belongs to.
    struct CancellingCollector {
        cancel: CancellationToken,
    }

    impl Deliver for CancellingCollector {
        async fn deliver(&self, _path: &Path) -> Result<String, DeliveryError> {
            self.cancel.cancel();
            Ok("Submitted".into())
        }
    }

    struct Fixture {
        dir: TempDir,
        counter: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let counter = dir.path().join("invocations");
            Self { dir, counter }
        }

        fn store(&self) -> ResultStore {
            ResultStore::new(self.dir.path().join("results"))
        }

        fn scratch(&self) -> PathBuf {
            self.dir.path().join("scratch")
        }

        fn runner(&self, body: &str) -> BatchRunner<MockCollector> {
            self.runner_with(body)
        }

        /// Worker that counts its invocations, then runs `body`.
        fn runner_with<D: Deliver + Send + Sync + 'static>(&self, body: &str) -> BatchRunner<D> {
            let script = format!("{PARSE_OUT}echo run >> '{}'; {body}", self.counter.display());
            let worker = WorkerConfig {
                program: "sh".into(),
                args: vec!["-c".into(), script, "worker".into()],
                ..WorkerConfig::default()
            };
            BatchRunner::new(self.store(), worker, self.scratch())
                .with_execution_policy(RetryPolicy::new(3, Duration::ZERO))
                .with_delivery_policy(RetryPolicy::new(3, Duration::ZERO))
                .with_job_pause(Duration::ZERO)
        }

        fn invocations(&self) -> usize {
            std::fs::read_to_string(&self.counter)
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }
    }

    const WRITES_RESULT: &str = r#"mkdir -p "$out/org__model"; echo ' 50%|#####     |'; echo 'Running loglikelihood requests'; echo 'mmlu | acc | 0.5'; printf '{"results":{"mmlu":{"acc":0.5}}}' > "$out/org__model/results.json""#;

    fn single_job() -> Batch {
        Batch::new(vec![Job::new("org/model", "model.Q4.gguf")], BatchParams::default())
    }

    async fn run_all(runner: BatchRunner<MockCollector>, batch: Batch) -> Vec<LogEvent> {
        runner.run(batch, CancellationToken::new()).collect().await
    }

    fn count(events: &[LogEvent], needle: &str) -> usize {
        events.iter().filter(|e| e.text.contains(needle)).count()
    }

    #[tokio::test]
    async fn successful_job_saves_once_and_delivers() {
        let fx = Fixture::new();
        let (collector, calls) = MockCollector::failing(0);
        let runner = fx.runner(WRITES_RESULT).with_collector(collector);

        let events = run_all(runner, single_job()).await;

        let saves: Vec<_> = events.iter().filter(|e| e.path.is_some()).collect();
        assert_eq!(saves.len(), 1);
        let id = Identity::of("org/model", "model.Q4.gguf");
        assert_eq!(saves[0].path.as_deref(), Some(fx.store().location(&id).as_path()));

        let record = fx.store().load(&id).unwrap().unwrap();
        assert_eq!(record.get(MODEL_REF_FIELD).unwrap(), "org/model");
        assert_eq!(record.get(ARTIFACT_REF_FIELD).unwrap(), "model.Q4.gguf");

        assert_eq!(fx.invocations(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(count(&events, "[UPLOAD] Submitted"), 1);
        assert_eq!(count(&events, "mmlu | acc | 0.5"), 1);
        assert_eq!(count(&events, "%|"), 0);
        assert_eq!(count(&events, "Running loglikelihood"), 0);

        let last = events.last().unwrap();
        assert!(last.is_batch_complete());
        assert_eq!(last.results, Some(Vec::new()));
        assert!(last.path.is_none());

        let leftovers = std::fs::read_dir(fx.scratch()).unwrap().count();
        assert_eq!(leftovers, 0, "scratch directory must be removed");
    }

    #[tokio::test]
    async fn first_event_carries_start_info_and_header_progress() {
        let fx = Fixture::new();
        let batch = single_job();
        let expected = batch.transcript_name();
        let events = run_all(fx.runner(WRITES_RESULT), batch).await;

        assert_eq!(events[0].start_info.as_ref().unwrap().log_file, expected);
        assert!(events[0].text.contains("1 Models Scheduled"));
        assert_eq!(events[1].progress, Some(Progress { job: 1, total: 1 }));
        assert!(events[1].text.contains("JOB 1/1: model.Q4.gguf"));
    }

    #[tokio::test]
    async fn failing_worker_runs_three_times() {
        let fx = Fixture::new();
        let events = run_all(fx.runner("echo boom; exit 2"), single_job()).await;

        assert_eq!(fx.invocations(), 3);
        assert_eq!(count(&events, "[RETRY]"), 2);
        assert_eq!(count(&events, "[FAILURE] Crashed (Code 2)"), 3);
        assert_eq!(count(&events, "Giving up on model.Q4.gguf after 3 attempts"), 1);
        assert!(events.iter().all(|e| e.path.is_none()));
        assert!(events.last().unwrap().is_batch_complete());
    }

    #[tokio::test]
    async fn failed_job_does_not_stop_the_batch() {
        let fx = Fixture::new();
        let script = format!(
            r#"case "$all" in *bad.gguf*) exit 1;; esac; {WRITES_RESULT}"#
        );
        let batch = Batch::new(
            vec![Job::new("org/model", "bad.gguf"), Job::new("org/model", "good.gguf")],
            BatchParams::default(),
        );

        let events = run_all(fx.runner(&script), batch).await;
        assert_eq!(fx.invocations(), 4);
        assert_eq!(count(&events, "JOB 2/2: good.gguf"), 1);
        assert_eq!(count(&events, "[SUCCESS] Results saved"), 1);
    }

    #[tokio::test]
    async fn missing_result_file_is_not_retried() {
        let fx = Fixture::new();
        let events = run_all(fx.runner("echo done"), single_job()).await;

        assert_eq!(fx.invocations(), 1);
        assert_eq!(count(&events, "[ERROR] No JSON output generated."), 1);
        assert_eq!(count(&events, "[RETRY]"), 0);
    }

    #[tokio::test]
    async fn unparsable_result_is_reported_without_retry() {
        let fx = Fixture::new();
        let events = run_all(
            fx.runner(r#"printf 'not json' > "$out/results.json""#),
            single_job(),
        )
        .await;

        assert_eq!(fx.invocations(), 1);
        assert_eq!(count(&events, "[ERROR] Result Processing Failed"), 1);
        assert!(events.iter().all(|e| e.path.is_none()));
    }

    #[tokio::test]
    async fn spawn_failure_consumes_attempts() {
        let fx = Fixture::new();
        let worker = WorkerConfig {
            program: "/definitely/not/lm_eval".into(),
            ..WorkerConfig::default()
        };
        let runner: BatchRunner<MockCollector> = BatchRunner::new(fx.store(), worker, fx.scratch())
            .with_execution_policy(RetryPolicy::new(3, Duration::ZERO))
            .with_job_pause(Duration::ZERO);

        let events = run_all(runner, single_job()).await;
        assert_eq!(count(&events, "[CRITICAL] Job Exception"), 3);
        assert_eq!(count(&events, "[RETRY]"), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_whole_batch() {
        let fx = Fixture::new();
        let batch = Batch::new(
            vec![Job::new("org/model", "a.gguf"), Job::new("org/model", "b.gguf")],
            BatchParams::default(),
        );
        let cancel = CancellationToken::new();
        let stream = fx.runner("echo started; sleep 30").run(batch, cancel.clone());

        let events = tokio::time::timeout(Duration::from_secs(10), async {
            let mut stream = pin!(stream);
            let mut seen = Vec::new();
            while let Some(event) = stream.next().await {
                if event.text == "started\n" {
                    cancel.cancel();
                }
                seen.push(event);
            }
            seen
        })
        .await
        .expect("cancelled batch must finish promptly");

        assert_eq!(fx.invocations(), 1);
        assert_eq!(count(&events, "[STOPPED] User Cancelled."), 1);
        assert_eq!(count(&events, "JOB 2/2"), 0);
        assert_eq!(count(&events, "[RETRY]"), 0);
        assert_eq!(count(&events, "[FAILURE]"), 0);
        assert!(events.last().unwrap().is_batch_complete());
    }

    #[tokio::test]
    async fn cancel_during_delivery_skips_remaining_jobs() {
        let fx = Fixture::new();
        let batch = Batch::new(
            vec![Job::new("org/model", "a.gguf"), Job::new("org/model", "b.gguf")],
            BatchParams::default(),
        );
        let cancel = CancellationToken::new();
        let runner = fx
            .runner_with(WRITES_RESULT)
            .with_collector(CancellingCollector { cancel: cancel.clone() })
            .with_job_pause(Duration::from_secs(30));

        let events: Vec<LogEvent> = tokio::time::timeout(
            Duration::from_secs(10),
            runner.run(batch, cancel).collect::<Vec<_>>(),
        )
        .await
        .expect("pause between jobs must end on cancel");

        assert_eq!(fx.invocations(), 1);
        assert_eq!(count(&events, "[UPLOAD] Submitted"), 1);
        assert_eq!(count(&events, "JOB 2/2"), 0);
        assert_eq!(count(&events, "[STOPPED] User Cancelled."), 1);
        assert!(events.last().unwrap().is_batch_complete());
    }

    #[tokio::test]
    async fn cancel_before_first_job_runs_nothing() {
        let fx = Fixture::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events: Vec<LogEvent> = fx.runner(WRITES_RESULT).run(single_job(), cancel).collect().await;

        assert_eq!(fx.invocations(), 0);
        assert!(events.iter().all(|e| e.progress.is_none()));
        assert_eq!(count(&events, "[STOPPED] User Cancelled."), 1);
        assert!(events.last().unwrap().is_batch_complete());
    }

    #[tokio::test]
    async fn unusable_scratch_root_consumes_attempts() {
        let fx = Fixture::new();
        std::fs::write(fx.scratch(), "not a directory").unwrap();
        let batch = Batch::new(
            vec![Job::new("org/model", "a.gguf"), Job::new("org/model", "b.gguf")],
            BatchParams::default(),
        );

        let events = run_all(fx.runner(WRITES_RESULT), batch).await;
        assert_eq!(fx.invocations(), 0);
        assert_eq!(count(&events, "[CRITICAL] Job Exception"), 6);
        assert_eq!(count(&events, "[RETRY]"), 4);
        assert_eq!(count(&events, "Giving up on a.gguf after 3 attempts"), 1);
        assert_eq!(count(&events, "JOB 2/2: b.gguf"), 1);
        assert!(events.last().unwrap().is_batch_complete());
    }

    #[tokio::test]
    async fn delivery_retries_until_success() {
        let fx = Fixture::new();
        let (collector, calls) = MockCollector::failing(2);
        let events = run_all(fx.runner(WRITES_RESULT).with_collector(collector), single_job()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(count(&events, "[UPLOAD ERROR]"), 2);
        assert_eq!(count(&events, "[UPLOAD] Submitted"), 1);
        assert_eq!(count(&events, "Failed after retries"), 0);
        assert_eq!(count(&events, "[FAILURE]"), 0);
        assert_eq!(fx.invocations(), 1);
    }

    #[tokio::test]
    async fn delivery_exhaustion_keeps_local_result() {
        let fx = Fixture::new();
        let (collector, calls) = MockCollector::failing(10);
        let events = run_all(fx.runner(WRITES_RESULT).with_collector(collector), single_job()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(count(&events, "Failed after retries. Result is saved locally."), 1);
        let id = Identity::of("org/model", "model.Q4.gguf");
        assert!(fx.store().load(&id).unwrap().is_some());
        assert_eq!(fx.invocations(), 1);
    }

    #[tokio::test]
    async fn missing_collector_skips_delivery() {
        let fx = Fixture::new();
        let events = run_all(fx.runner(WRITES_RESULT), single_job()).await;
        assert_eq!(count(&events, "[UPLOAD] Skipped"), 1);
    }

    #[tokio::test]
    async fn repeated_job_overwrites_single_record() {
        let fx = Fixture::new();
        let batch = Batch::new(
            vec![
                Job::new("org/model", "m.gguf"),
                Job::new("org/model", "m.gguf").with_tasks(["gsm8k"]),
            ],
            BatchParams::default(),
        );
        let events = run_all(fx.runner(WRITES_RESULT), batch).await;

        assert_eq!(count(&events, "[SUCCESS] Results saved"), 2);
        let records = std::fs::read_dir(fx.store().root()).unwrap().count();
        assert_eq!(records, 1);
    }

    #[test]
    fn format_delay_units() {
        assert_eq!(format_delay(Duration::from_secs(10)), "10s");
        assert_eq!(format_delay(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_delay(Duration::ZERO), "0s");
    }
}
