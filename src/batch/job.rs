use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Task evaluated when a job does not name any.
pub const DEFAULT_TASK: &str = "mmlu";

/// Text that marks the final event of every batch.
pub const BATCH_COMPLETE: &str = "BATCH COMPLETE";

fn default_tasks() -> Vec<String> {
    vec![DEFAULT_TASK.to_string()]
}

/// One requested evaluation of a model artifact against a task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Source model repository.
    #[serde(rename = "repo_id")]
    pub model_ref: String,
    /// Specific file/variant inside the repository.
    #[serde(rename = "filename")]
    pub artifact_ref: String,
    #[serde(default = "default_tasks")]
    pub tasks: Vec<String>,
    /// Per-task sample limit; 0 means no limit.
    #[serde(default)]
    pub limit: u32,
}

impl Job {
    pub fn new(model_ref: impl Into<String>, artifact_ref: impl Into<String>) -> Self {
        Self {
            model_ref: model_ref.into(),
            artifact_ref: artifact_ref.into(),
            tasks: default_tasks(),
            limit: 0,
        }
    }

    pub fn with_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    /// Trims the task list and falls back to [`DEFAULT_TASK`] when it is empty.
    pub fn normalized(mut self) -> Result<Self, BenchError> {
        if self.model_ref.trim().is_empty() {
            return Err(BenchError::InvalidJob("repo_id must not be empty".into()));
        }
        if self.artifact_ref.trim().is_empty() {
            return Err(BenchError::InvalidJob("filename must not be empty".into()));
        }
        self.tasks = self
            .tasks
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if self.tasks.is_empty() {
            self.tasks = default_tasks();
        }
        Ok(self)
    }
}

/// Worker parameters shared by every job of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchParams {
    /// Worker-internal batch width.
    pub batch_size: u32,
    /// Device selector; "auto" lets the worker decide.
    pub device: String,
    pub verbosity: String,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self {
            batch_size: 1,
            device: "auto".to_string(),
            verbosity: "INFO".to_string(),
        }
    }
}

/// An ordered, immutable set of jobs identified by its creation time.
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    jobs: Vec<Job>,
    params: BatchParams,
}

impl Batch {
    pub fn new(jobs: Vec<Job>, params: BatchParams) -> Self {
        Self::created_at(Local::now(), jobs, params)
    }

    pub fn created_at(created_at: DateTime<Local>, jobs: Vec<Job>, params: BatchParams) -> Self {
        Self {
            id: created_at.format("%Y%m%d_%H%M%S").to_string(),
            jobs,
            params,
        }
    }

    /// `YYYYmmdd_HHMMSS` of the creation time.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn params(&self) -> &BatchParams {
        &self.params
    }

    pub fn transcript_name(&self) -> String {
        format!("BATCH_{}.log", self.id)
    }
}

/// Metadata attached to the first event of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartInfo {
    pub log_file: String,
}

/// Position of the job currently being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 1-based job index.
    pub job: usize,
    pub total: usize,
}

/// One ordered chunk of batch output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEvent {
    pub text: String,
    pub results: Option<Vec<serde_json::Value>>,
    pub path: Option<PathBuf>,
    pub start_info: Option<StartInfo>,
    pub progress: Option<Progress>,
}

impl LogEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn started(text: impl Into<String>, log_file: impl Into<String>) -> Self {
        Self {
            start_info: Some(StartInfo {
                log_file: log_file.into(),
            }),
            ..Self::text(text)
        }
    }

    pub fn saved(text: impl Into<String>, path: PathBuf) -> Self {
        Self {
            path: Some(path),
            ..Self::text(text)
        }
    }

    pub fn job_header(text: impl Into<String>, progress: Progress) -> Self {
        Self {
            progress: Some(progress),
            ..Self::text(text)
        }
    }

    /// True for the final event of a batch, recognized by its sentinel text.
    pub fn is_batch_complete(&self) -> bool {
        self.text.contains(BATCH_COMPLETE)
    }

    pub fn batch_complete() -> Self {
        let rule = "=".repeat(40);
        Self {
            results: Some(Vec::new()),
            ..Self::text(format!("\n{rule}\n{BATCH_COMPLETE}\n{rule}\n"))
        }
    }
}

/// Batch definition read from a JSON or TOML file.
///
/// JSON files may also hold a bare array of jobs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub batch: Option<u32>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub verbosity: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonJobFile {
    List(Vec<Job>),
    Full(JobFile),
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let contents = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "toml") {
            return Ok(toml::from_str(&contents)?);
        }
        Ok(match serde_json::from_str(&contents)? {
            JsonJobFile::List(jobs) => Self {
                jobs,
                ..Self::default()
            },
            JsonJobFile::Full(file) => file,
        })
    }

    /// Normalized jobs and parameters, with defaults for absent fields.
    pub fn into_parts(self) -> Result<(Vec<Job>, BatchParams), BenchError> {
        if self.jobs.is_empty() {
            return Err(BenchError::InvalidJob("no jobs given".into()));
        }
        let jobs = self
            .jobs
            .into_iter()
            .map(Job::normalized)
            .collect::<Result<Vec<_>, _>>()?;
        let defaults = BatchParams::default();
        let params = BatchParams {
            batch_size: self.batch.unwrap_or(defaults.batch_size),
            device: self.device.unwrap_or(defaults.device),
            verbosity: self.verbosity.unwrap_or(defaults.verbosity),
        };
        Ok((jobs, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn job_defaults_from_json() {
        let job: Job = serde_json::from_str(r#"{"repo_id":"org/model","filename":"q4.gguf"}"#).unwrap();
        assert_eq!(job.model_ref, "org/model");
        assert_eq!(job.artifact_ref, "q4.gguf");
        assert_eq!(job.tasks, vec!["mmlu"]);
        assert_eq!(job.limit, 0);
    }

    #[test]
    fn normalized_replaces_empty_task_list() {
        let job = Job::new("org/model", "q4.gguf")
            .with_tasks(["  ", ""])
            .normalized()
            .unwrap();
        assert_eq!(job.tasks, vec![DEFAULT_TASK]);
    }

    #[test]
    fn normalized_rejects_missing_artifact() {
        let result = Job::new("org/model", " ").normalized();
        assert!(matches!(result, Err(BenchError::InvalidJob(_))));
    }

    #[test]
    fn batch_identity_comes_from_creation_time() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let batch = Batch::created_at(at, vec![Job::new("a", "b")], BatchParams::default());
        assert_eq!(batch.id(), "20240309_140507");
        assert_eq!(batch.transcript_name(), "BATCH_20240309_140507.log");
    }

    #[test]
    fn batch_complete_event_carries_sentinel() {
        let event = LogEvent::batch_complete();
        assert!(event.text.contains(BATCH_COMPLETE));
        assert_eq!(event.results, Some(Vec::new()));
        assert!(event.path.is_none());
        assert!(event.is_batch_complete());
        assert!(!LogEvent::text("JOB 1/1: m.gguf\n").is_batch_complete());
    }

    #[test]
    fn job_file_accepts_bare_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, r#"[{"repo_id":"a/x","filename":"x.gguf"}]"#).unwrap();

        let (jobs, params) = JobFile::load(&path).unwrap().into_parts().unwrap();
        assert_eq!(jobs, vec![Job::new("a/x", "x.gguf")]);
        assert_eq!(params, BatchParams::default());
    }

    #[test]
    fn job_file_reads_toml_with_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.toml");
        std::fs::write(
            &path,
            r#"
                device = "cuda"
                batch = 8

                [[jobs]]
                repo_id = "a/x"
                filename = "x.gguf"
                tasks = ["gsm8k", "piqa"]
                limit = 50
            "#,
        )
        .unwrap();

        let (jobs, params) = JobFile::load(&path).unwrap().into_parts().unwrap();
        assert_eq!(jobs[0].tasks, vec!["gsm8k", "piqa"]);
        assert_eq!(jobs[0].limit, 50);
        assert_eq!(params.device, "cuda");
        assert_eq!(params.batch_size, 8);
        assert_eq!(params.verbosity, "INFO");
    }

    #[test]
    fn job_file_without_jobs_is_invalid() {
        let file = JobFile::default();
        assert!(matches!(file.into_parts(), Err(BenchError::InvalidJob(_))));
    }
}
