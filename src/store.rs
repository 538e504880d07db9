//! Content-addressed persistence of evaluation results.
//!
//! Each (model, artifact) pair maps to one identity hash and one JSON record
//! under the results directory. Saving again overwrites the record.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::BenchError;

/// Field injected with the originating model reference.
pub const MODEL_REF_FIELD: &str = "custom_repo_id";
/// Field injected with the originating artifact reference.
pub const ARTIFACT_REF_FIELD: &str = "custom_gguf_file";

/// Stable key of a (model reference, artifact reference) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// First 8 hex digits of MD5 over `"<model>_<artifact>"`.
    pub fn of(model_ref: &str, artifact_ref: &str) -> Self {
        let digest = md5::compute(format!("{model_ref}_{artifact_ref}"));
        let hex = format!("{digest:x}");
        Self(hex[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result payload written by the worker. Opaque apart from `results`.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact(Map<String, Value>);

impl Artifact {
    pub fn from_json(value: Value) -> Result<Self, BenchError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(BenchError::Json(serde::de::Error::custom(format!(
                "result must be a JSON object, got {}",
                json_kind(&other)
            )))),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, BenchError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(serde_json::from_str(&contents)?)
    }

    /// Record which model and artifact produced this result.
    pub fn inject_origin(&mut self, model_ref: &str, artifact_ref: &str) {
        self.0
            .insert(MODEL_REF_FIELD.to_string(), Value::String(model_ref.to_string()));
        self.0.insert(
            ARTIFACT_REF_FIELD.to_string(),
            Value::String(artifact_ref.to_string()),
        );
    }

    /// True when every task has an entry in the `results` object.
    pub fn covers_tasks<S: AsRef<str>>(&self, tasks: &[S]) -> bool {
        let results = self.get("results").and_then(Value::as_object);
        tasks.iter().all(|task| {
            results.is_some_and(|r| r.contains_key(task.as_ref()))
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First `.json` file under `dir`, walking entries in file-name order.
///
/// Workers are expected to write exactly one result file; when several exist
/// the choice is deterministic but otherwise arbitrary.
pub fn find_result_file(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .find(|path| path.extension().is_some_and(|ext| ext == "json"))
}

/// One JSON record per identity under a results directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn identity(&self, model_ref: &str, artifact_ref: &str) -> Identity {
        Identity::of(model_ref, artifact_ref)
    }

    /// Where the record for `identity` lives, whether or not it exists.
    pub fn location(&self, identity: &Identity) -> PathBuf {
        self.root.join(format!("{identity}.json"))
    }

    /// Write `artifact` as the record for `identity`, replacing any previous
    /// record. The file is written beside its target and renamed into place.
    pub fn save(&self, identity: &Identity, artifact: &Artifact) -> Result<PathBuf, BenchError> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.location(identity);
        let tmp = self.root.join(format!(".{identity}.json.tmp"));
        let mut body = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut body, formatter);
        artifact.0.serialize(&mut ser)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }

    pub fn load(&self, identity: &Identity) -> Result<Option<Artifact>, BenchError> {
        let path = self.location(identity);
        if !path.exists() {
            return Ok(None);
        }
        Artifact::from_file(&path).map(Some)
    }

    /// A saved artifact that already has results for every task, if any.
    ///
    /// Unreadable records count as absent so the caller re-runs the job.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn find_complete<S: AsRef<str>>(&self, identity: &Identity, tasks: &[S]) -> Option<Artifact> {
        match self.load(identity) {
            Ok(Some(artifact)) if artifact.covers_tasks(tasks) => Some(artifact),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(identity = %identity, error = %err, "ignoring unreadable result record");
                None
            }
        }
    }
}
