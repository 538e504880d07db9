//! Configuração do pocketbench carregada a partir de `pocketbench.toml`.
//!
//! A struct [`BenchConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `POCKETBENCH_COLLECTOR_URL` e
//! `POCKETBENCH_COLLECTOR_TOKEN` têm precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::RetryPolicy;
use crate::error::BenchError;

const DEFAULT_CONFIG_FILE: &str = "pocketbench.toml";

/// Configuração de nível superior carregada de `pocketbench.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    /// Endereço em que o servidor HTTP escuta.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Diretório dos registros de resultado (um arquivo por identidade).
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Diretório das transcrições de cada batch.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Raiz dos diretórios temporários de saída do worker.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Pausa em milissegundos entre jobs consecutivos.
    #[serde(default = "default_job_pause_ms")]
    pub job_pause_ms: u64,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub collector: CollectorConfig,
}

/// Como invocar o processo externo de avaliação.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Executável do worker.
    #[serde(default = "default_worker_program")]
    pub program: String,

    /// Argumentos inseridos antes dos argumentos gerados por job.
    #[serde(default)]
    pub args: Vec<String>,

    /// Valor passado em `--model`.
    #[serde(default = "default_model_backend")]
    pub model_backend: String,

    /// Variáveis de ambiente extras para o worker.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Parâmetros dos dois laços de retentativa.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_execution_retry")]
    pub execution: RetrySettings,

    #[serde(default = "default_delivery_retry")]
    pub delivery: RetrySettings,
}

/// Limite total de tentativas e atraso fixo entre elas.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

/// Destino remoto dos resultados salvos.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectorConfig {
    /// URL do coletor. Sem URL, o envio é ignorado.
    #[serde(default)]
    pub url: Option<String>,

    /// Token bearer opcional.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("local_results_db")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("temp_outputs")
}

fn default_job_pause_ms() -> u64 {
    2000
}

fn default_worker_program() -> String {
    "lm_eval".to_string()
}

fn default_model_backend() -> String {
    "hf".to_string()
}

// Duas retentativas além da primeira execução, 10s entre elas.
fn default_execution_retry() -> RetrySettings {
    RetrySettings {
        max_attempts: 3,
        delay_ms: 10_000,
    }
}

// Três tentativas de envio no total, 5s entre elas.
fn default_delivery_retry() -> RetrySettings {
    RetrySettings {
        max_attempts: 3,
        delay_ms: 5_000,
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            results_dir: default_results_dir(),
            logs_dir: default_logs_dir(),
            scratch_dir: default_scratch_dir(),
            job_pause_ms: default_job_pause_ms(),
            worker: WorkerConfig::default(),
            retry: RetryConfig::default(),
            collector: CollectorConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_worker_program(),
            args: Vec::new(),
            model_backend: default_model_backend(),
            env: BTreeMap::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            execution: default_execution_retry(),
            delivery: default_delivery_retry(),
        }
    }
}

impl RetrySettings {
    /// Converte as configurações em uma política de retentativa.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

impl BenchConfig {
    /// Carrega a configuração do caminho informado ou de `pocketbench.toml`
    /// no diretório atual. Usa valores padrão se nenhum arquivo existir.
    ///
    /// Um caminho explícito inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        // Variáveis de ambiente têm precedência sobre o arquivo para o coletor.
        if let Some(url) = non_empty_env("POCKETBENCH_COLLECTOR_URL") {
            config.collector.url = Some(url);
        }
        if let Some(token) = non_empty_env("POCKETBENCH_COLLECTOR_TOKEN") {
            config.collector.token = Some(token);
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, BenchError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<BenchConfig>(&contents)?)
    }

    /// Rejeita valores que tornariam o runner inutilizável.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.worker.program.trim().is_empty() {
            return Err(BenchError::Config("worker.program must not be empty".into()));
        }
        if self.retry.execution.max_attempts == 0 {
            return Err(BenchError::Config(
                "retry.execution.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.delivery.max_attempts == 0 {
            return Err(BenchError::Config(
                "retry.delivery.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn job_pause(&self) -> Duration {
        Duration::from_millis(self.job_pause_ms)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
