//! Tipos de erro para o envio de resultados ao coletor remoto.
//!
//! Define [`DeliveryError`] com variantes para rate limiting, rejeição pelo
//! coletor e falhas de rede. Usa `thiserror` para derivar `Display` e `Error`
//! a partir dos atributos `#[error(...)]`.

use std::path::PathBuf;

use thiserror::Error;

/// Erros que podem ocorrer ao enviar um resultado salvo.
///
/// Todas as variantes são tratadas como transitórias pelo laço de
/// retentativa de envio; a causa nunca é inspecionada.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// O arquivo local do resultado não pôde ser lido.
    #[error("cannot read result file {path}: {source}")]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// O coletor retornou HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Qualquer outro status fora de 2xx, com o corpo da resposta.
    #[error("collector rejected result (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
