//! Interface de linha de comando do pocketbench baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, run, logs,
//! tasks) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// pocketbench: executor de batches de benchmark com logs ao vivo.
#[derive(Debug, Parser)]
#[command(name = "pocketbench", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: ./pocketbench.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicia o servidor HTTP com a API de controle.
    Serve {
        /// Endereço de escuta; sobrescreve `bind` da configuração.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Executa um batch definido em arquivo e mostra o progresso no terminal.
    Run {
        /// Caminho para um arquivo JSON ou TOML contendo a lista de jobs.
        #[arg(long)]
        file: PathBuf,

        /// Tamanho de batch repassado ao worker.
        #[arg(long)]
        batch: Option<u32>,

        /// Dispositivo do worker (auto, cpu, cuda, mps...).
        #[arg(long)]
        device: Option<String>,

        /// Verbosidade do worker.
        #[arg(long)]
        verbosity: Option<String>,

        /// Não envia os resultados ao coletor remoto.
        #[arg(long, default_value_t = false)]
        no_upload: bool,
    },

    /// Consulta o histórico de transcrições.
    Logs {
        #[command(subcommand)]
        command: LogsCommand,
    },

    /// Lista as tarefas de avaliação populares.
    Tasks,
}

#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    /// Lista as transcrições, mais recentes primeiro.
    List,

    /// Imprime o conteúdo de uma transcrição.
    Show {
        /// Nome do arquivo dentro do diretório de logs.
        filename: String,
    },

    /// Remove uma transcrição.
    Delete {
        /// Nome do arquivo dentro do diretório de logs.
        filename: String,
    },
}
