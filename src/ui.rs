//! Interface de terminal do pocketbench: spinner e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner de progresso e `console` para
//! estilização com cores. O [`BatchProgress`] acompanha visualmente a
//! execução de um batch no terminal enquanto as linhas do worker passam.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::stream::WireMessage;

/// Categoria visual de uma linha do log do batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Success,
    Failure,
    Retry,
    Upload,
    Plain,
}

impl LineKind {
    /// Classifica a linha pelo prefixo entre colchetes.
    pub fn of(line: &str) -> Self {
        let line = line.trim_start();
        if line.starts_with("[SUCCESS]") {
            Self::Success
        } else if line.starts_with("[FAILURE]")
            || line.starts_with("[ERROR]")
            || line.starts_with("[CRITICAL]")
            || line.starts_with("[STOPPED]")
            || line.starts_with("[UPLOAD ERROR]")
        {
            Self::Failure
        } else if line.starts_with("[RETRY]") {
            Self::Retry
        } else if line.starts_with("[UPLOAD]") {
            Self::Upload
        } else {
            Self::Plain
        }
    }
}

/// Indicador visual de progresso para a execução de um batch no terminal.
///
/// Exibe um spinner com o job atual e imprime cada linha do log acima dele,
/// em verde (sucesso), vermelho (falha), amarelo (retentativa) ou ciano (envio).
pub struct BatchProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    cyan: Style,
}

impl BatchProgress {
    /// Inicia o spinner para um batch com `total` jobs.
    pub fn start(total: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("BATCH: {total} jobs"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            cyan: Style::new().cyan(),
        }
    }

    /// Imprime as linhas de uma mensagem e atualiza o spinner.
    pub fn show(&self, msg: &WireMessage) {
        if let Some(info) = &msg.start_info {
            self.pb.println(format!("  log: {}", info.log_file));
        }
        if let Some(progress) = msg.progress {
            self.pb
                .set_message(format!("JOB {}/{}", progress.job, progress.total));
        }
        for line in msg.log.lines().filter(|l| !l.trim().is_empty()) {
            let styled = match LineKind::of(line) {
                LineKind::Success => self.green.apply_to(line).to_string(),
                LineKind::Failure => self.red.apply_to(line).to_string(),
                LineKind::Retry => self.yellow.apply_to(line).to_string(),
                LineKind::Upload => self.cyan.apply_to(line).to_string(),
                LineKind::Plain => line.to_string(),
            };
            self.pb.println(styled);
        }
    }

    /// Finaliza o spinner e mostra um resumo de salvos e falhas.
    pub fn finish(&self, saved: usize, total: usize) {
        self.pb.finish_and_clear();
        if saved == total {
            println!(
                "  {} {saved}/{total} results saved",
                self.green.apply_to("✓")
            );
        } else {
            println!("  {} {saved}/{total} results saved", self.red.apply_to("✗"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_prefixes() {
        assert_eq!(LineKind::of("[SUCCESS] Results saved: db/a.json"), LineKind::Success);
        assert_eq!(LineKind::of("  [FAILURE] Crashed (Code 1)."), LineKind::Failure);
        assert_eq!(LineKind::of("[UPLOAD ERROR] timeout. Retrying in 5s..."), LineKind::Failure);
        assert_eq!(LineKind::of("[UPLOAD] Auto-uploading (Attempt 1)..."), LineKind::Upload);
        assert_eq!(LineKind::of("[RETRY] Benchmark Attempt 1/2. Waiting 10s..."), LineKind::Retry);
        assert_eq!(LineKind::of("hellaswag | acc | 0.51"), LineKind::Plain);
    }
}
