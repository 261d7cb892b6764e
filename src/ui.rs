//! Interface de terminal do notepress: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente uma
//! execução do pipeline; as funções `print_*` formatam o histórico.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::history::{HistoryRecord, HistoryStatistics, RecordStatus};
use crate::orchestrator::{RunOutcome, Stage};

/// Indicador visual de progresso para uma execução do pipeline.
///
/// Exibe um spinner animado durante cada etapa e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e fallback de canal (amarelo).
#[derive(Clone)]
pub struct RunProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Inicia o spinner com o tema da nota.
    pub fn start(topic: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("START: {topic}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a mensagem do spinner para a etapa atual.
    pub fn stage(&self, stage: Stage) {
        self.pb.set_message(format!("{stage}"));
    }

    /// Imprime um aviso acima do spinner (ex.: canal degradado).
    pub fn note(&self, message: &str) {
        self.pb
            .println(format!("  {} {message}", self.yellow.apply_to("↻")));
    }

    /// Pausa o spinner enquanto `f` usa o terminal (ex.: confirmação).
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.pb.suspend(f)
    }

    /// Finaliza o spinner e exibe o resultado da execução.
    pub fn complete(&self, outcome: &RunOutcome) {
        self.pb.finish_and_clear();
        match outcome {
            RunOutcome::Published { record, report } => {
                println!(
                    "  {} Published \"{}\" via {} ({})",
                    self.green.apply_to("✓"),
                    record.title,
                    report.used,
                    record.id
                );
                if let Some(artifact) = &report.artifact {
                    println!("    payload: {}", artifact.display());
                }
                if let Some(browser) = &report.browser {
                    let missed = browser.missed_fields();
                    if !missed.is_empty() {
                        println!(
                            "    {} left for manual entry: {}",
                            self.yellow.apply_to("!"),
                            missed.join(", ")
                        );
                    }
                }
            }
            RunOutcome::Cancelled { record } => {
                println!("  {} Cancelled ({})", self.yellow.apply_to("–"), record.id);
            }
            RunOutcome::Generated { content, images } => {
                println!("  {} Generated \"{}\"", self.green.apply_to("✓"), content.title);
                println!();
                println!("{}", content.body);
                println!();
                println!("{}", content.tags.join(" "));
                for image in images {
                    println!("    {} {}", image.kind, image.path.display());
                }
            }
        }
    }

    /// Finaliza o spinner com a mensagem de erro em vermelho.
    pub fn fail(&self, error: &dyn std::fmt::Display) {
        self.pb.finish_and_clear();
        println!("  {} Run failed: {error}", self.red.apply_to("✗"));
    }
}

fn status_style(status: RecordStatus) -> Style {
    match status {
        RecordStatus::Success => Style::new().green(),
        RecordStatus::Failed => Style::new().red(),
        RecordStatus::Pending => Style::new().yellow(),
        RecordStatus::Cancelled => Style::new().dim(),
    }
}

/// Lista registros do histórico, um por linha, do mais novo ao mais antigo.
pub fn print_history(records: &[HistoryRecord]) {
    if records.is_empty() {
        println!("No records.");
        return;
    }
    for record in records {
        let status = format!("{:<9}", record.status.to_string());
        println!(
            "{}  {}  {:<9}  {}",
            record.timestamp.get(..19).unwrap_or(&record.timestamp),
            status_style(record.status).apply_to(status),
            record.publish_method,
            record.title
        );
        if let Some(message) = &record.status_message {
            println!("    {}", Style::new().dim().apply_to(message));
        }
    }
}

/// Imprime as estatísticas agregadas do histórico.
pub fn print_statistics(stats: &HistoryStatistics) {
    let bold = Style::new().bold();
    println!("{}", bold.apply_to("─── History ───"));
    println!("total:        {}", stats.total);
    println!("success:      {}", stats.success);
    println!("failed:       {}", stats.failed);
    println!("pending:      {}", stats.pending);
    println!("cancelled:    {}", stats.cancelled);
    println!("success rate: {}", stats.success_rate);
    if !stats.methods.is_empty() {
        println!("{}", bold.apply_to("─── By method ───"));
        for (method, count) in &stats.methods {
            println!("{method:<13} {count}");
        }
    }
}
