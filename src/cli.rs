//! Interface de linha de comando do notepress baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, history, stats,
//! prune) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::history::RecordStatus;
use crate::publish::ChannelKind;

/// notepress: do tema à nota publicada, com prévia e histórico.
#[derive(Debug, Parser)]
#[command(name = "notepress", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./notepress.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Canal de publicação aceito pela CLI, mapeado para [`ChannelKind`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ChannelArg {
    /// Apenas grava o payload em disco.
    Simulated,
    /// Envia via relay JSON-RPC.
    Relay,
    /// Automatiza o navegador.
    Browser,
}

impl From<ChannelArg> for ChannelKind {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Simulated => ChannelKind::Simulated,
            ChannelArg::Relay => ChannelKind::Relay,
            ChannelArg::Browser => ChannelKind::Browser,
        }
    }
}

/// Filtro de status para `history`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl From<StatusArg> for RecordStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => RecordStatus::Pending,
            StatusArg::Success => RecordStatus::Success,
            StatusArg::Failed => RecordStatus::Failed,
            StatusArg::Cancelled => RecordStatus::Cancelled,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Gera uma nota a partir de um tema e publica.
    Run {
        /// Tema da nota.
        topic: String,

        /// Tamanho desejado em palavras (padrão da configuração).
        #[arg(long)]
        word_count: Option<u32>,

        /// Contexto adicional para a geração.
        #[arg(long, default_value = "")]
        context: String,

        /// Publica direto, sem prévia nem confirmação.
        #[arg(long, conflicts_with = "generate_only")]
        quick: bool,

        /// Só gera texto e imagens; não publica nem grava histórico.
        #[arg(long)]
        generate_only: bool,

        /// Pula a etapa de humanização.
        #[arg(long)]
        no_humanize: bool,

        /// Sobrescreve o canal configurado.
        #[arg(long)]
        channel: Option<ChannelArg>,
    },

    /// Lista o histórico, do mais novo ao mais antigo.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        status: Option<StatusArg>,
    },

    /// Mostra estatísticas do histórico.
    Stats,

    /// Remove registros mais antigos que N dias (padrão da configuração).
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from([
            "notepress",
            "run",
            "morning routines",
            "--word-count",
            "400",
            "--quick",
            "--channel",
            "relay",
        ]);
        match cli.command {
            Command::Run {
                topic,
                word_count,
                context,
                quick,
                generate_only,
                no_humanize,
                channel,
            } => {
                assert_eq!(topic, "morning routines");
                assert_eq!(word_count, Some(400));
                assert!(context.is_empty());
                assert!(quick);
                assert!(!generate_only);
                assert!(!no_humanize);
                assert_eq!(channel.map(ChannelKind::from), Some(ChannelKind::Relay));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_rejects_quick_with_generate_only() {
        let result = Cli::try_parse_from(["notepress", "run", "t", "--quick", "--generate-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["notepress", "--config", "custom.toml", "--verbose", "stats"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Command::Stats));
    }

    #[test]
    fn cli_parses_history_filters() {
        let cli = Cli::parse_from(["notepress", "history", "--limit", "3", "--status", "failed"]);
        match cli.command {
            Command::History { limit, status } => {
                assert_eq!(limit, 3);
                assert_eq!(status.map(RecordStatus::from), Some(RecordStatus::Failed));
            }
            _ => panic!("expected History command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
