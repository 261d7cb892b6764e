mod cli;
mod config;
mod content;
mod error;
mod generation;
mod history;
mod images;
mod orchestrator;
mod preview;
mod publish;
mod ui;

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use cli::{Cli, Command};
use config::NotepressConfig;
use generation::GenerationClient;
use history::HistoryStore;
use orchestrator::{Orchestrator, RunMode, RunRequest};
use preview::TerminalDecision;
use publish::PublishDispatcher;
use ui::RunProgress;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = NotepressConfig::load(cli.config.as_deref());
    let log_path = config.as_ref().ok().and_then(|c| c.storage.log_path());
    init_tracing(cli.verbose, log_path.as_deref());

    let result = match config {
        Ok(config) => execute(cli.command, config).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr and, when `log_path` is given, are appended to that
/// file without colours.
fn init_tracing(verbose: bool, log_path: Option<&Path>) {
    let default_filter = if verbose { "notepress=debug" } else { "notepress=info" };
    let file_layer = log_path.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {e}", path.display());
            None
        }
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

async fn execute(command: Command, mut config: NotepressConfig) -> Result<ExitCode> {
    match command {
        Command::Run {
            topic,
            word_count,
            context,
            quick,
            generate_only,
            no_humanize,
            channel,
        } => {
            if let Some(channel) = channel {
                config.publish.channel = channel.into();
            }
            config.validate()?;
            debug!(channel = %config.publish.channel, "configuration validated");

            let mode = if generate_only {
                RunMode::GenerateOnly
            } else if quick {
                RunMode::Quick
            } else {
                RunMode::Full
            };
            let request = RunRequest {
                topic,
                word_count: word_count.unwrap_or(0),
                context,
                mode,
                humanize: !no_humanize,
            };

            let history = HistoryStore::open(&config.storage.history_path())?;
            let generator = GenerationClient::new(&config.generation)?;
            let dispatcher = PublishDispatcher::from_config(&config)?;
            let progress = RunProgress::start(&request.topic);

            let mut orchestrator = Orchestrator::new(
                config,
                generator,
                history,
                dispatcher,
                Box::new(TerminalDecision::stdio()),
            )
            .with_progress(progress.clone());

            match orchestrator.run(&request).await {
                Ok(outcome) => {
                    progress.complete(&outcome);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    progress.fail(&e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::History { limit, status } => {
            let store = HistoryStore::open(&config.storage.history_path())?;
            ui::print_history(&store.get_records(limit, status.map(Into::into)));
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats => {
            let store = HistoryStore::open(&config.storage.history_path())?;
            ui::print_statistics(&store.statistics());
            Ok(ExitCode::SUCCESS)
        }
        Command::Prune { days } => {
            let mut store = HistoryStore::open(&config.storage.history_path())?;
            let days = days.unwrap_or(config.storage.retention_days);
            let removed = store.clear_old_records(days)?;
            println!(
                "Removed {removed} record(s) older than {days} days from {}.",
                store.path().display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
