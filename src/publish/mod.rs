//! Publish dispatch: one closed set of channels, one state machine, and a
//! simulated fallback that absorbs every channel failure.

pub mod browser;
pub mod chrome;
pub mod relay;
pub mod state;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::NotepressConfig;
use crate::content::NoteContent;
use crate::error::ChannelError;
use crate::history::PublishMethod;
use crate::images::ImageAsset;

pub use browser::{BrowserPublisher, BrowserReport};
pub use chrome::ChromeFactory;
pub use relay::RelayClient;
pub use state::{DispatchEvent, DispatchMachine, DispatchState};

/// Configured channel, as named in `notepress.toml` and on the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Simulated,
    Relay,
    Browser,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Simulated => write!(f, "simulated"),
            ChannelKind::Relay => write!(f, "relay"),
            ChannelKind::Browser => write!(f, "browser"),
        }
    }
}

/// The unit handed to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRequest {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub images: Vec<PathBuf>,
}

impl PublishRequest {
    pub fn new(content: &NoteContent, images: &[ImageAsset]) -> Self {
        Self {
            title: content.title.clone(),
            body: content.body.clone(),
            tags: content.tags.clone(),
            images: images.iter().map(|a| a.path.clone()).collect(),
        }
    }
}

pub enum PublishChannel {
    Simulated,
    RemoteRelay(RelayClient),
    BrowserAutomation(Arc<BrowserPublisher>),
}

impl PublishChannel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            PublishChannel::Simulated => ChannelKind::Simulated,
            PublishChannel::RemoteRelay(_) => ChannelKind::Relay,
            PublishChannel::BrowserAutomation(_) => ChannelKind::Browser,
        }
    }
}

/// Writes the would-be payload to `<output_dir>/publish_<millis>.json`.
pub struct Simulator {
    output_dir: PathBuf,
}

impl Simulator {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub async fn record(&self, request: &PublishRequest) -> std::io::Result<PathBuf> {
        let now = Local::now();
        let topics: Vec<&str> = request
            .tags
            .iter()
            .map(|t| t.trim_start_matches('#'))
            .filter(|t| !t.is_empty())
            .collect();
        let payload = json!({
            "title": request.title,
            "desc": request.body,
            "topics": topics,
            "images": request.images,
            "simulated_at": now.to_rfc3339(),
        });

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self
            .output_dir
            .join(format!("publish_{}.json", now.timestamp_millis()));
        let json = serde_json::to_string_pretty(&payload)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

/// Everything observable about one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub requested: ChannelKind,
    pub used: ChannelKind,
    pub state: DispatchState,
    pub transitions: Vec<DispatchState>,
    /// Why the requested channel was abandoned, when it was.
    pub fallback_reason: Option<String>,
    /// Set only when the dispatch ended `Failed`.
    pub error: Option<String>,
    pub artifact: Option<PathBuf>,
    pub browser: Option<BrowserReport>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> bool {
        self.state == DispatchState::Succeeded
    }

    pub fn degraded(&self) -> bool {
        self.fallback_reason.is_some()
    }

    /// Ledger method for the channel that actually carried the note.
    pub fn method(&self) -> PublishMethod {
        match self.used {
            ChannelKind::Simulated => PublishMethod::Auto,
            ChannelKind::Relay => PublishMethod::McpRelay,
            ChannelKind::Browser => PublishMethod::Browser,
        }
    }

    /// One-line status for the ledger.
    pub fn summary(&self) -> String {
        match (&self.error, &self.fallback_reason) {
            (Some(error), _) => error.clone(),
            (None, Some(reason)) => format!("{} channel failed ({reason}), published via simulated channel", self.requested),
            (None, None) => format!("published via {} channel", self.used),
        }
    }
}

pub struct PublishDispatcher {
    channel: PublishChannel,
    simulator: Simulator,
}

impl PublishDispatcher {
    pub fn new(channel: PublishChannel, output_dir: &Path) -> Self {
        Self {
            channel,
            simulator: Simulator::new(output_dir),
        }
    }

    /// Builds the configured channel.
    pub fn from_config(config: &NotepressConfig) -> Result<Self, ChannelError> {
        let channel = match config.publish.channel {
            ChannelKind::Simulated => PublishChannel::Simulated,
            ChannelKind::Relay => PublishChannel::RemoteRelay(RelayClient::new(&config.relay)?),
            ChannelKind::Browser => {
                let factory = ChromeFactory::new(&config.browser);
                PublishChannel::BrowserAutomation(Arc::new(BrowserPublisher::new(
                    &config.browser,
                    Box::new(factory),
                )))
            }
        };
        Ok(Self::new(channel, &config.storage.output_dir))
    }

    pub fn requested(&self) -> ChannelKind {
        self.channel.kind()
    }

    /// Publishes `request`, first sleeping until `scheduled_at` when it is in
    /// the future. The wait cannot be interrupted once entered.
    ///
    /// Never returns an error: a failing channel degrades to the simulated
    /// one, and only a failure of the simulated write ends `Failed`.
    pub async fn dispatch(&self, request: &PublishRequest, scheduled_at: Option<DateTime<Local>>) -> DispatchReport {
        let mut machine = DispatchMachine::new();

        if let Some(at) = scheduled_at {
            match (at - Local::now()).to_std() {
                Ok(wait) if !wait.is_zero() => {
                    machine.apply(DispatchEvent::Schedule);
                    info!(at = %at.format("%Y-%m-%d %H:%M:%S"), wait_secs = wait.as_secs(), "waiting for scheduled time");
                    sleep(wait).await;
                }
                _ => warn!(at = %at, "scheduled time already passed, publishing now"),
            }
        }

        machine.apply(DispatchEvent::Begin);
        let requested = self.channel.kind();
        info!(channel = %requested, "dispatching note");

        let mut browser_report = None;
        let outcome = match &self.channel {
            PublishChannel::Simulated => Ok(()),
            PublishChannel::RemoteRelay(client) => client.publish(request).await.map(|_| ()),
            PublishChannel::BrowserAutomation(publisher) => {
                let publisher = Arc::clone(publisher);
                let owned = request.clone();
                match tokio::task::spawn_blocking(move || publisher.publish(&owned)).await {
                    Ok(Ok(report)) => {
                        info!(login_waited = report.login_waited, "browser session finished");
                        if !report.missed_fields().is_empty() {
                            warn!(missed = ?report.missed_fields(), "some fields were left for the operator");
                        }
                        browser_report = Some(report);
                        Ok(())
                    }
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(ChannelError::Browser(format!("browser task aborted: {e}"))),
                }
            }
        };

        let mut used = requested;
        let mut fallback_reason = None;
        if let Err(e) = outcome {
            warn!(channel = %requested, error = %e, "channel failed, degrading to simulated");
            fallback_reason = Some(e.to_string());
            used = ChannelKind::Simulated;
        }

        let mut artifact = None;
        let mut error = None;
        if used == ChannelKind::Simulated {
            match self.simulator.record(request).await {
                Ok(path) => {
                    info!(path = %path.display(), "simulated publish recorded");
                    artifact = Some(path);
                }
                Err(e) => error = Some(format!("simulated publish failed: {e}")),
            }
        }

        let event = if error.is_none() {
            DispatchEvent::Succeed
        } else {
            DispatchEvent::Fail
        };
        machine.apply(event);
        debug_assert!(machine.state().is_terminal());

        DispatchReport {
            requested,
            used,
            state: machine.state(),
            transitions: machine.transitions(),
            fallback_reason,
            error,
            artifact,
            browser: browser_report,
        }
    }
}
