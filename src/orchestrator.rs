use std::fmt;

use tracing::{debug, error, info, warn};

use crate::config::NotepressConfig;
use crate::content::{ContentPipeline, NoteContent};
use crate::error::NotepressError;
use crate::generation::Generator;
use crate::history::{HistoryRecord, HistoryStore, PublishMethod, RecordSnapshot, RecordStatus};
use crate::images::{ImageAsset, ImagePipeline};
use crate::preview::{Decision, DecisionSource, PreviewGate};
use crate::publish::{ChannelKind, DispatchReport, PublishDispatcher, PublishRequest};
use crate::ui::RunProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Preview and confirmation before publishing.
    Full,
    /// Publish right after generation, no preview.
    Quick,
    /// Generate text and images only; nothing is published or recorded.
    GenerateOnly,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub topic: String,
    /// 0 means the configured default.
    pub word_count: u32,
    pub context: String,
    pub mode: RunMode,
    pub humanize: bool,
}

#[derive(Debug)]
pub enum RunOutcome {
    Published {
        record: HistoryRecord,
        report: DispatchReport,
    },
    Cancelled {
        record: HistoryRecord,
    },
    Generated {
        content: NoteContent,
        images: Vec<ImageAsset>,
    },
}

/// Stage names shown on the spinner and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Structure,
    Content,
    Humanize,
    ImagePrompts,
    Images,
    Preview,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Structure => write!(f, "STRUCTURE"),
            Stage::Content => write!(f, "CONTENT"),
            Stage::Humanize => write!(f, "HUMANIZE"),
            Stage::ImagePrompts => write!(f, "IMAGE_PROMPTS"),
            Stage::Images => write!(f, "IMAGES"),
            Stage::Preview => write!(f, "PREVIEW"),
            Stage::Publish => write!(f, "PUBLISH"),
        }
    }
}

/// Sequences one run through every stage and keeps the ledger in step.
pub struct Orchestrator<G> {
    config: NotepressConfig,
    generator: G,
    history: HistoryStore,
    dispatcher: PublishDispatcher,
    decisions: Box<dyn DecisionSource>,
    preview: PreviewGate,
    progress: Option<RunProgress>,
}

fn initial_method(kind: ChannelKind) -> PublishMethod {
    match kind {
        ChannelKind::Simulated => PublishMethod::Auto,
        ChannelKind::Relay => PublishMethod::McpRelay,
        ChannelKind::Browser => PublishMethod::Browser,
    }
}

impl<G: Generator> Orchestrator<G> {
    pub fn new(
        config: NotepressConfig,
        generator: G,
        history: HistoryStore,
        dispatcher: PublishDispatcher,
        decisions: Box<dyn DecisionSource>,
    ) -> Self {
        let preview = PreviewGate::new(&config.storage.preview_dir);
        Self {
            config,
            generator,
            history,
            dispatcher,
            decisions,
            preview,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: RunProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    #[cfg(test)]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    fn stage(&self, stage: Stage) {
        info!(%stage, "entering stage");
        if let Some(progress) = &self.progress {
            progress.stage(stage);
        }
    }

    /// Runs the whole pipeline for one topic.
    ///
    /// Any failure before dispatch is written to the ledger as `failed` and
    /// returned. A dispatch that ends `Failed` moves the pending record to
    /// `failed` and returns [`NotepressError::Dispatch`].
    pub async fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, NotepressError> {
        let mut draft: Option<NoteContent> = None;
        let (content, images) = match self.produce(request, &mut draft).await {
            Ok(produced) => produced,
            Err(e) => {
                if request.mode != RunMode::GenerateOnly {
                    self.record_failure(request, draft.as_ref(), &e)?;
                }
                return Err(e);
            }
        };

        if request.mode == RunMode::GenerateOnly {
            info!(images = images.len(), "generate-only run finished");
            return Ok(RunOutcome::Generated { content, images });
        }

        let decision = if request.mode == RunMode::Quick {
            Decision::Publish
        } else {
            match self.confirm(&content, &images) {
                Ok(decision) => decision,
                Err(e) => {
                    self.record_failure(request, Some(&content), &e)?;
                    return Err(e);
                }
            }
        };

        let scheduled_at = match decision {
            Decision::Cancel => {
                info!("operator cancelled the run");
                let record = self.history.add_record_with_message(
                    snapshot(&content, &images, None),
                    RecordStatus::Cancelled,
                    initial_method(self.dispatcher.requested()),
                    Some("cancelled at confirmation"),
                )?;
                return Ok(RunOutcome::Cancelled { record });
            }
            Decision::Publish => None,
            Decision::PublishAt(at) => Some(at),
        };

        self.stage(Stage::Publish);
        let record = self.history.add_record(
            snapshot(&content, &images, scheduled_at),
            RecordStatus::Pending,
            initial_method(self.dispatcher.requested()),
        )?;

        let publish_request = PublishRequest::new(&content, &images);
        let report = self.dispatcher.dispatch(&publish_request, scheduled_at).await;
        debug!(path = ?report.transitions, used = %report.used, "dispatch finished");
        if report.degraded() {
            if let Some(progress) = &self.progress {
                progress.note(&report.summary());
            }
        }

        let summary = report.summary();
        if report.succeeded() {
            self.history.update_outcome(
                &record.id,
                RecordStatus::Success,
                Some(report.method()),
                Some(&summary),
            )?;
            let record = self.history.get_record(&record.id).cloned().unwrap_or(record);
            Ok(RunOutcome::Published { record, report })
        } else {
            error!(%summary, "dispatch failed");
            self.history.update_outcome(
                &record.id,
                RecordStatus::Failed,
                Some(report.method()),
                Some(&summary),
            )?;
            Err(NotepressError::Dispatch(summary))
        }
    }

    /// Content and image stages. `draft` holds the note as soon as it exists
    /// so a later failure can still be recorded with it.
    async fn produce(
        &self,
        request: &RunRequest,
        draft: &mut Option<NoteContent>,
    ) -> Result<(NoteContent, Vec<ImageAsset>), NotepressError> {
        let generation = &self.config.generation;
        let word_count = if request.word_count == 0 {
            generation.default_word_count
        } else {
            request.word_count
        };
        let pipeline = ContentPipeline::new(&self.generator, generation);

        self.stage(Stage::Structure);
        let structure = pipeline
            .generate_structure(&request.topic, word_count, &request.context)
            .await?;

        self.stage(Stage::Content);
        let mut content = pipeline.generate_content(&structure).await?;
        if content.title.is_empty() {
            content.title = structure.final_title.clone();
        }
        if content.tags.is_empty() {
            content.tags = structure.tags.clone();
        }
        *draft = Some(content.clone());

        if request.humanize && generation.humanize {
            self.stage(Stage::Humanize);
            content = pipeline.humanize(content).await;
            *draft = Some(content.clone());
        }

        let images = ImagePipeline::new(
            &self.generator,
            generation,
            &self.config.images,
            &self.config.storage.output_dir,
        )?;
        self.stage(Stage::ImagePrompts);
        let prompts = images.generate_prompts(&content).await?;
        self.stage(Stage::Images);
        let assets = images.generate_images(&prompts).await?;

        Ok((content, assets))
    }

    fn confirm(&mut self, content: &NoteContent, images: &[ImageAsset]) -> Result<Decision, NotepressError> {
        self.stage(Stage::Preview);
        let path = self.preview.present(content, images)?;
        let decisions = &mut self.decisions;
        let decided = match &self.progress {
            Some(progress) => progress.suspend(|| decisions.decide(&path)),
            None => decisions.decide(&path),
        };
        decided.map_err(|e| NotepressError::Confirmation(e.to_string()))
    }

    fn record_failure(
        &mut self,
        request: &RunRequest,
        content: Option<&NoteContent>,
        err: &NotepressError,
    ) -> Result<(), NotepressError> {
        warn!(error = %err, "run failed before dispatch");
        let snapshot = match content {
            Some(content) => snapshot(content, &[], None),
            None => RecordSnapshot {
                title: request.topic.clone(),
                ..Default::default()
            },
        };
        self.history.add_record_with_message(
            snapshot,
            RecordStatus::Failed,
            initial_method(self.dispatcher.requested()),
            Some(&err.to_string()),
        )?;
        Ok(())
    }
}

fn snapshot(
    content: &NoteContent,
    images: &[ImageAsset],
    scheduled_at: Option<chrono::DateTime<chrono::Local>>,
) -> RecordSnapshot {
    RecordSnapshot {
        title: content.title.clone(),
        content: content.body.clone(),
        tags: content.tags.clone(),
        images: images.iter().map(|a| a.path.display().to_string()).collect(),
        scheduled_at,
    }
}
