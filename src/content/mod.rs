//! Text stages of the pipeline: structure → content → (optional) humanize.

pub mod extract;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::NotepressError;
use crate::generation::{CompletionRequest, Generator};

/// A candidate title and the kind of hook it uses, when the model says so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleCandidate {
    pub text: String,
    pub stimulus: Option<String>,
}

/// Titles may come back as plain strings or as `{original, type}` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTitle {
    Plain(String),
    Tagged {
        original: String,
        #[serde(rename = "type", default)]
        kind: Option<String>,
    },
}

impl From<RawTitle> for TitleCandidate {
    fn from(raw: RawTitle) -> Self {
        match raw {
            RawTitle::Plain(text) => Self { text, stimulus: None },
            RawTitle::Tagged { original, kind } => Self {
                text: original,
                stimulus: kind,
            },
        }
    }
}

/// Shape the structure prompt asks the model to fill.
#[derive(Deserialize)]
struct RawStructure {
    #[serde(default)]
    titles: Vec<RawTitle>,
    final_title: String,
    content_outline: Vec<String>,
    tags: Vec<String>,
}

/// Titles, outline and tags for one note, plus the inputs that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStructure {
    pub topic: String,
    pub word_count: u32,
    pub context: String,
    pub titles: Vec<TitleCandidate>,
    pub final_title: String,
    pub outline: Vec<String>,
    pub tags: Vec<String>,
}

/// A finished note: title, body text and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteContent {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
}

/// Drives the generation capability through the text stages.
pub struct ContentPipeline<'a, G> {
    generator: &'a G,
    config: &'a GenerationConfig,
}

impl<'a, G: Generator> ContentPipeline<'a, G> {
    pub fn new(generator: &'a G, config: &'a GenerationConfig) -> Self {
        Self { generator, config }
    }

    fn request(&self, prompt: String, temperature: f32) -> CompletionRequest {
        CompletionRequest {
            model: self.config.text_model.clone(),
            prompt,
            temperature,
            max_tokens: self.config.max_tokens,
            timeout: self.config.timeout(),
        }
    }

    /// Produces title candidates, outline and tags for `topic`.
    ///
    /// The response must contain a JSON object with `final_title`,
    /// `content_outline` and `tags`; anything else is a
    /// [`NotepressError::ContentFormat`] and is not retried.
    pub async fn generate_structure(
        &self,
        topic: &str,
        word_count: u32,
        context: &str,
    ) -> Result<NoteStructure, NotepressError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(NotepressError::InvalidInput("topic must not be empty".into()));
        }
        if word_count == 0 {
            return Err(NotepressError::InvalidInput(
                "word count must be greater than zero".into(),
            ));
        }

        info!(topic, word_count, "generating note structure");
        let raw = self
            .generator
            .complete(&self.request(
                structure_prompt(topic, word_count, context),
                self.config.temperature,
            ))
            .await?;
        debug!(len = raw.len(), "structure response received");

        let parsed: RawStructure = extract::parse_object(&raw)?;
        if parsed.final_title.trim().is_empty() {
            return Err(NotepressError::ContentFormat(
                "generation output has an empty final_title".into(),
            ));
        }

        Ok(NoteStructure {
            topic: topic.to_string(),
            word_count,
            context: context.to_string(),
            titles: parsed.titles.into_iter().map(TitleCandidate::from).collect(),
            final_title: parsed.final_title.trim().to_string(),
            outline: parsed.content_outline,
            tags: parsed.tags,
        })
    }

    /// Expands a structure into full prose.
    ///
    /// Parsing is lenient: a section the model left out comes back empty.
    pub async fn generate_content(
        &self,
        structure: &NoteStructure,
    ) -> Result<NoteContent, NotepressError> {
        info!(title = %structure.final_title, "generating note content");
        let raw = self
            .generator
            .complete(&self.request(content_prompt(structure), self.config.temperature))
            .await?;

        let sections = extract::markdown_sections(&raw);
        if sections.body.is_empty() {
            warn!("content response had no body section");
        }
        Ok(NoteContent {
            title: sections.title,
            body: sections.body,
            tags: sections.tags,
        })
    }

    /// Rewrites the body to read less machine-generated.
    ///
    /// Never fails: any error returns `content` unchanged.
    pub async fn humanize(&self, content: NoteContent) -> NoteContent {
        info!("humanizing note body");
        let request = self.request(humanize_prompt(&content), self.config.humanize_temperature);
        match self.generator.complete(&request).await {
            Ok(raw) => {
                let body = extract::strip_code_fences(&raw);
                if body.is_empty() {
                    warn!("humanize returned an empty body, keeping original");
                    return content;
                }
                NoteContent { body, ..content }
            }
            Err(e) => {
                warn!(error = %e, "humanize failed, keeping original");
                content
            }
        }
    }
}

fn structure_prompt(topic: &str, word_count: u32, context: &str) -> String {
    format!(
        "You are an experienced social media note writer.\n\
         Fill in the JSON structure below for the requested note. \
         Respond with ONLY the JSON object, no other text.\n\
         \n\
         Topic: {topic}\n\
         Target length: {word_count} words\n\
         Background: {context}\n\
         \n\
         Rules:\n\
         - Write 5 candidate titles under 20 words each. Use either a positive hook \
           (\"do X, get Y instantly\") or a negative hook (\"skip X and you will regret it\").\n\
         - Pick the strongest one as final_title.\n\
         - Give an ordered outline of the body.\n\
         - Give 5 tags, each starting with #.\n\
         \n\
         {{\n\
           \"titles\": [{{\"original\": \"title text\", \"type\": \"positive|negative\"}}],\n\
           \"final_title\": \"chosen title\",\n\
           \"content_outline\": [\"point 1\", \"point 2\"],\n\
           \"tags\": [\"#tag1\", \"#tag2\"]\n\
         }}"
    )
}

fn content_prompt(structure: &NoteStructure) -> String {
    let outline = structure
        .outline
        .iter()
        .enumerate()
        .map(|(i, point)| format!("{}. {point}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are an experienced social media note writer.\n\
         \n\
         Title: {title}\n\
         Topic: {topic}\n\
         Outline:\n{outline}\n\
         Background: {context}\n\
         \n\
         Rules:\n\
         1. Match the tone to the topic: lifestyle is light and friendly, career advice \
            is sincere and practical, personal growth is warm and encouraging.\n\
         2. Open with a hook that names a real pain point of the audience.\n\
         3. Follow the outline strictly; use the background only where it supports the topic.\n\
         4. End with an interaction prompt (an open question or a poll).\n\
         5. Conversational tone, 50 to {word_count} words, no emoji.\n\
         \n\
         Reply in Markdown with exactly these sections:\n\
         ## Title\n{title}\n\
         \n\
         ## Body\n(the note body)\n\
         \n\
         ## Image Suggestions\n(style, composition and colour advice)\n\
         \n\
         ## Tags\n{tags}",
        title = structure.final_title,
        topic = structure.topic,
        context = structure.context,
        word_count = structure.word_count,
        tags = structure.tags.join(" "),
    )
}

fn humanize_prompt(content: &NoteContent) -> String {
    format!(
        "Rewrite the following note body so it reads like a real person wrote it: \
         vary sentence length, drop stock phrases, keep every fact and the closing \
         question. Reply with the rewritten body only, no headings.\n\
         \n\
         Title: {}\n\
         \n\
         {}",
        content.title, content.body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationError, ImageRequest};
    use std::sync::Mutex;

    /// Replays canned completions in order and records every request.
    struct ScriptedGenerator {
        replies: Mutex<Vec<Result<String, GenerationError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<String, GenerationError>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Generator for ScriptedGenerator {
        async fn complete(&self, req: &CompletionRequest) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(req.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(GenerationError::EmptyResponse("script exhausted")))
        }

        async fn generate_image(&self, _req: &ImageRequest) -> Result<String, GenerationError> {
            Err(GenerationError::EmptyResponse("not scripted"))
        }
    }

    const STRUCTURE: &str = r##"```json
{
  "titles": [{"original": "Sleep better in 3 nights", "type": "positive"}, "Skip this and regret it"],
  "final_title": "Sleep better in 3 nights",
  "content_outline": ["hook", "three habits", "question"],
  "tags": ["#sleep", "#habits"]
}
```"##;

    fn structure() -> NoteStructure {
        NoteStructure {
            topic: "sleep".into(),
            word_count: 300,
            context: String::new(),
            titles: vec![],
            final_title: "Sleep better".into(),
            outline: vec!["hook".into()],
            tags: vec!["#sleep".into()],
        }
    }

    #[tokio::test]
    async fn structure_is_extracted_and_enriched() {
        let generator = ScriptedGenerator::new(vec![Ok(STRUCTURE.into())]);
        let config = GenerationConfig::default();
        let pipeline = ContentPipeline::new(&generator, &config);

        let s = pipeline.generate_structure("  sleep  ", 300, "for students").await.unwrap();
        assert_eq!(s.topic, "sleep");
        assert_eq!(s.word_count, 300);
        assert_eq!(s.context, "for students");
        assert_eq!(s.final_title, "Sleep better in 3 nights");
        assert_eq!(s.outline.len(), 3);
        assert_eq!(s.tags, vec!["#sleep", "#habits"]);
        assert_eq!(s.titles.len(), 2);
        assert_eq!(s.titles[0].stimulus.as_deref(), Some("positive"));
        assert_eq!(s.titles[1].stimulus, None);

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, 0.7);
        assert!(seen[0].prompt.contains("Topic: sleep"));
    }

    #[tokio::test]
    async fn structure_rejects_invalid_input_without_calling_generator() {
        let generator = ScriptedGenerator::new(vec![]);
        let config = GenerationConfig::default();
        let pipeline = ContentPipeline::new(&generator, &config);

        let err = pipeline.generate_structure("   ", 300, "").await.unwrap_err();
        assert!(matches!(err, NotepressError::InvalidInput(_)));
        let err = pipeline.generate_structure("topic", 0, "").await.unwrap_err();
        assert!(matches!(err, NotepressError::InvalidInput(_)));
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn structure_without_required_fields_is_format_error() {
        let generator = ScriptedGenerator::new(vec![Ok(r#"{"final_title": "x"}"#.into())]);
        let config = GenerationConfig::default();
        let pipeline = ContentPipeline::new(&generator, &config);

        let err = pipeline.generate_structure("topic", 300, "").await.unwrap_err();
        assert!(matches!(err, NotepressError::ContentFormat(_)));
        assert_eq!(generator.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn structure_with_blank_title_is_format_error() {
        let generator = ScriptedGenerator::new(vec![Ok(
            r#"{"final_title": " ", "content_outline": [], "tags": []}"#.into(),
        )]);
        let config = GenerationConfig::default();
        let pipeline = ContentPipeline::new(&generator, &config);

        let err = pipeline.generate_structure("topic", 300, "").await.unwrap_err();
        assert!(matches!(err, NotepressError::ContentFormat(_)));
    }

    #[tokio::test]
    async fn content_parse_is_lenient() {
        let generator = ScriptedGenerator::new(vec![Ok("## Body\nJust a body.".into())]);
        let config = GenerationConfig::default();
        let pipeline = ContentPipeline::new(&generator, &config);

        let content = pipeline.generate_content(&structure()).await.unwrap();
        assert_eq!(content.title, "");
        assert_eq!(content.body, "Just a body.");
        assert!(content.tags.is_empty());
    }

    #[tokio::test]
    async fn content_generation_error_propagates() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::Timeout)]);
        let config = GenerationConfig::default();
        let pipeline = ContentPipeline::new(&generator, &config);

        let err = pipeline.generate_content(&structure()).await.unwrap_err();
        assert!(matches!(err, NotepressError::Generation(GenerationError::Timeout)));
    }

    #[tokio::test]
    async fn humanize_replaces_body_with_higher_temperature() {
        let generator = ScriptedGenerator::new(vec![Ok("A warmer body.".into())]);
        let config = GenerationConfig::default();
        let pipeline = ContentPipeline::new(&generator, &config);

        let original = NoteContent {
            title: "T".into(),
            body: "A stiff body.".into(),
            tags: vec!["#t".into()],
        };
        let out = pipeline.humanize(original).await;
        assert_eq!(out.body, "A warmer body.");
        assert_eq!(out.title, "T");
        assert_eq!(out.tags, vec!["#t"]);
        assert_eq!(generator.seen.lock().unwrap()[0].temperature, 0.95);
    }

    #[tokio::test]
    async fn humanize_swallows_failures() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::ApiError {
            status: 500,
            message: "boom".into(),
        })]);
        let config = GenerationConfig::default();
        let pipeline = ContentPipeline::new(&generator, &config);

        let original = NoteContent {
            title: "T".into(),
            body: "Body.".into(),
            tags: vec![],
        };
        let out = pipeline.humanize(original.clone()).await;
        assert_eq!(out, original);
    }
}
