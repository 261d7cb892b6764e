//! Image stage: prompts from the finished note, then one image per prompt.

pub mod download;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{GenerationConfig, ImageConfig};
use crate::content::NoteContent;
use crate::content::extract;
use crate::error::NotepressError;
use crate::generation::{CompletionRequest, Generator, ImageRequest};

pub use download::Downloader;

/// Appended to every image prompt.
const NEGATIVE_CONSTRAINTS: &str =
    "no watermark, no text, no logo, no signature, no distorted artifacts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Cover,
    Content,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Cover => write!(f, "cover"),
            ImageKind::Content => write!(f, "content"),
        }
    }
}

/// A downloaded and validated image on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub kind: ImageKind,
    pub index: usize,
    pub source_url: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// One cover prompt plus up to three content prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePromptSet {
    pub cover: String,
    pub content: Vec<String>,
}

impl ImagePromptSet {
    pub fn len(&self) -> usize {
        1 + self.content.len()
    }

    /// Prompts in generation order, cover first.
    pub fn iter(&self) -> impl Iterator<Item = (ImageKind, &str)> {
        std::iter::once((ImageKind::Cover, self.cover.as_str()))
            .chain(self.content.iter().map(|p| (ImageKind::Content, p.as_str())))
    }
}

#[derive(Deserialize)]
struct RawPromptSet {
    #[serde(alias = "cover")]
    cover_image: String,
    #[serde(alias = "content", default)]
    content_images: Vec<String>,
}

pub struct ImagePipeline<'a, G> {
    generator: &'a G,
    generation: &'a GenerationConfig,
    images: &'a ImageConfig,
    downloader: Downloader,
}

impl<'a, G: Generator> ImagePipeline<'a, G> {
    pub fn new(
        generator: &'a G,
        generation: &'a GenerationConfig,
        images: &'a ImageConfig,
        output_dir: &Path,
    ) -> Result<Self, NotepressError> {
        let downloader = Downloader::new(output_dir, images.download_timeout(), images.min_bytes)?;
        Ok(Self {
            generator,
            generation,
            images,
            downloader,
        })
    }

    /// Asks the model for image prompts matching `content`.
    ///
    /// Uses the same strict JSON contract as the structure stage. Content
    /// prompts beyond `count - 1` are dropped.
    pub async fn generate_prompts(&self, content: &NoteContent) -> Result<ImagePromptSet, NotepressError> {
        let wanted = self.images.count.clamp(1, 4);
        info!(wanted, "generating image prompts");

        let request = CompletionRequest {
            model: self.generation.text_model.clone(),
            prompt: prompts_prompt(content, wanted - 1),
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            timeout: self.generation.timeout(),
        };
        let raw = self.generator.complete(&request).await?;
        let parsed: RawPromptSet = extract::parse_object(&raw)?;

        let cover = parsed.cover_image.trim().to_string();
        if cover.is_empty() {
            return Err(NotepressError::ContentFormat(
                "generation output has an empty cover_image prompt".into(),
            ));
        }

        let mut content_prompts: Vec<String> = parsed
            .content_images
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if content_prompts.len() > wanted - 1 {
            warn!(
                returned = content_prompts.len(),
                kept = wanted - 1,
                "discarding extra content prompts"
            );
            content_prompts.truncate(wanted - 1);
        }

        Ok(ImagePromptSet {
            cover,
            content: content_prompts,
        })
    }

    /// Generates and downloads one image per prompt, cover first.
    ///
    /// The first failure aborts the stage; no partial set is returned.
    pub async fn generate_images(&self, prompts: &ImagePromptSet) -> Result<Vec<ImageAsset>, NotepressError> {
        let mut assets = Vec::with_capacity(prompts.len());
        for (index, (kind, prompt)) in prompts.iter().enumerate() {
            info!(index, %kind, "generating image");
            let request = ImageRequest {
                model: self.generation.image_model.clone(),
                prompt: constrained(prompt),
                size: self.images.size.clone(),
                timeout: self.generation.timeout(),
                no_watermark: true,
            };
            let url = self.generator.generate_image(&request).await?;
            let asset = self.downloader.acquire(&url, kind, index).await?;
            assets.push(asset);
        }
        Ok(assets)
    }
}

fn constrained(prompt: &str) -> String {
    format!("{prompt}. Vertical 3:4 composition, {NEGATIVE_CONSTRAINTS}.")
}

fn prompts_prompt(content: &NoteContent, content_count: usize) -> String {
    format!(
        "You design images for a social media note. Read the note and write image \
         generation prompts. Respond with ONLY this JSON object, no other text:\n\
         {{\"cover_image\": \"prompt for an eye-catching cover\", \
         \"content_images\": [\"prompt\", ...]}}\n\
         \n\
         Rules:\n\
         - content_images holds exactly {content_count} prompts that illustrate the body in order.\n\
         - Describe subject, style, lighting and colour. Photographic or clean illustration.\n\
         - Never ask for text, captions or logos inside the image.\n\
         \n\
         Title: {title}\n\
         Body:\n{body}",
        title = content.title,
        body = content.body,
    )
}
