pub mod client;
pub mod error;
pub mod types;

pub use client::GenerationClient;
pub use error::GenerationError;
pub use types::{CompletionRequest, ImageRequest};

/// The text and image generation capability the pipelines drive.
///
/// Implemented by [`GenerationClient`] for the real service and by fakes in
/// tests.
#[allow(async_fn_in_trait)]
pub trait Generator {
    /// Returns the completion text for a single prompt.
    async fn complete(&self, req: &CompletionRequest) -> Result<String, GenerationError>;

    /// Returns the remote URL of a freshly generated image.
    async fn generate_image(&self, req: &ImageRequest) -> Result<String, GenerationError>;
}
