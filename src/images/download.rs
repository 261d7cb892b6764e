//! Acquisition of generated images: download, validate, persist.
//!
//! No retry happens here. A timeout, network failure or invalid payload is
//! returned to the caller as-is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use super::{ImageAsset, ImageKind};
use crate::error::NotepressError;

/// Downloads images into a directory and checks they look like real images.
pub struct Downloader {
    client: Client,
    output_dir: PathBuf,
    min_bytes: u64,
}

impl Downloader {
    pub fn new(output_dir: &Path, timeout: Duration, min_bytes: u64) -> Result<Self, NotepressError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            output_dir: output_dir.to_path_buf(),
            min_bytes,
        })
    }

    /// Fetches `url` and stores it as `<kind>_<index>_<unix-secs>.<ext>`.
    ///
    /// The declared content type must start with `image/` and the stored
    /// file must be larger than the configured minimum, otherwise
    /// [`NotepressError::Validation`] is returned and nothing is kept on disk.
    pub async fn acquire(&self, url: &str, kind: ImageKind, index: usize) -> Result<ImageAsset, NotepressError> {
        debug!(url, %kind, index, "downloading image");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotepressError::Download {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(NotepressError::Validation(format!(
                "{url} declared content type {content_type:?}, expected image/*"
            )));
        }

        let bytes = response.bytes().await.map_err(|e| network_error(url, e))?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self
            .output_dir
            .join(file_name(kind, index, Local::now().timestamp(), &content_type));
        tokio::fs::write(&path, &bytes).await?;

        let size = tokio::fs::metadata(&path).await?.len();
        if size <= self.min_bytes {
            tokio::fs::remove_file(&path).await?;
            return Err(NotepressError::Validation(format!(
                "{url} returned {size} bytes, at most {} is treated as a placeholder",
                self.min_bytes
            )));
        }

        info!(path = %path.display(), size, "image saved");
        Ok(ImageAsset {
            kind,
            index,
            source_url: url.to_string(),
            path,
            bytes: size,
        })
    }
}

fn network_error(url: &str, err: reqwest::Error) -> NotepressError {
    if err.is_timeout() {
        NotepressError::DownloadTimeout { url: url.to_string() }
    } else {
        NotepressError::Download {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn extension_for(content_type: &str) -> &'static str {
    let subtype = content_type
        .strip_prefix("image/")
        .and_then(|rest| rest.split(';').next())
        .unwrap_or("")
        .trim();
    match subtype {
        "jpeg" | "jpg" => "jpg",
        "webp" => "webp",
        "gif" => "gif",
        _ => "png",
    }
}

/// Deterministic file name for an acquired image.
pub fn file_name(kind: ImageKind, index: usize, timestamp: i64, content_type: &str) -> String {
    format!("{kind}_{index}_{timestamp}.{}", extension_for(content_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn downloader(dir: &Path) -> Downloader {
        Downloader::new(dir, Duration::from_millis(300), 1024).unwrap()
    }

    #[tokio::test]
    async fn valid_image_is_persisted() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/cover.png",
            ResponseTemplate::new(200).set_body_raw(vec![7u8; 4096], "image/png"),
        )
        .await;
        let tmp = tempfile::tempdir().unwrap();

        let url = format!("{}/cover.png", server.uri());
        let asset = downloader(tmp.path()).acquire(&url, ImageKind::Cover, 0).await.unwrap();

        assert_eq!(asset.kind, ImageKind::Cover);
        assert_eq!(asset.index, 0);
        assert_eq!(asset.bytes, 4096);
        assert_eq!(asset.source_url, url);
        assert!(asset.path.exists());
        let name = asset.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("cover_0_"));
        assert!(name.ends_with(".png"));
    }

    #[tokio::test]
    async fn html_payload_is_rejected_regardless_of_size() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/page",
            ResponseTemplate::new(200).set_body_raw(vec![b'x'; 64 * 1024], "text/html"),
        )
        .await;
        let tmp = tempfile::tempdir().unwrap();

        let url = format!("{}/page", server.uri());
        let err = downloader(tmp.path()).acquire(&url, ImageKind::Content, 1).await.unwrap_err();
        assert!(matches!(err, NotepressError::Validation(_)));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn tiny_payload_is_rejected_and_removed() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/tiny.jpg",
            ResponseTemplate::new(200).set_body_raw(vec![1u8; 512], "image/jpeg"),
        )
        .await;
        let tmp = tempfile::tempdir().unwrap();

        let url = format!("{}/tiny.jpg", server.uri());
        let err = downloader(tmp.path()).acquire(&url, ImageKind::Content, 2).await.unwrap_err();
        assert!(matches!(err, NotepressError::Validation(_)));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn slow_server_is_download_timeout() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/slow.png",
            ResponseTemplate::new(200)
                .set_body_raw(vec![0u8; 4096], "image/png")
                .set_delay(Duration::from_secs(2)),
        )
        .await;
        let tmp = tempfile::tempdir().unwrap();

        let url = format!("{}/slow.png", server.uri());
        let err = downloader(tmp.path()).acquire(&url, ImageKind::Cover, 0).await.unwrap_err();
        assert!(matches!(err, NotepressError::DownloadTimeout { .. }));
    }

    #[tokio::test]
    async fn error_status_is_download_error() {
        let server = MockServer::start().await;
        serve(&server, "/gone.png", ResponseTemplate::new(404)).await;
        let tmp = tempfile::tempdir().unwrap();

        let url = format!("{}/gone.png", server.uri());
        let err = downloader(tmp.path()).acquire(&url, ImageKind::Cover, 0).await.unwrap_err();
        assert!(matches!(err, NotepressError::Download { .. }));
    }

    #[test]
    fn file_name_encodes_kind_index_and_time() {
        assert_eq!(
            file_name(ImageKind::Content, 2, 1_700_000_000, "image/jpeg"),
            "content_2_1700000000.jpg"
        );
        assert_eq!(
            file_name(ImageKind::Cover, 0, 1, "image/webp; charset=binary"),
            "cover_0_1.webp"
        );
        assert_eq!(file_name(ImageKind::Cover, 0, 1, "image/png"), "cover_0_1.png");
    }
}
