use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, ExtractorKind};

mod gemini;
mod tesseract;

pub use gemini::GeminiExtractor;
pub use tesseract::{OcrError, OcrExtractor, Region};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("{0} is not configured")]
    MissingApiKey(&'static str),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("the model answered without any text")]
    EmptyResponse,
    #[error(transparent)]
    Ocr(#[from] OcrError),
}

/// turns the menu image into text
#[async_trait]
pub trait MenuExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means there is no menu to show today
    async fn extract(&self, image_url: &str) -> Result<Option<String>, ExtractError>;

    /// releases everything the extractor holds on to
    async fn shutdown(&self) {}
}

pub fn from_config(config: &Config, client: reqwest::Client) -> Arc<dyn MenuExtractor> {
    let extractor: Arc<dyn MenuExtractor> = match config.extractor.kind {
        ExtractorKind::Gemini => Arc::new(GeminiExtractor::new(
            client, config.gemini.clone(),
        )),
        ExtractorKind::Tesseract => Arc::new(OcrExtractor::new(
            client, &config.ocr, config.schedule.timezone,
        )),
    };
    tracing::info!("extracting menus with {}", extractor.name());
    extractor
}

pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub async fn download_image(
    client: &reqwest::Client, url: &str,
) -> Result<DownloadedImage, reqwest::Error> {
    tracing::info!("downloading menu image {url}");
    let res = client.get(url)
        .send().await?
    .error_for_status()?;

    let mime_type = res.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or("image/jpeg")
    .to_string();

    let bytes = res.bytes().await?.to_vec();
    tracing::info!("downloaded {} bytes ({mime_type})", bytes.len());

    Ok(DownloadedImage { bytes, mime_type })
}
