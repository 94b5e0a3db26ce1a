use std::{collections::HashMap, io::Cursor, process::Stdio, sync::Arc};

use async_trait::async_trait;
use chrono::{Datelike, Utc, Weekday};
use chrono_tz::Tz;
use image::ImageFormat;
use tokio::{io::AsyncWriteExt, process::Command, sync::Mutex};

use crate::config::OcrConfig;

use super::{download_image, ExtractError, MenuExtractor};

/// pixel rectangle of a menu image
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct Region {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("could not run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source] source: std::io::Error,
    },
    #[error("tesseract has no traineddata for {0}")]
    MissingLanguage(String),
    #[error("tesseract failed ({status}): {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("region {region:?} is outside of the {width}x{height} image")]
    RegionOutOfBounds {
        region: Region,
        width: u32,
        height: u32,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// a ready to use recognition engine
#[async_trait]
pub trait OcrWorker: Send + Sync {
    async fn recognize(
        &self, image: &[u8], region: Option<Region>,
    ) -> Result<String, OcrError>;

    async fn terminate(&self);
}

#[async_trait]
pub trait OcrWorkerFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn OcrWorker>, OcrError>;
}

/// runs the `tesseract` binary
pub struct TesseractFactory {
    config: OcrConfig,
}

impl TesseractFactory {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OcrWorkerFactory for TesseractFactory {
    async fn create(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
        let binary = &self.config.binary;
        let out = Command::new(binary)
            .arg("--list-langs")
            .output().await
        .map_err(|source| OcrError::Spawn { binary: binary.clone(), source })?;

        if !out.status.success() {
            return Err(OcrError::Failed {
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        // first line is a header
        let stdout = String::from_utf8_lossy(&out.stdout);
        let available: Vec<_> = stdout.lines().skip(1).map(str::trim).collect();
        for lang in self.config.languages.split('+') {
            if !available.contains(&lang) {
                return Err(OcrError::MissingLanguage(lang.into()));
            }
        }

        tracing::info!("tesseract worker ready ({})", self.config.languages);
        Ok(Box::new(TesseractWorker {
            binary: binary.clone(),
            args: vec![
                format!("stdin"), format!("stdout"),
                format!("-l"), self.config.languages.clone(),
                format!("--oem"), self.config.engine_mode.to_string(),
                format!("--psm"), self.config.page_seg_mode.to_string(),
                format!("--dpi"), self.config.dpi.to_string(),
            ],
        }))
    }
}

struct TesseractWorker {
    binary: String,
    args: Vec<String>,
}

#[async_trait]
impl OcrWorker for TesseractWorker {
    async fn recognize(
        &self, image: &[u8], region: Option<Region>,
    ) -> Result<String, OcrError> {
        let image = image.to_vec();
        let png = tokio::task::spawn_blocking(move || crop_to_png(&image, region)).await??;

        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        .map_err(|source| OcrError::Spawn { binary: self.binary.clone(), source })?;

        let writer = child.stdin.take().map(|mut stdin| tokio::spawn(async move {
            stdin.write_all(&png).await?;
            stdin.shutdown().await
        }));

        let out = child.wait_with_output().await?;
        if let Some(writer) = writer {
            writer.await??;
        }

        if !out.status.success() {
            return Err(OcrError::Failed {
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn terminate(&self) {
        // every recognition is its own process, nothing stays around
        tracing::info!("tesseract worker terminated");
    }
}

fn crop_to_png(bytes: &[u8], region: Option<Region>) -> Result<Vec<u8>, OcrError> {
    let img = image::load_from_memory(bytes)?;

    let img = match region {
        Some(region) => {
            let (width, height) = (img.width(), img.height());
            if region.left >= width || region.top >= height {
                return Err(OcrError::RegionOutOfBounds { region, width, height });
            }
            img.crop_imm(
                region.left, region.top,
                region.width.min(width - region.left),
                region.height.min(height - region.top),
            )
        },
        None => img,
    };

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// collapses line breaks, drops spaces and empty lines
pub fn normalize_lines(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(|l| l.replace(' ', ""))
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
    .join("\n")
}

/// reads today's column of the menu image
pub struct OcrExtractor {
    client: reqwest::Client,
    factory: Arc<dyn OcrWorkerFactory>,
    /// there is at most one worker, created on first use
    worker: Mutex<Option<Box<dyn OcrWorker>>>,
    closed_days: Vec<Weekday>,
    regions: HashMap<Weekday, Region>,
    today: Box<dyn Fn() -> Weekday + Send + Sync>,
}

impl OcrExtractor {
    pub fn new(client: reqwest::Client, config: &OcrConfig, timezone: Tz) -> Self {
        Self::with_factory(
            client,
            Arc::new(TesseractFactory::new(config.clone())),
            config,
            timezone,
        )
    }

    pub fn with_factory(
        client: reqwest::Client,
        factory: Arc<dyn OcrWorkerFactory>,
        config: &OcrConfig,
        timezone: Tz,
    ) -> Self {
        Self {
            client,
            factory,
            worker: Mutex::new(None),
            closed_days: config.closed_days.clone(),
            regions: config.regions.clone(),
            today: Box::new(move || Utc::now().with_timezone(&timezone).weekday()),
        }
    }

    pub fn with_clock(mut self, today: impl Fn() -> Weekday + Send + Sync + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    async fn recognize(
        &self,
        slot: &mut Option<Box<dyn OcrWorker>>,
        image_url: &str,
        region: Option<Region>,
    ) -> Result<String, ExtractError> {
        let image = download_image(&self.client, image_url).await?;

        let worker = match slot.take() {
            Some(worker) => worker,
            None => {
                tracing::info!("starting ocr worker");
                self.factory.create().await?
            },
        };

        let text = worker.recognize(&image.bytes, region).await;
        *slot = Some(worker);

        Ok(normalize_lines(&text?))
    }
}

#[async_trait]
impl MenuExtractor for OcrExtractor {
    fn name(&self) -> &'static str { "tesseract" }

    async fn extract(&self, image_url: &str) -> Result<Option<String>, ExtractError> {
        let today = (self.today)();
        if self.closed_days.contains(&today) {
            tracing::info!("no menu on {today}, skipping ocr");
            return Ok(None);
        }

        let region = self.regions.get(&today).copied();
        if region.is_none() {
            tracing::warn!("no region configured for {today}, reading the whole image");
        }

        let mut slot = self.worker.lock().await;
        match self.recognize(&mut slot, image_url, region).await {
            Ok(text) => Ok(Some(text)),
            Err(err) => {
                tracing::error!("ocr failed, tearing down worker: {err}");
                if let Some(worker) = slot.take() {
                    worker.terminate().await;
                }
                Err(err)
            },
        }
    }

    async fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.terminate().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        recognized: AtomicUsize,
        terminated: AtomicUsize,
    }

    struct FakeFactory {
        counters: Arc<Counters>,
        fail: bool,
    }

    struct FakeWorker {
        counters: Arc<Counters>,
        fail: bool,
    }

    #[async_trait]
    impl OcrWorkerFactory for FakeFactory {
        async fn create(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
            self.counters.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeWorker { counters: self.counters.clone(), fail: self.fail }))
        }
    }

    #[async_trait]
    impl OcrWorker for FakeWorker {
        async fn recognize(
            &self, _image: &[u8], region: Option<Region>,
        ) -> Result<String, OcrError> {
            self.counters.recognized.fetch_add(1, Ordering::SeqCst);
            assert_eq!(region.map(|v| v.left), Some(300));
            if self.fail {
                Err(OcrError::MissingLanguage(format!("kor")))
            } else {
                Ok(format!("쌀 밥\r\n\r\n미역 국\n \n김치"))
            }
        }

        async fn terminate(&self) {
            self.counters.terminated.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn image_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4]))
        .mount(&server).await;
        server
    }

    fn extractor(counters: &Arc<Counters>, fail: bool, today: Weekday) -> OcrExtractor {
        let factory = Arc::new(FakeFactory { counters: counters.clone(), fail });
        OcrExtractor::with_factory(
            reqwest::Client::new(), factory,
            &OcrConfig::default(), chrono_tz::Asia::Seoul,
        ).with_clock(move || today)
    }

    #[test]
    fn normalizes_recognized_text() {
        assert_eq!(normalize_lines("쌀 밥\r\n\r\n미역 국\n \n김치\n"), "쌀밥\n미역국\n김치");
        assert_eq!(normalize_lines("\n \r\n"), "");
    }

    #[tokio::test]
    async fn closed_day_skips_recognition() {
        let counters = Arc::new(Counters::default());
        let ocr = extractor(&counters, false, Weekday::Sat);

        // the url is never touched
        let res = ocr.extract("http://127.0.0.1:1/menu.jpg").await.unwrap();
        assert_eq!(res, None);
        assert_eq!(counters.created.load(Ordering::SeqCst), 0);
        assert_eq!(counters.recognized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn worker_is_created_once_and_reused() {
        let server = image_server().await;
        let counters = Arc::new(Counters::default());
        let ocr = extractor(&counters, false, Weekday::Tue);
        let url = format!("{}/menu.jpg", server.uri());

        for _ in 0..2 {
            let text = ocr.extract(&url).await.unwrap();
            assert_eq!(text.as_deref(), Some("쌀밥\n미역국\n김치"));
        }
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(counters.recognized.load(Ordering::SeqCst), 2);

        ocr.shutdown().await;
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_tears_down_and_recreates_worker() {
        let server = image_server().await;
        let counters = Arc::new(Counters::default());
        let ocr = extractor(&counters, true, Weekday::Tue);
        let url = format!("{}/menu.jpg", server.uri());

        assert!(matches!(ocr.extract(&url).await, Err(ExtractError::Ocr(_))));
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 1);

        assert!(ocr.extract(&url).await.is_err());
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 2);

        // nothing left to shut down
        ocr.shutdown().await;
        assert_eq!(counters.terminated.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn crops_inside_image_bounds() {
        let img = image::DynamicImage::new_rgb8(400, 300);
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        let bytes = bytes.into_inner();

        let region = Region { top: 100, left: 300, width: 200, height: 100 };
        let png = crop_to_png(&bytes, Some(region)).unwrap();
        let cropped = image::load_from_memory(&png).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (100, 100));

        let region = Region { top: 0, left: 500, width: 10, height: 10 };
        assert!(matches!(
            crop_to_png(&bytes, Some(region)),
            Err(OcrError::RegionOutOfBounds { .. }),
        ));
    }
}
