use std::{collections::HashMap, fmt, net::IpAddr, str::FromStr};

use anyhow::Context;
use chrono::Weekday;
use chrono_tz::Tz;
use tokio::fs;

use crate::extract::Region;

pub async fn read() -> anyhow::Result<Config> {
    let config_path = "menu_alarm.toml";

    match dotenvy::dotenv() {
        Ok(path) => tracing::info!("loaded environment from {path:?}"),
        Err(err) if err.not_found() => tracing::info!("no .env file found"),
        Err(err) => return Err(err).context("could not read .env file"),
    }

    let canon = fs::canonicalize(".").await?;
    tracing::info!("try reading config file {config_path} at {canon:?}");

    let mut config = if fs::try_exists(config_path).await? {
        tracing::info!("found config");

        let config = fs::read_to_string(config_path).await?;
        let config = toml::from_str(&config)?;
        tracing::info!("read config");
        config
    } else {
        tracing::info!("config does not exist, using default config");
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;

    tracing::info!("using config: {config:#?}");
    Ok(config)
}

/// a value that must not show up in logs
#[derive(Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(v: impl Into<String>) -> Self { Self(v.into()) }
    pub fn expose(&self) -> &str { &self.0 }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub server_kill_key: Option<Secret>,
}

impl Config {
    /// environment variables win over the config file
    pub fn apply_env(
        &mut self, var: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("PORT") {
            self.server.port = v.parse().with_context(|| format!("invalid PORT: {v}"))?;
        }
        if let Some(v) = var("BASE_URL") { self.server.base_url = v }
        if let Some(v) = var("IMAGE_API_URL") { self.feed.url = Some(v) }
        if let Some(v) = var("MENU_EXTRACTOR") { self.extractor.kind = v.parse()? }
        if let Some(v) = var("GEMINI_API_KEY") { self.gemini.api_key = Some(Secret::new(v)) }
        if let Some(v) = var("GEMINI_MODEL") { self.gemini.model = v }
        if let Some(v) = var("SLACK_WEBHOOK_URL") { self.notify.slack_webhook_url = Some(Secret::new(v)) }
        if let Some(v) = var("DISCORD_WEBHOOK_URL") { self.notify.discord_webhook_url = Some(Secret::new(v)) }
        if let Some(v) = var("SERVER_KILL_KEY") { self.server_kill_key = Some(Secret::new(v)) }
        if let Some(v) = var("CRON_SCHEDULE") { self.schedule.cron = v }
        if let Some(v) = var("TZ_NAME") {
            self.schedule.timezone = v.parse()
                .map_err(|err| anyhow::anyhow!("invalid TZ_NAME {v}: {err}"))?;
        }

        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    /// used to print reachable endpoint urls
    pub base_url: String,
}

impl ServerConfig {
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}:{}{path}", self.base_url.trim_end_matches('/'), self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: IpAddr::from([0, 0, 0, 0]),
            port: 3890,
            base_url: format!("http://localhost"),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    #[default] Gemini,
    Tesseract,
}

impl FromStr for ExtractorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "tesseract" | "ocr" => Ok(Self::Tesseract),
            other => anyhow::bail!("unknown menu extractor: {other}"),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub kind: ExtractorKind,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<Secret>,
    pub model: String,
    pub api_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: format!("gemini-2.0-flash"),
            api_url: format!("https://generativelanguage.googleapis.com/v1beta"),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub binary: String,
    /// tesseract language list, e.g. `kor+eng`
    pub languages: String,
    pub engine_mode: u8,
    pub page_seg_mode: u8,
    pub dpi: u32,
    /// days without a menu, recognition is skipped on these
    pub closed_days: Vec<Weekday>,
    /// where each day's column sits on the menu image.
    /// depends on the layout the cafeteria uses and breaks when it changes.
    pub regions: HashMap<Weekday, Region>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        let regions = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
            .into_iter()
            .enumerate()
            .map(|(i, day)| (day, Region {
                top: 100,
                left: 100 + 200 * i as u32,
                width: 200,
                height: 200,
            }))
        .collect();

        Self {
            binary: format!("tesseract"),
            languages: format!("kor+eng"),
            // lstm only
            engine_mode: 1,
            page_seg_mode: 11,
            dpi: 300,
            closed_days: vec![Weekday::Sat, Weekday::Sun],
            regions,
        }
    }
}

#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub slack_webhook_url: Option<Secret>,
    pub discord_webhook_url: Option<Secret>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// `sec min hour day-of-month month day-of-week`
    pub cron: String,
    pub timezone: Tz,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            // weekdays at 06:00
            cron: format!("0 0 6 * * Mon-Fri"),
            timezone: chrono_tz::Asia::Seoul,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let config: Config = toml::from_str(r#"
            server_kill_key = "bye"

            [server]
            port = 8080

            [extractor]
            kind = "tesseract"

            [ocr]
            closed_days = ["Sun"]

            [ocr.regions.Mon]
            top = 10
            left = 20
            width = 30
            height = 40
        "#).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.base_url, "http://localhost");
        assert_eq!(config.extractor.kind, ExtractorKind::Tesseract);
        assert_eq!(config.ocr.closed_days, vec![Weekday::Sun]);
        assert_eq!(config.ocr.regions.len(), 1);
        assert_eq!(config.ocr.regions[&Weekday::Mon].left, 20);
        assert_eq!(config.ocr.languages, "kor+eng");
        assert_eq!(config.server_kill_key, Some(Secret::new("bye")));
        assert_eq!(config.schedule.timezone, chrono_tz::Asia::Seoul);
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("PORT", "4000"),
            ("IMAGE_API_URL", "https://feed/posts"),
            ("GEMINI_API_KEY", "key"),
            ("MENU_EXTRACTOR", "Tesseract"),
            ("SLACK_WEBHOOK_URL", "https://hooks/slack"),
            ("DISCORD_WEBHOOK_URL", ""),
            ("TZ_NAME", "Europe/Berlin"),
        ].into_iter().collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.feed.url.as_deref(), Some("https://feed/posts"));
        assert_eq!(config.gemini.api_key, Some(Secret::new("key")));
        assert_eq!(config.extractor.kind, ExtractorKind::Tesseract);
        assert!(config.notify.discord_webhook_url.is_none());
        assert_eq!(config.schedule.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(config.server.endpoint("/api/cron/start"), "http://localhost:4000/api/cron/start");
    }

    #[test]
    fn invalid_env_is_rejected() {
        let mut config = Config::default();
        assert!(config.apply_env(|k| (k == "PORT").then(|| format!("nope"))).is_err());
        assert!(config.apply_env(|k| (k == "MENU_EXTRACTOR").then(|| format!("magic"))).is_err());
    }

    #[test]
    fn secrets_are_redacted() {
        let mut config = Config::default();
        config.gemini.api_key = Some(Secret::new("super-secret"));
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
