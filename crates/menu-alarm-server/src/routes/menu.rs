use std::sync::Arc;

use menu_feed_api::{slack::{self, MenuStyle}, FeedClient, FeedError, PostItem};
use serde::Serialize;

use crate::{extract::{ExtractError, MenuExtractor}, notify::Notifier};

#[derive(Debug, thiserror::Error)]
pub enum MenuError {
    #[error("no weekly menu post found")]
    NotFound,
    #[error("menu analysis came back empty")]
    AnalysisMissing,
    #[error("menu could not be delivered")]
    DeliveryFailed,
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyMenuReport {
    pub menu_info: PostItem,
    /// `None` if there is no menu today
    pub analysis: Option<String>,
    #[serde(skip)]
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMenu {
    pub menu_info: PostItem,
    pub analysis: String,
    pub format: MenuStyle,
}

/// fetch -> extract -> format -> notify
#[derive(Clone)]
pub struct MenuService {
    feed: FeedClient,
    extractor: Arc<dyn MenuExtractor>,
    notifier: Notifier,
}

impl MenuService {
    pub fn new(
        feed: FeedClient,
        extractor: Arc<dyn MenuExtractor>,
        notifier: Notifier,
    ) -> Self {
        Self { feed, extractor, notifier }
    }

    pub async fn weekly_menu(&self) -> Result<WeeklyMenuReport, MenuError> {
        let Some(post) = self.feed.fetch_latest_weekly_menu(None).await? else {
            tracing::info!("feed has no weekly menu post");
            return Err(MenuError::NotFound);
        };

        let Some(image_url) = post.menu_image_url().map(ToOwned::to_owned) else {
            tracing::info!("weekly menu post {} has no image", post.id);
            return Err(MenuError::NotFound);
        };
        tracing::info!("found weekly menu post {} ({})", post.id, post.title);

        let analysis = self.extractor.extract(&image_url).await?
        .filter(|v| !v.trim().is_empty());

        Ok(WeeklyMenuReport { menu_info: post, analysis, image_url })
    }

    pub async fn send_menu(&self, style: MenuStyle) -> Result<SentMenu, MenuError> {
        let report = self.weekly_menu().await?;
        let Some(analysis) = report.analysis else {
            return Err(MenuError::AnalysisMissing);
        };

        let message = slack::to_slack_message(&analysis, &report.image_url, style);
        let notification = slack::to_notification(&analysis, &report.image_url);

        if !self.notifier.send_menu(&message, &notification).await {
            return Err(MenuError::DeliveryFailed);
        }

        Ok(SentMenu {
            menu_info: report.menu_info,
            analysis,
            format: style,
        })
    }

    pub async fn shutdown(&self) {
        self.extractor.shutdown().await;
    }
}
