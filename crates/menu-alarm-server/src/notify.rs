use std::fmt;

use menu_feed_api::slack::{self, Notification, SlackMessage};
use serde::Serialize;

use crate::config::{NotifyConfig, Secret};

/// discord rejects longer embed descriptions
const DISCORD_DESCRIPTION_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Messenger {
    Slack,
    Discord,
}

impl fmt::Display for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Messenger::Slack => f.write_str("slack"),
            Messenger::Discord => f.write_str("discord"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("no {0} webhook url configured")]
    MissingWebhook(Messenger),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl Notifier {
    pub fn new(client: reqwest::Client, config: NotifyConfig) -> Self {
        Self { client, config }
    }

    fn webhook(&self, messenger: Messenger) -> Result<&Secret, NotifyError> {
        let url = match messenger {
            Messenger::Slack => &self.config.slack_webhook_url,
            Messenger::Discord => &self.config.discord_webhook_url,
        };
        url.as_ref().ok_or(NotifyError::MissingWebhook(messenger))
    }

    async fn post(&self, messenger: Messenger, payload: &impl Serialize) -> Result<(), NotifyError> {
        let url = self.webhook(messenger)?;
        self.client.post(url.expose())
            .json(payload)
            .send().await?
        .error_for_status()?;

        tracing::info!("delivered message to {messenger}");
        Ok(())
    }

    pub async fn try_send_slack(&self, message: &SlackMessage) -> Result<(), NotifyError> {
        self.post(Messenger::Slack, message).await
    }

    pub async fn try_send_discord(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.post(Messenger::Discord, &DiscordNotification::from(notification)).await
    }

    /// the result only reflects slack, the discord mirror is best effort
    pub async fn try_send_menu(
        &self, message: &SlackMessage, notification: &Notification,
    ) -> Result<(), NotifyError> {
        self.try_send_slack(message).await?;

        if self.config.discord_webhook_url.is_some() {
            if let Err(err) = self.try_send_discord(notification).await {
                tracing::warn!("could not mirror menu to discord: {err}");
            }
        }
        Ok(())
    }

    pub async fn send_menu(&self, message: &SlackMessage, notification: &Notification) -> bool {
        log_result(self.try_send_menu(message, notification).await)
    }
}

fn log_result(res: Result<(), NotifyError>) -> bool {
    match res {
        Ok(()) => true,
        Err(err) => {
            tracing::error!("could not send notification: {err}");
            false
        },
    }
}

#[derive(Serialize)]
struct DiscordNotification {
    embeds: [DiscordEmbed; 1],
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl From<&Notification> for DiscordNotification {
    fn from(v: &Notification) -> Self {
        Self {
            embeds: [DiscordEmbed {
                title: v.title.clone(),
                description: slack::truncate(&v.message, DISCORD_DESCRIPTION_LIMIT),
                color: parse_color(v.color.as_deref().unwrap_or(slack::MENU_COLOR)),
                url: v.url.clone(),
            }],
        }
    }
}

fn parse_color(color: &str) -> u32 {
    u32::from_str_radix(color.trim_start_matches('#'), 16).unwrap_or(0x36a64f)
}
