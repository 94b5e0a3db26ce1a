
use std::{sync::Arc, time::Duration};

use axum::{
    extract::{FromRef, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json,
    Router,
};
use menu_feed_api::{slack::MenuStyle, FeedClient};
use serde::Serialize;
use tokio::sync::Notify;

use crate::{
    config::{Config, Secret},
    extract::{self, ExtractError},
    notify::Notifier,
};

use self::{
    cron::{CronError, CronGuard},
    menu::{MenuError, MenuService},
};

mod cron;
mod helpers;
mod menu;

#[derive(Clone, FromRef)]
pub struct AppState {
    menu: MenuService,
    cron: CronGuard,
    kill: KillSwitch,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::new();

        let menu = MenuService::new(
            FeedClient::new(client.clone(), config.feed.url.clone()),
            extract::from_config(config, client.clone()),
            Notifier::new(client, config.notify.clone()),
        );
        let cron = CronGuard::new(menu.clone(), config.schedule.clone());
        let kill = KillSwitch::new(config.server_kill_key.clone());

        Self { menu, cron, kill }
    }

    /// resolves once shutdown was requested through `/server-kill`
    pub async fn kill_requested(&self) {
        self.kill.notify.notified().await
    }

    pub async fn shutdown(&self) {
        if self.cron.is_running().await {
            if let Err(err) = self.cron.stop().await {
                tracing::error!("could not stop menu schedule: {err}");
            }
        }
        self.menu.shutdown().await;
    }
}

#[derive(Clone)]
struct KillSwitch {
    key: Option<Secret>,
    notify: Arc<Notify>,
}

impl KillSwitch {
    fn new(key: Option<Secret>) -> Self {
        Self { key, notify: Arc::new(Notify::new()) }
    }

    fn allows(&self, key: Option<&str>) -> bool {
        match (&self.key, key) {
            (Some(valid), Some(key)) => !valid.expose().is_empty() && valid.expose() == key,
            _ => false,
        }
    }
}

pub fn make_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/server-kill", get(server_kill))
        .nest("/api/cron", Router::new()
            .route("/start", get(cron_start))
            .route("/stop", get(cron_stop)))
        .nest("/api/menu", Router::new()
            .route("/weekly-menu", get(weekly_menu))
            .route("/send-menu-to-slack", get(send_menu_to_slack))
            .route("/send-markdown-menu-to-slack", get(send_markdown_menu_to_slack)))
        .fallback(fallback)
        .layer(middleware::from_fn(log_requests))
    .with_state(state)
}

async fn log_requests(req: Request, next: Next) -> Response {
    tracing::info!("{} {}", req.method(), req.uri());
    next.run(req).await
}

async fn index() -> &'static str {
    "식단표 이미지 OCR 메뉴 알람 서버가 실행 중입니다."
}

async fn fallback() -> (StatusCode, &'static str) {
    tracing::info!("no route found");
    (StatusCode::NOT_FOUND, "요청한 경로를 찾을 수 없습니다.")
}

#[derive(Debug, serde::Deserialize)]
struct KillQuery {
    key: Option<String>,
}

async fn server_kill(
    Query(q): Query<KillQuery>,
    State(kill): State<KillSwitch>,
) -> (StatusCode, &'static str) {
    if !kill.allows(q.key.as_deref()) {
        tracing::warn!("rejected shutdown request");
        return (StatusCode::FORBIDDEN, "서버 종료 권한이 없습니다.");
    }

    tracing::info!("shutdown requested");
    // give the response a moment to go out
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        kill.notify.notify_one();
    });

    (StatusCode::OK, "서버를 종료합니다...")
}

#[derive(Debug, Serialize)]
struct CronResponse {
    message: &'static str,
}

fn cron_response(status: StatusCode, message: &'static str) -> (StatusCode, Json<CronResponse>) {
    (status, Json(CronResponse { message }))
}

async fn cron_start(State(cron): State<CronGuard>) -> (StatusCode, Json<CronResponse>) {
    match cron.start().await {
        Ok(()) => cron_response(StatusCode::OK, "cron 스케줄러가 시작되었습니다."),
        Err(CronError::AlreadyRunning) => {
            cron_response(StatusCode::BAD_REQUEST, "이미 cron 스케줄러가 동작 중입니다.")
        },
        Err(err) => {
            tracing::error!("could not start menu schedule: {err}");
            cron_response(StatusCode::INTERNAL_SERVER_ERROR, "cron 스케줄러 시작 중 오류가 발생했습니다.")
        },
    }
}

async fn cron_stop(State(cron): State<CronGuard>) -> (StatusCode, Json<CronResponse>) {
    match cron.stop().await {
        Ok(()) => cron_response(StatusCode::OK, "cron 스케줄러가 멈추었습니다."),
        Err(CronError::NotRunning) => {
            cron_response(StatusCode::BAD_REQUEST, "cron 스케줄러가 동작하지 않고 있습니다.")
        },
        Err(err) => {
            tracing::error!("could not stop menu schedule: {err}");
            cron_response(StatusCode::INTERNAL_SERVER_ERROR, "cron 스케줄러 중지 중 오류가 발생했습니다.")
        },
    }
}

#[derive(Debug, Serialize)]
struct MenuResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl IntoResponse for MenuError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            MenuError::NotFound => (StatusCode::NOT_FOUND, "주간 메뉴를 찾을 수 없습니다."),
            MenuError::AnalysisMissing | MenuError::Extract(ExtractError::EmptyResponse) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "메뉴 분석에 실패했습니다.")
            },
            MenuError::DeliveryFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Slack으로 메뉴 전송에 실패했습니다.")
            },
            MenuError::Feed(_) | MenuError::Extract(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "서버 오류가 발생했습니다.")
            },
        };

        if status.is_server_error() {
            tracing::error!("menu request failed: {self}");
        }

        (status, Json(MenuResponse::<()> {
            success: false,
            message: Some(message),
            data: None,
        })).into_response()
    }
}

async fn weekly_menu(
    State(menu): State<MenuService>,
) -> Result<Json<MenuResponse<menu::WeeklyMenuReport>>, MenuError> {
    let report = menu.weekly_menu().await?;
    Ok(Json(MenuResponse {
        success: true,
        message: None,
        data: Some(report),
    }))
}

#[derive(Debug, serde::Deserialize)]
struct SendQuery {
    format: Option<String>,
}

async fn send_menu(
    menu: &MenuService, style: MenuStyle,
) -> Result<Json<MenuResponse<menu::SentMenu>>, MenuError> {
    let sent = menu.send_menu(style).await?;
    Ok(Json(MenuResponse {
        success: true,
        message: Some("메뉴가 Slack으로 성공적으로 전송되었습니다."),
        data: Some(sent),
    }))
}

async fn send_menu_to_slack(
    Query(q): Query<SendQuery>,
    State(menu): State<MenuService>,
) -> Result<Json<MenuResponse<menu::SentMenu>>, MenuError> {
    send_menu(&menu, MenuStyle::from_query(q.format.as_deref())).await
}

async fn send_markdown_menu_to_slack(
    State(menu): State<MenuService>,
) -> Result<Json<MenuResponse<menu::SentMenu>>, MenuError> {
    send_menu(&menu, MenuStyle::Markdown).await
}
