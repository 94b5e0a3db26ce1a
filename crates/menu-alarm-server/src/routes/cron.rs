use std::{sync::Arc, time::Instant};

use menu_feed_api::slack::MenuStyle;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::config::ScheduleConfig;

use super::{helpers::*, menu::MenuService};

#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("the menu schedule is already running")]
    AlreadyRunning,
    #[error("the menu schedule is not running")]
    NotRunning,
    #[error(transparent)]
    Scheduler(#[from] JobSchedulerError),
}

struct ActiveJob {
    scheduler: JobScheduler,
    job_id: Uuid,
}

/// owns the one recurring menu job, if any
#[derive(Clone)]
pub struct CronGuard {
    menu: MenuService,
    schedule: ScheduleConfig,
    active: Arc<Mutex<Option<ActiveJob>>>,
}

impl CronGuard {
    pub fn new(menu: MenuService, schedule: ScheduleConfig) -> Self {
        Self {
            menu,
            schedule,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn start(&self) -> Result<(), CronError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(CronError::AlreadyRunning);
        }

        let menu = self.menu.clone();
        let job = Job::new_async_tz(
            self.schedule.cron.as_str(),
            self.schedule.timezone,
            move |uuid, _| {
                let menu = menu.clone();
                async move {
                    tracing::info!("sending weekly menu (job: {uuid:?})");
                    let start = Instant::now();
                    match menu.send_menu(MenuStyle::Standard).await {
                        Ok(_) => {
                            let took = start.elapsed();
                            tracing::info!("sent weekly menu (took {took:?})");
                        },
                        Err(err) => tracing::error!("could not send weekly menu: {err}"),
                    }
                }.pin()
            },
        )?;
        let job_id = job.guid();

        let scheduler = register_jobs(|shed| async move {
            shed.add(job).await?;
            Ok::<_, JobSchedulerError>(shed)
        }).await?;

        tracing::info!(
            "menu schedule started ({} {})",
            self.schedule.cron, self.schedule.timezone,
        );
        *active = Some(ActiveJob { scheduler, job_id });
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), CronError> {
        let mut active = self.active.lock().await;
        let Some(mut job) = active.take() else {
            return Err(CronError::NotRunning);
        };

        match job.scheduler.shutdown().await {
            Ok(()) => {
                tracing::info!("menu schedule stopped (job: {:?})", job.job_id);
                Ok(())
            },
            Err(err) => {
                *active = Some(job);
                Err(err.into())
            },
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::menu::tests::service;
    use wiremock::MockServer;

    async fn guard() -> (CronGuard, MockServer) {
        let server = MockServer::start().await;
        let guard = CronGuard::new(service(&server, None, false), ScheduleConfig::default());
        (guard, server)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_twice_is_declined() {
        let (guard, _server) = guard().await;

        guard.start().await.unwrap();
        assert!(matches!(guard.start().await, Err(CronError::AlreadyRunning)));
        assert!(guard.is_running().await);

        guard.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_twice_is_declined() {
        let (guard, _server) = guard().await;

        assert!(matches!(guard.stop().await, Err(CronError::NotRunning)));
        guard.start().await.unwrap();
        guard.stop().await.unwrap();
        assert!(matches!(guard.stop().await, Err(CronError::NotRunning)));
        assert!(!guard.is_running().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn can_restart_after_stop() {
        let (guard, _server) = guard().await;

        guard.start().await.unwrap();
        guard.stop().await.unwrap();
        guard.start().await.unwrap();
        assert!(guard.is_running().await);

        // clones share the same job
        let other = guard.clone();
        assert!(matches!(other.start().await, Err(CronError::AlreadyRunning)));
        other.stop().await.unwrap();
        assert!(!guard.is_running().await);
    }

    #[tokio::test]
    async fn invalid_schedule_is_an_error() {
        let server = MockServer::start().await;
        let guard = CronGuard::new(service(&server, None, false), ScheduleConfig {
            cron: format!("every tuesday"),
            ..ScheduleConfig::default()
        });

        assert!(matches!(guard.start().await, Err(CronError::Scheduler(_))));
        assert!(!guard.is_running().await);
    }
}
