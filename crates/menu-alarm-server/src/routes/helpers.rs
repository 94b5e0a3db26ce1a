use std::{future::Future, pin::Pin};

use tokio_cron_scheduler::{JobScheduler, JobSchedulerError};

pub trait Pinable: Sized {
    fn pin(self) -> Pin<Box<Self>> { Box::pin(self) }
}

impl<F: Future> Pinable for F {}

/// creates a scheduler, lets `reg` add its jobs and starts it
pub async fn register_jobs<F>(
    reg: impl FnOnce(JobScheduler) -> F,
) -> Result<JobScheduler, JobSchedulerError>
    where F: Future<Output = Result<JobScheduler, JobSchedulerError>>
{
    tracing::info!("starting cron job");
    let shed = JobScheduler::new().await?;
    let shed = reg(shed).await?;
    shed.start().await?;

    tracing::info!("started cron job");
    Ok(shed)
}
