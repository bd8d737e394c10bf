use crate::models::backup::StartBackupRequest;
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Cron-driven triggers for the backup and maintenance jobs. A tick is
/// skipped entirely when a job of that kind is already running; there is no
/// queuing or backlog. Triggered jobs run on the shared task tracker, so
/// shutdown drains any in-flight run before the process exits.
pub struct AdminScheduler {
    scheduler: Mutex<JobScheduler>,
    state: Arc<AppState>,
}

impl AdminScheduler {
    pub async fn new(state: Arc<AppState>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            state,
        })
    }

    pub async fn init_schedules(&self) -> anyhow::Result<()> {
        let tz: chrono_tz::Tz = self
            .state
            .config
            .schedule_timezone
            .parse()
            .map_err(|_| {
                anyhow::anyhow!(
                    "invalid schedule timezone: {}",
                    self.state.config.schedule_timezone
                )
            })?;

        if let Some(expr) = &self.state.config.backup_schedule {
            let state = self.state.clone();
            let job = Job::new_async_tz(expr.as_str(), tz, move |_uuid, _lock| {
                let state = state.clone();
                Box::pin(async move {
                    if state.backup.is_running() {
                        tracing::warn!("Skipping scheduled backup: a job is already running");
                        return;
                    }
                    let svc = state.backup.clone();
                    let handle = state
                        .tasks
                        .spawn(async move { svc.run(StartBackupRequest::default()).await });
                    match handle.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::error!(error = %e, "Scheduled backup failed"),
                        Err(e) => tracing::error!(error = %e, "Scheduled backup task panicked"),
                    }
                })
            })?;
            self.scheduler.lock().await.add(job).await?;
            tracing::info!(cron = %expr, timezone = %tz, "Backup schedule registered");
        }

        if let Some(expr) = &self.state.config.maintenance_schedule {
            let state = self.state.clone();
            let job = Job::new_async_tz(expr.as_str(), tz, move |_uuid, _lock| {
                let state = state.clone();
                Box::pin(async move {
                    if state.maintenance.is_running() {
                        tracing::warn!(
                            "Skipping scheduled maintenance: a job is already running"
                        );
                        return;
                    }
                    let svc = state.maintenance.clone();
                    let handle = state.tasks.spawn(async move { svc.run().await });
                    match handle.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::error!(error = %e, "Scheduled maintenance failed"),
                        Err(e) => {
                            tracing::error!(error = %e, "Scheduled maintenance task panicked")
                        }
                    }
                })
            })?;
            self.scheduler.lock().await.add(job).await?;
            tracing::info!(cron = %expr, timezone = %tz, "Maintenance schedule registered");
        }

        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}
