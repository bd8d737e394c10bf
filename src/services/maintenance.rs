use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::backup::MaintenanceStatus;
use crate::services::process::{diagnostic_output, run_with_deadline, ProcessOutcome};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Runs `vacuumdb --analyze` against the database. Single-flight, with its
/// own guard independent of the backup controller's.
#[derive(Clone)]
pub struct MaintenanceService {
    config: Arc<AppConfig>,
    inflight: Arc<AtomicBool>,
    status: Arc<RwLock<MaintenanceStatus>>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

struct MaintenanceGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl MaintenanceService {
    pub fn new(config: AppConfig, tasks: TaskTracker, cancel: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            inflight: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(MaintenanceStatus::default())),
            tasks,
            cancel,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inflight.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> MaintenanceStatus {
        let mut snapshot = self.status.read().await.clone();
        snapshot.running = self.inflight.load(Ordering::Acquire);
        snapshot
    }

    /// Begins a maintenance run on a background task.
    pub async fn start(&self) -> Result<(), AppError> {
        let guard = self.acquire()?;
        self.begin_status().await;
        let svc = self.clone();
        self.tasks.spawn(async move {
            let _ = svc.run_locked(guard).await;
        });
        Ok(())
    }

    /// Runs maintenance to completion on the caller's task (scheduler path).
    pub async fn run(&self) -> Result<(), AppError> {
        let guard = self.acquire()?;
        self.begin_status().await;
        self.run_locked(guard).await
    }

    fn acquire(&self) -> Result<MaintenanceGuard, AppError> {
        if self
            .inflight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::Conflict(
                "a maintenance job is already running".into(),
            ));
        }
        Ok(MaintenanceGuard {
            flag: Arc::clone(&self.inflight),
        })
    }

    async fn begin_status(&self) {
        let mut status = self.status.write().await;
        *status = MaintenanceStatus {
            running: true,
            started_at: Some(Utc::now()),
            ..Default::default()
        };
    }

    async fn finish(&self, error: Option<String>) {
        let mut status = self.status.write().await;
        status.running = false;
        status.ended_at = Some(Utc::now());
        status.success = error.is_none();
        status.error = error;
    }

    async fn run_locked(&self, _guard: MaintenanceGuard) -> Result<(), AppError> {
        let db = &self.config.database;
        tracing::info!(database = %db.dbname, "Starting vacuum/analyze maintenance");

        let args: Vec<String> = vec![
            "-h".into(),
            db.host.clone(),
            "-p".into(),
            db.port.to_string(),
            "-U".into(),
            db.user.clone(),
            "-d".into(),
            db.dbname.clone(),
            "--analyze".into(),
            "-w".into(),
        ];
        let mut cmd = tokio::process::Command::new(&self.config.vacuumdb_bin);
        cmd.args(&args);
        cmd.env("PGPASSWORD", &db.password);

        let outcome =
            match run_with_deadline(cmd, self.config.operation_timeout, &self.cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let msg = format!(
                        "failed to start vacuumdb ({}): {e}",
                        self.config.vacuumdb_bin
                    );
                    self.finish(Some(msg.clone())).await;
                    return Err(AppError::Operation(msg));
                }
            };

        let error = match outcome {
            ProcessOutcome::Completed(output) if output.status.success() => None,
            ProcessOutcome::Completed(output) => Some(format!(
                "vacuumdb failed: {}",
                diagnostic_output(&output)
            )),
            ProcessOutcome::TimedOut => Some(format!(
                "vacuumdb timed out after {:?}",
                self.config.operation_timeout
            )),
            ProcessOutcome::Cancelled => Some("maintenance cancelled".to_string()),
        };

        match error {
            None => {
                self.finish(None).await;
                tracing::info!(database = %db.dbname, "Maintenance completed");
                Ok(())
            }
            Some(msg) => {
                self.finish(Some(msg.clone())).await;
                tracing::error!(database = %db.dbname, error = %msg, "Maintenance failed");
                Err(AppError::Operation(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::backup::BackupFormat;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn write_executable_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn test_service(tmp: &Path, vacuumdb: &Path) -> MaintenanceService {
        let config = AppConfig {
            port: 0,
            log_level: "info".into(),
            database: DatabaseConfig {
                host: "localhost".into(),
                port: 5432,
                user: "radiodb".into(),
                password: "pw".into(),
                dbname: "radiodb".into(),
                schema: None,
            },
            backup_dir: tmp.join("backups"),
            backup_prefix: "radiodb".into(),
            default_format: BackupFormat::Plain,
            default_compression: 0,
            operation_timeout: Duration::from_secs(5),
            retention_days: 0,
            max_backups: 0,
            retention_async: false,
            backup_schedule: None,
            maintenance_schedule: None,
            schedule_timezone: "UTC".into(),
            remote: None,
            pg_dump_bin: "pg_dump".into(),
            pg_restore_bin: "pg_restore".into(),
            vacuumdb_bin: vacuumdb.to_string_lossy().into_owned(),
        };
        MaintenanceService::new(config, TaskTracker::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn successful_run_records_success() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_executable_script(tmp.path(), "vacuumdb", "#!/bin/sh\nexit 0\n");
        let svc = test_service(tmp.path(), &script);

        svc.run().await.unwrap();
        let status = svc.status().await;
        assert!(!status.running);
        assert!(status.success);
    }

    #[tokio::test]
    async fn failure_is_recorded_with_the_tool_diagnostic() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_executable_script(
            tmp.path(),
            "vacuumdb",
            "#!/bin/sh\necho 'could not connect to server' >&2\nexit 2\n",
        );
        let svc = test_service(tmp.path(), &script);

        let err = svc.run().await.unwrap_err();
        assert!(matches!(err, AppError::Operation(_)));
        let status = svc.status().await;
        assert!(!status.success);
        assert!(status.error.unwrap().contains("could not connect"));
    }

    #[tokio::test]
    async fn concurrent_runs_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_executable_script(tmp.path(), "vacuumdb", "#!/bin/sh\nsleep 0.5\n");
        let svc = test_service(tmp.path(), &script);

        svc.start().await.unwrap();
        let err = svc.run().await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
