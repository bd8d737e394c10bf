use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::backup::{
    BackupFile, BackupFormat, BackupStatus, ReplicationStatus, StartBackupRequest,
};
use crate::services::remote::RemoteStore;
use crate::services::store::BackupDir;
use crate::services::{dump, retention, verify};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Releases the single-flight flag on drop, so every exit path out of a job
/// (including panic or cancellation) releases the gate exactly once.
struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
struct JobParams {
    format: BackupFormat,
    compression: u8,
}

/// Backup job lifecycle controller. At most one job runs at a time, gated by
/// a lock-free flag; the status slot is a separate mutex-guarded record so
/// status reads never contend with the exclusivity check.
#[derive(Clone)]
pub struct BackupService {
    config: Arc<AppConfig>,
    dir: BackupDir,
    remote: Option<Arc<RemoteStore>>,
    inflight: Arc<AtomicBool>,
    status: Arc<RwLock<BackupStatus>>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl BackupService {
    pub fn new(
        config: AppConfig,
        dir: BackupDir,
        remote: Option<Arc<RemoteStore>>,
        tasks: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dir,
            remote,
            inflight: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(BackupStatus::default())),
            tasks,
            cancel,
        }
    }

    pub(crate) fn config(&self) -> &AppConfig {
        &self.config
    }

    pub(crate) fn dir(&self) -> &BackupDir {
        &self.dir
    }

    /// The single source of truth for "is a job running".
    pub fn is_running(&self) -> bool {
        self.inflight.load(Ordering::Acquire)
    }

    /// Consistent snapshot of the job status. The live guard value is merged
    /// in; the stored `running` field is never trusted in isolation.
    pub async fn status(&self) -> BackupStatus {
        let mut snapshot = self.status.read().await.clone();
        snapshot.running = self.inflight.load(Ordering::Acquire);
        snapshot
    }

    /// Begins a backup job and returns once validation and the exclusivity
    /// check pass; the job itself runs on a background task and its outcome
    /// is observable only through `status`.
    pub async fn start(&self, req: StartBackupRequest) -> Result<(), AppError> {
        let guard = self.try_begin()?;
        self.begin_status().await;
        let params = match self.validate_request(&req) {
            Ok(params) => params,
            Err(e) => {
                self.finish(Some(e.to_string())).await;
                return Err(e);
            }
        };

        let svc = self.clone();
        self.tasks.spawn(async move {
            // Failures are recorded in the status slot, not propagated.
            let _ = svc.run_job(guard, params).await;
        });
        Ok(())
    }

    /// Runs a backup job to completion on the caller's task. Used by the
    /// scheduler, which expects to block for the full duration.
    pub async fn run(&self, req: StartBackupRequest) -> Result<(), AppError> {
        let guard = self.try_begin()?;
        self.begin_status().await;
        let params = match self.validate_request(&req) {
            Ok(params) => params,
            Err(e) => {
                self.finish(Some(e.to_string())).await;
                return Err(e);
            }
        };
        self.run_job(guard, params).await
    }

    fn try_begin(&self) -> Result<FlightGuard, AppError> {
        if self
            .inflight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::Conflict("a backup job is already running".into()));
        }
        Ok(FlightGuard {
            flag: Arc::clone(&self.inflight),
        })
    }

    fn validate_request(&self, req: &StartBackupRequest) -> Result<JobParams, AppError> {
        let format = req.format.unwrap_or(self.config.default_format);
        let compression = req.compression.unwrap_or(self.config.default_compression);
        if compression > 9 {
            return Err(AppError::Validation(format!(
                "compression level must be between 0 and 9, got {compression}"
            )));
        }
        Ok(JobParams {
            format,
            compression,
        })
    }

    /// Resets the status slot at job start. Runs before any fallible step so
    /// a concurrent `status` call always sees `running` with a start time.
    async fn begin_status(&self) {
        let mut status = self.status.write().await;
        *status = BackupStatus {
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

    async fn run_job(&self, guard: FlightGuard, params: JobParams) -> Result<(), AppError> {
        let filename = self.dir.next_filename(params.format);
        let path = self.dir.root().join(&filename);

        // Recorded before the dump completes so callers can correlate a
        // still-running job to its eventual file.
        {
            let mut status = self.status.write().await;
            status.filename = Some(filename.clone());
        }
        tracing::info!(filename = %filename, format = ?params.format, "Starting database backup");

        let dump_out = match dump::run(
            &self.config.pg_dump_bin,
            &self.config.database,
            &path,
            params.format,
            params.compression,
            self.config.operation_timeout,
            &self.cancel,
        )
        .await
        {
            Ok(out) => out,
            Err(e) => {
                let msg = e.to_string();
                self.finish(Some(msg.clone())).await;
                tracing::error!(filename = %filename, error = %msg, "Database backup failed");
                return Err(AppError::Operation(msg));
            }
        };

        if let Err(e) = verify::validate(
            &path,
            params.format,
            &self.config.pg_restore_bin,
            self.config.operation_timeout,
            &self.cancel,
        )
        .await
        {
            self.dir.remove_partial(&filename).await;
            let msg = e.to_string();
            self.finish(Some(msg.clone())).await;
            tracing::error!(filename = %filename, error = %msg, "Backup failed verification");
            return Err(AppError::Operation(msg));
        }

        self.finish(None).await;
        tracing::info!(
            filename = %filename,
            size_bytes = dump_out.size_bytes,
            elapsed_ms = dump_out.elapsed.as_millis() as u64,
            "Database backup completed"
        );

        // Replication never blocks job completion.
        if let Some(remote) = &self.remote {
            let remote = Arc::clone(remote);
            let status = Arc::clone(&self.status);
            let filename = filename.clone();
            let path = path.clone();
            self.tasks.spawn(async move {
                let result = remote.upload(&filename, &path).await;
                let mut status = status.write().await;
                match result {
                    Ok(()) => {
                        status.replication_status = Some(ReplicationStatus {
                            synced: true,
                            error: None,
                        })
                    }
                    Err(e) => {
                        tracing::warn!(filename = %filename, error = %e, "Remote replication failed");
                        status.replication_status = Some(ReplicationStatus {
                            synced: false,
                            error: Some(e.to_string()),
                        });
                    }
                }
            });
        }

        if self.config.retention_async {
            let svc = self.clone();
            self.tasks.spawn(async move {
                retention::cleanup(&svc).await;
            });
        } else {
            retention::cleanup(self).await;
        }

        drop(guard);
        Ok(())
    }

    /// The filename the active job is currently writing, if any. Catalog
    /// operations must not observe a file until its job has recorded success.
    async fn active_filename(&self) -> Option<String> {
        if !self.inflight.load(Ordering::Acquire) {
            return None;
        }
        let status = self.status.read().await;
        if status.success {
            None
        } else {
            status.filename.clone()
        }
    }

    /// Lists completed backups, newest first.
    pub async fn list(&self) -> Result<Vec<BackupFile>, AppError> {
        let mut files = self.dir.list().await?;
        if let Some(active) = self.active_filename().await {
            files.retain(|f| f.filename != active);
        }
        Ok(files)
    }

    /// Resolves a backup for download.
    pub async fn open_download(&self, name: &str) -> Result<(BackupFile, PathBuf), AppError> {
        if self.active_filename().await.as_deref() == Some(name) {
            return Err(AppError::NotFound(format!("backup {name} not found")));
        }
        let info = self.dir.stat(name).await?;
        let path = self.dir.resolve(name)?;
        Ok((info, path))
    }

    /// Deletes a backup. This is the single delete primitive shared by the
    /// retention passes and explicit user deletion; the matching remote copy
    /// is removed as a best-effort background action.
    pub async fn delete(&self, name: &str) -> Result<(), AppError> {
        if self.active_filename().await.as_deref() == Some(name) {
            return Err(AppError::Conflict(format!(
                "backup {name} is currently being written"
            )));
        }
        self.dir.delete(name).await?;
        tracing::info!(filename = %name, "Deleted backup");

        if let Some(remote) = &self.remote {
            let remote = Arc::clone(remote);
            let name = name.to_string();
            self.tasks.spawn(async move {
                if let Err(e) = remote.delete(&name).await {
                    tracing::warn!(filename = %name, error = %e, "Failed to remove replicated backup");
                }
            });
        }
        Ok(())
    }
}
