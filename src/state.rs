use crate::config::AppConfig;
use crate::error::AppError;
use crate::services::backup::BackupService;
use crate::services::maintenance::MaintenanceService;
use crate::services::remote::RemoteStore;
use crate::services::store::BackupDir;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub struct AppState {
    pub config: AppConfig,
    pub backup: BackupService,
    pub maintenance: MaintenanceService,
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        tasks: TaskTracker,
        cancel: CancellationToken,
        remote: Option<Arc<RemoteStore>>,
    ) -> Result<Self, AppError> {
        let dir = BackupDir::open(&config.backup_dir, &config.backup_prefix)?;
        let backup = BackupService::new(
            config.clone(),
            dir,
            remote,
            tasks.clone(),
            cancel.clone(),
        );
        let maintenance = MaintenanceService::new(config.clone(), tasks.clone(), cancel);
        Ok(Self {
            config,
            backup,
            maintenance,
            tasks,
        })
    }
}
