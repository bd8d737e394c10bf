use crate::models::backup::BackupFile;
use crate::services::backup::BackupService;
use chrono::{DateTime, Duration, Utc};

/// Best-effort retention pass: deletes backups violating the age limit, then
/// re-lists and deletes those beyond the count limit. Two independent passes
/// because the count threshold is evaluated on the post-age-cleanup
/// population. Failures are logged, never raised.
pub async fn cleanup(svc: &BackupService) {
    let retention_days = svc.config().retention_days;
    let max_backups = svc.config().max_backups;

    if retention_days > 0 {
        match svc.dir().list().await {
            Ok(files) => {
                let cutoff = Utc::now() - Duration::days(retention_days as i64);
                for file in expired(&files, cutoff) {
                    match svc.delete(&file.filename).await {
                        Ok(()) => {
                            tracing::info!(filename = %file.filename, "Removed expired backup")
                        }
                        Err(e) => {
                            tracing::warn!(filename = %file.filename, error = %e, "Failed to remove expired backup")
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Retention cleanup could not list backups"),
        }
    }

    if max_backups > 0 {
        match svc.dir().list().await {
            Ok(files) => {
                for file in files.iter().skip(max_backups) {
                    match svc.delete(&file.filename).await {
                        Ok(()) => {
                            tracing::info!(filename = %file.filename, "Removed surplus backup")
                        }
                        Err(e) => {
                            tracing::warn!(filename = %file.filename, error = %e, "Failed to remove surplus backup")
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Retention cleanup could not list backups"),
        }
    }
}

fn expired(files: &[BackupFile], cutoff: DateTime<Utc>) -> Vec<&BackupFile> {
    files.iter().filter(|f| f.created_at < cutoff).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DatabaseConfig};
    use crate::models::backup::BackupFormat;
    use crate::services::store::BackupDir;
    use std::path::Path;
    use std::time::Duration as StdDuration;
    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;

    fn test_service(tmp: &Path, retention_days: u32, max_backups: usize) -> BackupService {
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
            operation_timeout: StdDuration::from_secs(5),
            retention_days,
            max_backups,
            retention_async: false,
            backup_schedule: None,
            maintenance_schedule: None,
            schedule_timezone: "UTC".into(),
            remote: None,
            pg_dump_bin: "pg_dump".into(),
            pg_restore_bin: "pg_restore".into(),
            vacuumdb_bin: "vacuumdb".into(),
        };
        let dir = BackupDir::open(&config.backup_dir, &config.backup_prefix).unwrap();
        BackupService::new(
            config,
            dir,
            None,
            TaskTracker::new(),
            CancellationToken::new(),
        )
    }

    fn seed_backups(svc: &BackupService, names: &[&str]) {
        for name in names {
            std::fs::write(svc.dir().root().join(name), b"x").unwrap();
            std::thread::sleep(StdDuration::from_millis(20));
        }
    }

    fn sample(filename: &str, age_days: i64) -> BackupFile {
        BackupFile {
            filename: filename.to_string(),
            format: BackupFormat::Plain,
            size_bytes: 1,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn expired_selects_only_files_past_the_cutoff() {
        let files = vec![
            sample("radiodb-new.sql", 1),
            sample("radiodb-old.sql", 40),
            sample("radiodb-older.sql", 90),
        ];
        let cutoff = Utc::now() - Duration::days(30);
        let picked: Vec<_> = expired(&files, cutoff)
            .into_iter()
            .map(|f| f.filename.as_str())
            .collect();
        assert_eq!(picked, vec!["radiodb-old.sql", "radiodb-older.sql"]);
    }

    #[tokio::test]
    async fn count_pass_keeps_the_newest_files() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 0, 2);
        seed_backups(
            &svc,
            &[
                "radiodb-2024-06-01-120000.sql",
                "radiodb-2024-06-02-120000.sql",
                "radiodb-2024-06-03-120000.sql",
            ],
        );

        cleanup(&svc).await;

        let remaining = svc.list().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].filename, "radiodb-2024-06-03-120000.sql");
        assert_eq!(remaining[1].filename, "radiodb-2024-06-02-120000.sql");
    }

    #[tokio::test]
    async fn disabled_limits_delete_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = test_service(tmp.path(), 0, 0);
        seed_backups(
            &svc,
            &[
                "radiodb-2024-06-01-120000.sql",
                "radiodb-2024-06-02-120000.sql",
            ],
        );

        cleanup(&svc).await;
        assert_eq!(svc.list().await.unwrap().len(), 2);
    }
}
