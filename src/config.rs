use crate::models::backup::BackupFormat;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub schema: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub prefix: String,
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub backup_dir: PathBuf,
    pub backup_prefix: String,
    pub default_format: BackupFormat,
    pub default_compression: u8,
    pub operation_timeout: Duration,
    pub retention_days: u32,
    pub max_backups: usize,
    pub retention_async: bool,
    pub backup_schedule: Option<String>,
    pub maintenance_schedule: Option<String>,
    pub schedule_timezone: String,
    pub remote: Option<RemoteConfig>,
    pub pg_dump_bin: String,
    pub pg_restore_bin: String,
    pub vacuumdb_bin: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let remote = env_opt("S3_BUCKET").map(|bucket| RemoteConfig {
            bucket,
            region: env_or("S3_REGION", "us-east-1"),
            endpoint: env_opt("S3_ENDPOINT"),
            access_key_id: env_opt("S3_ACCESS_KEY_ID"),
            secret_access_key: env_opt("S3_SECRET_ACCESS_KEY"),
            prefix: env_or("S3_PREFIX", "backups"),
            force_path_style: env_parse("S3_FORCE_PATH_STYLE", false),
        });

        Self {
            port: env_parse("PORT", 3000),
            log_level: env_or("LOG_LEVEL", "info"),
            database: DatabaseConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_parse("DB_PORT", 5432),
                user: env_or("DB_USER", "radiodb"),
                password: env_or("DB_PASSWORD", ""),
                dbname: env_or("DB_NAME", "radiodb"),
                schema: env_opt("DB_SCHEMA"),
            },
            backup_dir: PathBuf::from(env_or("BACKUP_DIR", "/var/lib/radio-admin/backups")),
            backup_prefix: env_or("BACKUP_PREFIX", "radiodb"),
            default_format: env_or("BACKUP_FORMAT", "custom")
                .parse()
                .unwrap_or(BackupFormat::Custom),
            default_compression: env_parse("BACKUP_COMPRESSION", 6),
            operation_timeout: Duration::from_secs(env_parse("BACKUP_TIMEOUT_SECS", 600)),
            retention_days: env_parse("RETENTION_DAYS", 30),
            max_backups: env_parse("MAX_BACKUPS", 10),
            retention_async: env_parse("RETENTION_ASYNC", false),
            backup_schedule: env_opt("BACKUP_SCHEDULE"),
            maintenance_schedule: env_opt("MAINTENANCE_SCHEDULE"),
            schedule_timezone: env_or("SCHEDULE_TIMEZONE", "UTC"),
            remote,
            pg_dump_bin: env_or("PG_DUMP_BIN", "pg_dump"),
            pg_restore_bin: env_or("PG_RESTORE_BIN", "pg_restore"),
            vacuumdb_bin: env_or("VACUUMDB_BIN", "vacuumdb"),
        }
    }
}
