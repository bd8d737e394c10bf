use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dump format produced by pg_dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    /// pg_dump custom archive; supports catalog listing via pg_restore.
    Custom,
    /// Plain SQL text.
    Plain,
}

impl BackupFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            BackupFormat::Custom => "dump",
            BackupFormat::Plain => "sql",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            BackupFormat::Custom => "application/octet-stream",
            BackupFormat::Plain => "application/sql",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "dump" => Some(BackupFormat::Custom),
            "sql" => Some(BackupFormat::Plain),
            _ => None,
        }
    }
}

impl std::str::FromStr for BackupFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custom" => Ok(BackupFormat::Custom),
            "plain" => Ok(BackupFormat::Plain),
            other => Err(format!("unknown backup format: {other}")),
        }
    }
}

/// Outcome of the replication phase, carried inside the job status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationStatus {
    pub synced: bool,
    pub error: Option<String>,
}

/// Single-slot job status. One instance lives in the controller and is
/// overwritten at job start and at each phase completion. The stored
/// `running` field is a snapshot; readers get the live guard value merged in
/// by `BackupService::status`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: Option<String>,
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_status: Option<ReplicationStatus>,
}

/// An on-disk dump artifact. The filename is the only identifier; the
/// filesystem is the source of truth.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    pub filename: String,
    pub format: BackupFormat,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartBackupRequest {
    pub format: Option<BackupFormat>,
    pub compression: Option<u8>,
}

/// Status slot for the maintenance (vacuum/analyze) job.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: Option<String>,
}
