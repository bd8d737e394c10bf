use crate::error::AppError;
use crate::models::backup::{BackupFile, BackupFormat};
use chrono::{DateTime, Utc};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Root handle for the backup directory. Every filename is validated before
/// any path is formed, and all filesystem operations on dump files funnel
/// through this handle, so nothing can resolve outside the directory.
#[derive(Debug, Clone)]
pub struct BackupDir {
    root: PathBuf,
    prefix: String,
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl BackupDir {
    /// Opens (creating if needed) the backup directory and canonicalizes it.
    pub fn open(root: &Path, prefix: &str) -> Result<Self, AppError> {
        if prefix.is_empty() || !prefix.chars().all(is_safe_char) {
            return Err(AppError::Configuration(format!(
                "invalid backup filename prefix: {prefix:?}"
            )));
        }
        std::fs::create_dir_all(root).map_err(|e| {
            AppError::Configuration(format!("backup directory {} is not usable: {e}", root.display()))
        })?;
        std::fs::set_permissions(root, std::fs::Permissions::from_mode(0o750)).map_err(|e| {
            AppError::Configuration(format!(
                "cannot set permissions on backup directory {}: {e}",
                root.display()
            ))
        })?;
        let root = root.canonicalize().map_err(|e| {
            AppError::Configuration(format!("backup directory {} is not usable: {e}", root.display()))
        })?;
        Ok(Self {
            root,
            prefix: prefix.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generates the filename for a new dump: `<prefix>-<YYYY-MM-DD-HHMMSS>.<ext>`.
    pub fn next_filename(&self, format: BackupFormat) -> String {
        let stamp = chrono::Local::now().format("%Y-%m-%d-%H%M%S");
        format!("{}-{}.{}", self.prefix, stamp, format.extension())
    }

    /// Validates a filename against the safe pattern, the required prefix and
    /// a format extension. Runs before any filesystem operation.
    pub fn validate(&self, name: &str) -> Result<BackupFormat, AppError> {
        if name.is_empty() || !name.chars().all(is_safe_char) {
            return Err(AppError::Validation(format!("invalid backup filename: {name:?}")));
        }
        if !name.starts_with(&format!("{}-", self.prefix)) {
            return Err(AppError::Validation(format!(
                "backup filename must start with \"{}-\": {name:?}",
                self.prefix
            )));
        }
        let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        BackupFormat::from_extension(ext).ok_or_else(|| {
            AppError::Validation(format!("backup filename has an unknown extension: {name:?}"))
        })
    }

    /// Validates the name and resolves it inside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, AppError> {
        self.validate(name)?;
        Ok(self.root.join(name))
    }

    /// Lists dump files, newest first. Entries not matching the naming rules
    /// are ignored.
    pub async fn list(&self) -> Result<Vec<BackupFile>, AppError> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to read backup directory: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to read backup directory: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(format) = self.validate(&name) else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let created_at: DateTime<Utc> = meta
                .modified()
                .map(Into::into)
                .unwrap_or_else(|_| Utc::now());
            files.push(BackupFile {
                filename: name,
                format,
                size_bytes: meta.len(),
                created_at,
            });
        }

        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.filename.cmp(&a.filename)));
        Ok(files)
    }

    /// Stats one dump file by name.
    pub async fn stat(&self, name: &str) -> Result<BackupFile, AppError> {
        let format = self.validate(name)?;
        let path = self.root.join(name);
        let meta = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("backup {name} not found"))
            } else {
                AppError::Internal(anyhow::anyhow!("failed to stat backup {name}: {e}"))
            }
        })?;
        let created_at: DateTime<Utc> = meta.modified().map(Into::into).unwrap_or_else(|_| Utc::now());
        Ok(BackupFile {
            filename: name.to_string(),
            format,
            size_bytes: meta.len(),
            created_at,
        })
    }

    /// Deletes one dump file by name.
    pub async fn delete(&self, name: &str) -> Result<(), AppError> {
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("backup {name} not found"))
            } else {
                AppError::Operation(format!("failed to delete backup {name}: {e}"))
            }
        })
    }

    /// Removes a partial artifact, tolerating "file does not exist".
    pub async fn remove_partial(&self, name: &str) {
        let Ok(path) = self.resolve(name) else { return };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(filename = %name, error = %e, "Failed to remove partial backup file"),
        }
    }
}
