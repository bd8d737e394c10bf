use crate::config::DatabaseConfig;
use crate::models::backup::BackupFormat;
use crate::services::process::{diagnostic_output, run_with_deadline, ProcessOutcome};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Classified dump failure. Decided once here; callers never inspect tool
/// output text to figure out what happened.
#[derive(thiserror::Error, Debug)]
pub enum DumpError {
    #[error("pg_dump timed out after {0:?}")]
    TimedOut(Duration),

    #[error("backup cancelled while pg_dump was running")]
    Cancelled,

    #[error("pg_dump exited with {code}: {stderr}")]
    Tool { code: String, stderr: String },

    #[error("failed to start pg_dump ({bin}): {source}")]
    Spawn {
        bin: String,
        source: std::io::Error,
    },

    #[error("dump file disappeared after creation: {0}")]
    Stat(std::io::Error),
}

#[derive(Debug)]
pub struct DumpOutput {
    pub size_bytes: u64,
    pub elapsed: Duration,
}

/// Builds the fixed pg_dump argument list. The password is deliberately not
/// part of it; it travels through `PGPASSWORD` in the child environment.
fn dump_args(
    db: &DatabaseConfig,
    target: &Path,
    format: BackupFormat,
    compression: u8,
) -> Vec<String> {
    let mut args = vec![
        "-h".into(),
        db.host.clone(),
        "-p".into(),
        db.port.to_string(),
        "-U".into(),
        db.user.clone(),
        "-d".into(),
        db.dbname.clone(),
    ];
    if let Some(schema) = &db.schema {
        args.push("-n".into());
        args.push(schema.clone());
    }
    match format {
        BackupFormat::Custom => {
            args.push("--format=c".into());
            args.push(format!("--compress={compression}"));
        }
        BackupFormat::Plain => args.push("--format=p".into()),
    }
    args.push("-w".into());
    args.push("-f".into());
    args.push(target.to_string_lossy().into_owned());
    args
}

/// Invokes pg_dump against `target` under a deadline. On any failure the
/// partial output file is removed (tolerating "file does not exist") before
/// the classified error is returned. On success the produced file is stated
/// and its permissions tightened to owner read/write.
pub async fn run(
    bin: &str,
    db: &DatabaseConfig,
    target: &Path,
    format: BackupFormat,
    compression: u8,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<DumpOutput, DumpError> {
    let started = std::time::Instant::now();

    let mut cmd = tokio::process::Command::new(bin);
    cmd.args(dump_args(db, target, format, compression));
    cmd.env("PGPASSWORD", &db.password);

    let outcome = match run_with_deadline(cmd, deadline, cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            remove_partial(target).await;
            return Err(DumpError::Spawn {
                bin: bin.to_string(),
                source: e,
            });
        }
    };

    let output = match outcome {
        ProcessOutcome::Completed(output) => output,
        ProcessOutcome::TimedOut => {
            remove_partial(target).await;
            return Err(DumpError::TimedOut(deadline));
        }
        ProcessOutcome::Cancelled => {
            remove_partial(target).await;
            return Err(DumpError::Cancelled);
        }
    };

    if !output.status.success() {
        remove_partial(target).await;
        let code = output
            .status
            .code()
            .map(|c| format!("status {c}"))
            .unwrap_or_else(|| "signal".to_string());
        return Err(DumpError::Tool {
            code,
            stderr: diagnostic_output(&output),
        });
    }

    let meta = tokio::fs::metadata(target).await.map_err(DumpError::Stat)?;
    if let Err(e) =
        tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(0o600)).await
    {
        tracing::warn!(path = %target.display(), error = %e, "Failed to tighten dump file permissions");
    }

    Ok(DumpOutput {
        size_bytes: meta.len(),
        elapsed: started.elapsed(),
    })
}

async fn remove_partial(target: &Path) {
    match tokio::fs::remove_file(target).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %target.display(), error = %e, "Failed to remove partial dump file"),
    }
}
