use crate::error::AppError;
use crate::models::backup::BackupFormat;
use crate::services::process::{diagnostic_output, run_with_deadline, ProcessOutcome};
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

const DUMP_START_MARKER: &str = "PostgreSQL database dump";
const DUMP_END_MARKER: &str = "PostgreSQL database dump complete";

/// How much of each end of a plain dump is inspected for markers.
const MARKER_WINDOW: u64 = 1024;

/// Confirms a completed dump file is structurally sound. Custom dumps get a
/// catalog listing via pg_restore; plain dumps get a header/footer marker
/// check. No semantic validation of the SQL is attempted.
pub async fn validate(
    path: &Path,
    format: BackupFormat,
    pg_restore_bin: &str,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    match format {
        BackupFormat::Custom => validate_custom(path, pg_restore_bin, deadline, cancel).await,
        BackupFormat::Plain => validate_plain(path).await,
    }
}

async fn validate_custom(
    path: &Path,
    pg_restore_bin: &str,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let mut cmd = tokio::process::Command::new(pg_restore_bin);
    cmd.arg("--list").arg(path);

    let outcome = run_with_deadline(cmd, deadline, cancel)
        .await
        .map_err(|e| AppError::Operation(format!("failed to start pg_restore ({pg_restore_bin}): {e}")))?;

    match outcome {
        ProcessOutcome::Completed(output) if output.status.success() => Ok(()),
        ProcessOutcome::Completed(output) => Err(AppError::Operation(format!(
            "backup verification failed: {}",
            diagnostic_output(&output)
        ))),
        ProcessOutcome::TimedOut => Err(AppError::Operation(format!(
            "backup verification timed out after {deadline:?}"
        ))),
        ProcessOutcome::Cancelled => Err(AppError::Operation(
            "backup verification cancelled".to_string(),
        )),
    }
}

async fn validate_plain(path: &Path) -> Result<(), AppError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::Operation(format!("cannot open dump for verification: {e}")))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::Operation(format!("cannot stat dump for verification: {e}")))?
        .len();

    if len == 0 {
        return Err(AppError::Operation("incomplete dump: file is empty".into()));
    }

    let window = MARKER_WINDOW.min(len) as usize;

    let mut head = vec![0u8; window];
    file.read_exact(&mut head)
        .await
        .map_err(|e| AppError::Operation(format!("cannot read dump for verification: {e}")))?;
    if !String::from_utf8_lossy(&head).contains(DUMP_START_MARKER) {
        return Err(AppError::Operation(
            "incomplete dump: start marker not found".into(),
        ));
    }

    file.seek(SeekFrom::Start(len - window as u64))
        .await
        .map_err(|e| AppError::Operation(format!("cannot read dump for verification: {e}")))?;
    let mut tail = vec![0u8; window];
    file.read_exact(&mut tail)
        .await
        .map_err(|e| AppError::Operation(format!("cannot read dump for verification: {e}")))?;
    if !String::from_utf8_lossy(&tail).contains(DUMP_END_MARKER) {
        return Err(AppError::Operation(
            "incomplete dump: end marker not found".into(),
        ));
    }

    Ok(())
}
