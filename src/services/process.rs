use std::process::{Output, Stdio};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of a tool invocation, decided once at the call site.
#[derive(Debug)]
pub enum ProcessOutcome {
    Completed(Output),
    TimedOut,
    Cancelled,
}

/// Runs a command to completion under a deadline and a cancellation token.
/// The child is spawned with `kill_on_drop`, so a timed-out or cancelled
/// invocation never leaves an orphaned subprocess behind.
pub async fn run_with_deadline(
    mut cmd: tokio::process::Command,
    deadline: Duration,
    cancel: &CancellationToken,
) -> std::io::Result<ProcessOutcome> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn()?;

    tokio::select! {
        _ = cancel.cancelled() => Ok(ProcessOutcome::Cancelled),
        res = tokio::time::timeout(deadline, child.wait_with_output()) => match res {
            Err(_) => Ok(ProcessOutcome::TimedOut),
            Ok(output) => Ok(ProcessOutcome::Completed(output?)),
        },
    }
}

/// Trimmed stderr for diagnostics; falls back to stdout when stderr is empty.
pub fn diagnostic_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    text.trim().to_string()
}
