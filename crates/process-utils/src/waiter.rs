//! Exit-status reporting for spawned children.

use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// How a waited-on child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own. `None` means it was terminated by a signal.
    Exited(Option<i32>),
    /// The cancellation token fired and the process was killed.
    Cancelled,
    /// Waiting on the process failed.
    WaitFailed(String),
}

impl ExitOutcome {
    /// `true` only for a zero exit code.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(Some(0)))
    }

    /// Human-readable description for error reporting.
    pub fn describe(&self) -> String {
        match self {
            Self::Exited(Some(code)) => format!("exited with code {code}"),
            Self::Exited(None) => "terminated by signal".to_string(),
            Self::Cancelled => "cancelled".to_string(),
            Self::WaitFailed(e) => format!("wait failed: {e}"),
        }
    }
}

/// Spawn a task that waits for `child` to exit and reports the outcome.
///
/// If `cancellation_token` fires first, the child is killed and
/// [`ExitOutcome::Cancelled`] is sent.
pub fn spawn_process_waiter(
    mut child: Child,
    cancellation_token: CancellationToken,
) -> oneshot::Receiver<ExitOutcome> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let outcome = tokio::select! {
            _ = cancellation_token.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill cancelled process");
                }
                ExitOutcome::Cancelled
            }
            status = child.wait() => {
                match status {
                    Ok(exit_status) => {
                        let code = exit_status.code();
                        if let Some(c) = code
                            && c != 0
                        {
                            warn!("Process exited with code: {}", c);
                        }
                        ExitOutcome::Exited(code)
                    }
                    Err(e) => {
                        error!("Error waiting for process: {}", e);
                        ExitOutcome::WaitFailed(e.to_string())
                    }
                }
            }
        };
        let _ = tx.send(outcome);
    });

    rx
}
