//! Shutdown signalling for the listener, sessions, and background publishers.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long a drain waits before aborting what is left.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How tracked tasks ended during [`ShutdownCoordinator::graceful_shutdown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Finished on their own.
    pub completed: usize,
    /// Panicked or were cancelled elsewhere.
    pub failed: usize,
    /// Still running at the deadline and aborted.
    pub aborted: usize,
}

/// Root of the cancellation tree.
///
/// The listener watches the root token; each connection gets a child so it
/// can close alone while shutdown still reaches all of them.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh root token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token for one connection.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Cancel the root token. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
            self.token.cancel();
        }
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel everything, then give `handles` until one shared deadline to
    /// finish. Stragglers are aborted.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> DrainReport {
        self.shutdown();
        let timeout = timeout.unwrap_or(DRAIN_TIMEOUT);
        let deadline = Instant::now() + timeout;
        info!(
            task_count = handles.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining tasks"
        );

        let mut report = DrainReport::default();
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.completed += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "task failed during shutdown");
                    report.failed += 1;
                }
                Err(_) => {
                    handle.abort();
                    report.aborted += 1;
                }
            }
        }

        if report.aborted > 0 {
            warn!(aborted = report.aborted, "drain deadline passed");
        }
        info!(
            completed = report.completed,
            failed = report.failed,
            aborted = report.aborted,
            "drain finished"
        );
        report
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
