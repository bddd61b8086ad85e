use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Process-wide stop signal shared by the scheduler, the flush task and
/// the message pump.
#[derive(Debug, Clone)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token that background tasks watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Cancel on Ctrl+C, or SIGTERM on unix.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = signal::ctrl_c() => {
                    tracing::info!("received Ctrl+C, shutting down");
                }
                _ = terminate() => {
                    tracing::info!("received SIGTERM, shutting down");
                }
            }
            token.cancel();
        });
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            let _ = sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_every_token() {
        let guard = ShutdownGuard::new();
        let a = guard.token();
        let b = guard.clone().token();
        assert!(!guard.is_triggered());
        guard.trigger();
        a.cancelled().await;
        assert!(b.is_cancelled());
        guard.wait().await;
    }
}
