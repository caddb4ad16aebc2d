// Shutdown Token

use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    ///
    /// A dropped sender can never signal, so waiting then lasts forever.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token, including ones created later
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// A new token observing this sender
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();

        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .expect("token should observe shutdown");
        assert!(token.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_token_sees_earlier_shutdown() {
        let (tx, _token) = shutdown_channel();
        tx.shutdown();

        let mut late = tx.token();
        tokio::time::timeout(Duration::from_secs(1), late.wait())
            .await
            .expect("late token should observe shutdown");
    }

    #[tokio::test]
    async fn test_dropped_sender_never_signals() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);

        let waited = tokio::time::timeout(Duration::from_millis(50), token.wait()).await;
        assert!(waited.is_err());
        assert!(!token.is_shutdown());
    }
}
