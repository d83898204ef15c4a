// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Graceful-shutdown plumbing shared by the process entry points:
//!
//! - [`CancellationToken`] - clone-able token propagated to async tasks
//! - [`ShutdownCoordinator`] - initiates shutdown (on signal or request)
//!   and enforces a grace period before the process gives up waiting
//!
//! Workers own their stop channels; the coordinator merely cancels the
//! root token they derive from.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Default grace period for graceful shutdown.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Clone-able cancellation token for signalling shutdown to async tasks.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Cancels this token and wakes every waiter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Checks cancellation without blocking.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Waits until the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

/// Coordinates graceful shutdown across application components.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace_period,
        }
    }

    /// The root token components derive their cancellation from.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiates shutdown by cancelling the root token.
    pub fn initiate_shutdown(&self) {
        info!("shutdown initiated");
        self.token.cancel();
    }

    /// Blocks until SIGINT/SIGTERM, then initiates shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!(signal = "SIGINT", "shutdown signal received"),
                _ = term.recv() => info!(signal = "SIGTERM", "shutdown signal received"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!(signal = "ctrl-c", "shutdown signal received");
        }

        self.initiate_shutdown();
    }

    /// Gives `wait` up to the grace period to finish, logging on overrun.
    pub async fn wait_with_grace<F>(&self, wait: F)
    where
        F: std::future::Future<Output = ()>,
    {
        if tokio::time::timeout(self.grace_period, wait).await.is_err() {
            warn!(
                grace_period_secs = self.grace_period.as_secs(),
                "grace period expired before components quiesced"
            );
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_cancel_wakes_waiters() {
        let coordinator = ShutdownCoordinator::default();
        let token = coordinator.token();

        let waiter = tokio::spawn({
            let token = token.clone();
            async move {
                token.cancelled().await;
                true
            }
        });

        coordinator.initiate_shutdown();
        assert!(waiter.await.unwrap());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await; // returns immediately
    }

    #[tokio::test]
    async fn grace_period_logs_on_overrun() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        coordinator
            .wait_with_grace(tokio::time::sleep(Duration::from_millis(50)))
            .await;
    }
}
