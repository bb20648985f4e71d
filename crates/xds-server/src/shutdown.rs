//! Graceful shutdown handling for the xDS server.
//!
//! Open discovery streams register with the [`ShutdownController`]. When
//! shutdown starts, every stream observes its [`ShutdownSignal`] and ends, and
//! the controller waits up to the grace period for them to finish before the
//! transport stops.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use xds_server::shutdown::ShutdownController;
//!
//! # tokio_test_block_on(async {
//! let controller = ShutdownController::new();
//! let signal = controller.shutdown_signal();
//!
//! assert!(controller.shutdown(Duration::from_millis(10)).await);
//! signal.wait().await;
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Controller for coordinating graceful shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    initiated: AtomicBool,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
    active_ops: AtomicUsize,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownInner {
                initiated: AtomicBool::new(false),
                tx,
                rx,
                active_ops: AtomicUsize::new(0),
            }),
        }
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.inner.initiated.load(Ordering::SeqCst)
    }

    /// Get a future that resolves when shutdown is initiated.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.inner.rx.clone(),
        }
    }

    /// Initiate graceful shutdown.
    ///
    /// Notifies every [`ShutdownSignal`], then waits for registered
    /// operations to finish. Returns `true` if all completed within
    /// `grace_period`, `false` if it timed out.
    pub async fn shutdown(&self, grace_period: Duration) -> bool {
        if self
            .inner
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return true;
        }

        info!(grace_period = ?grace_period, "initiating graceful shutdown");

        // Receivers live in `inner`, so send cannot fail.
        let _ = self.inner.tx.send(true);

        match timeout(grace_period, self.wait_for_completion()).await {
            Ok(()) => {
                info!("graceful shutdown completed");
                true
            }
            Err(_) => {
                warn!(
                    remaining_ops = self.active_operations(),
                    "graceful shutdown timed out, forcing shutdown"
                );
                false
            }
        }
    }

    async fn wait_for_completion(&self) {
        while self.active_operations() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Register an active operation.
    ///
    /// Returns a guard that decrements the counter when dropped.
    pub fn register_operation(&self) -> OperationGuard {
        self.inner.active_ops.fetch_add(1, Ordering::SeqCst);
        OperationGuard {
            controller: self.clone(),
        }
    }

    /// Get the number of active operations.
    pub fn active_operations(&self) -> usize {
        self.inner.active_ops.load(Ordering::SeqCst)
    }
}

/// Guard for tracking an active operation.
#[derive(Debug)]
pub struct OperationGuard {
    controller: ShutdownController,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.controller.inner.active_ops.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Future that resolves when shutdown is initiated.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn wait(mut self) {
        // A closed channel means the controller is gone: treat as shutdown.
        let _ = self.rx.wait_for(|down| *down).await;
    }
}

/// Wait for OS shutdown signals (SIGTERM, SIGINT).
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM"),
                    _ = sigint.recv() => info!("received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "failed to install signal handlers, falling back to ctrl-c");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C"),
        Err(e) => {
            error!(error = %e, "failed to listen for ctrl-c, shutdown only on request");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_controller_creation() {
        let controller = ShutdownController::new();
        assert!(!controller.is_shutdown());
        assert_eq!(controller.active_operations(), 0);
    }

    #[test]
    fn operation_tracking() {
        let controller = ShutdownController::new();

        {
            let _guard1 = controller.register_operation();
            assert_eq!(controller.active_operations(), 1);

            let _guard2 = controller.register_operation();
            assert_eq!(controller.active_operations(), 2);
        }

        assert_eq!(controller.active_operations(), 0);
    }

    #[tokio::test]
    async fn shutdown_signal_fires() {
        let controller = ShutdownController::new();
        let signal = controller.shutdown_signal();

        let controller_clone = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            controller_clone.shutdown(Duration::from_millis(100)).await;
        });

        signal.wait().await;
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn shutdown_waits_for_operations() {
        let controller = ShutdownController::new();
        let guard = controller.register_operation();

        let controller_clone = controller.clone();
        let handle =
            tokio::spawn(async move { controller_clone.shutdown(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(guard);

        assert!(handle.await.expect("shutdown task should complete"));
    }

    #[tokio::test]
    async fn shutdown_times_out() {
        let controller = ShutdownController::new();
        let _guard = controller.register_operation();

        assert!(!controller.shutdown(Duration::from_millis(50)).await);
        // A second call is a no-op.
        assert!(controller.shutdown(Duration::from_millis(50)).await);
    }
}
