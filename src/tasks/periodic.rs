//! Periodic Task
//!
//! Background loop that fires a maintenance closure on a fixed interval.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle to a running periodic task.
///
/// Stopping is idempotent, and dropping the handle stops the task.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    // == Stop ==
    /// Stops the task. Returns `true` only for the call that actually stopped it.
    pub fn stop(&self) -> bool {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => {
                handle.abort();
                info!("{} task stopped", self.name);
                true
            }
            None => false,
        }
    }

    // == Is Running ==
    /// Returns true until the task has been stopped or has exited.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Name used in log lines.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        let handle = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Spawns a task that runs `tick` every `period`.
///
/// `tick` returns how many items it touched; non-zero counts are logged at
/// info level, zero at debug.
///
/// # Example
/// ```ignore
/// let task = spawn_periodic("nonce sweep", Duration::from_secs(60), move || {
///     let ledger = ledger.clone();
///     async move { ledger.write().await.sweep_expired() }
/// });
/// // Later, during shutdown:
/// task.stop();
/// ```
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> PeriodicTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = usize> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        info!("Starting {} task with interval of {:?}", name, period);

        loop {
            tokio::time::sleep(period).await;

            let touched = tick().await;

            if touched > 0 {
                info!("{}: {} item(s) processed", name, touched);
            } else {
                debug!("{}: nothing to do", name);
            }
        }
    });

    PeriodicTask {
        name,
        handle: Mutex::new(Some(handle)),
    }
}
