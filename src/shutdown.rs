// Shutdown coordination
// Global flag plus a Ctrl+C listener that cancels the running command

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Set once the process has been asked to stop
static APP_SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Signal that the process is shutting down
pub fn signal_shutdown() {
    if !APP_SHUTTING_DOWN.swap(true, Ordering::SeqCst) {
        crate::info!("Shutdown signaled");
    }
}

/// True after `signal_shutdown()` has been called
pub fn is_shutting_down() -> bool {
    APP_SHUTTING_DOWN.load(Ordering::SeqCst)
}

/// Wait for Ctrl+C, then raise the flag and cancel `cancel`
///
/// Returns early without touching the flag if `cancel` fires first.
pub async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                crate::warn!("Cannot listen for Ctrl+C: {}", e);
                return;
            }
            signal_shutdown();
            cancel.cancel();
        }
    }
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    APP_SHUTTING_DOWN.store(false, Ordering::SeqCst);
}

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod tests;
