//! User-initiated abort of a running conversion.

use crate::state::{ConversionStore, ProcessHandle};
use std::io;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AbortError {
    #[error("Conversion not found")]
    NotFound,
    #[error("Conversion is already complete")]
    AlreadyComplete,
    #[error("No running process found for conversion")]
    ProcessNotFound,
    #[error("Failed to terminate conversion process")]
    Signal(#[source] io::Error),
}

/// Abort a running conversion by signalling its encoder process.
///
/// The status is finalized here, not in the worker: the worker observes the
/// signal-induced exit afterwards and its error write loses to the completion
/// guard, so the abort outcome is what sticks.
pub fn abort_conversion(store: &Arc<ConversionStore>, id: &str) -> Result<(), AbortError> {
    let status = store.get_status(id).ok_or(AbortError::NotFound)?;
    if status.complete {
        return Err(AbortError::AlreadyComplete);
    }

    let handle = store
        .get_active_process(id)
        .ok_or(AbortError::ProcessNotFound)?;

    tracing::info!(conversion_id = %id, pid = handle.pid(), "Aborting conversion");

    if let Err(e) = handle.terminate() {
        if !ProcessHandle::already_exited(&e) {
            tracing::warn!(
                conversion_id = %id,
                "Graceful termination failed ({e}), forcing kill"
            );
            if let Err(e) = handle.force_kill() {
                if !ProcessHandle::already_exited(&e) {
                    store.update_status_with_error(id, "Failed to terminate conversion process");
                    return Err(AbortError::Signal(e));
                }
            }
        }
    }

    store.update_status_aborted(id);
    // The worker unregisters again once its wait unblocks; doing it here too
    // keeps the registry accurate the moment the abort returns.
    store.unregister_active_process(id);
    Ok(())
}
