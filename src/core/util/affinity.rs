//! Optional CPU core binding for worker threads.
//!
//! Pinning is a best-effort capability: on platforms or hosts where the
//! requested core cannot be resolved the binding is skipped with a warning
//! and the pipeline runs unpinned.

use tracing::{debug, warn};

/// Bind the current thread to the given core id. Returns `true` when the
/// binding took effect.
pub fn bind_current_thread(core_id: usize) -> bool {
    let Some(cores) = core_affinity::get_core_ids() else {
        warn!(core_id, "core enumeration unavailable, skipping affinity binding");
        return false;
    };
    match cores.into_iter().find(|c| c.id == core_id) {
        Some(core) => {
            let bound = core_affinity::set_for_current(core);
            if bound {
                debug!(core_id, "bound worker thread to core");
            } else {
                warn!(core_id, "failed to bind worker thread to core");
            }
            bound
        }
        None => {
            warn!(core_id, "core not present on this host, skipping affinity binding");
            false
        }
    }
}
