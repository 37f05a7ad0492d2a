use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::host::ClusterRenderingHost;
use crate::launcher::DisplayId;
use crate::proxy::{ConnectionHandle, Revoker};

/// Bridges display enumeration and host reachability to the host and its
/// clients.
///
/// Display notifications are deduplicated: the host hears about each
/// attach once, and detaching a display it never heard of is a no-op.
pub struct ConnectionSupervisor {
    host: Arc<ClusterRenderingHost>,
    attached: Mutex<BTreeSet<DisplayId>>,
    tracked: Mutex<Vec<Revoker>>,
}

impl ConnectionSupervisor {
    pub fn new(host: Arc<ClusterRenderingHost>) -> Self {
        Self {
            host,
            attached: Mutex::new(BTreeSet::new()),
            tracked: Mutex::new(Vec::new()),
        }
    }

    /// Returns whether the display was new.
    pub fn on_display_added(&self, display_id: DisplayId) -> bool {
        if !self.attached.lock().insert(display_id) {
            debug!(target = "cluster::supervisor", display = display_id.0, "duplicate attach ignored");
            return false;
        }
        self.host.on_display_attached(display_id);
        true
    }

    /// Returns whether the display was known.
    pub fn on_display_removed(&self, display_id: DisplayId) -> bool {
        if !self.attached.lock().remove(&display_id) {
            debug!(target = "cluster::supervisor", display = display_id.0, "detach of unknown display ignored");
            return false;
        }
        self.host.on_display_detached(display_id);
        true
    }

    pub fn on_display_changed(&self, display_id: DisplayId) {
        trace!(target = "cluster::supervisor", display = display_id.0, "display changed");
    }

    pub fn attached_displays(&self) -> Vec<DisplayId> {
        self.attached.lock().iter().copied().collect()
    }

    /// Revokes `handle` the next time the host is declared unreachable.
    pub fn track(&self, handle: &ConnectionHandle) {
        let mut tracked = self.tracked.lock();
        tracked.retain(|revoker| !revoker.is_revoked());
        tracked.push(handle.revoker());
    }

    /// Invalidates every tracked connection. Returns how many were live.
    pub fn on_host_unreachable(&self) -> usize {
        let revoked: Vec<Revoker> = std::mem::take(&mut *self.tracked.lock());
        let live = revoked.iter().filter(|revoker| !revoker.is_revoked()).count();
        for revoker in &revoked {
            revoker.revoke();
        }
        info!(target = "cluster::supervisor", connections = live, "host unreachable; connections revoked");
        live
    }
}
