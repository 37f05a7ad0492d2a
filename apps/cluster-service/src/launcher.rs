use std::fmt;

use serde::Serialize;
use tracing::info;

/// Opaque identifier of a display, as reported by display enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DisplayId(pub i32);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display-{}", self.0)
    }
}

/// Starts the navigation rendering surface on a display. Fire and forget:
/// the host never learns whether the launch succeeded.
pub trait SurfaceLauncher: Send + Sync {
    fn launch_surface(&self, display_id: DisplayId);
}

/// Launcher for hosts without a real surface; records the request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLauncher;

impl SurfaceLauncher for LoggingLauncher {
    fn launch_surface(&self, display_id: DisplayId) {
        info!(target = "cluster::launcher", display = display_id.0, "launching cluster surface");
    }
}
