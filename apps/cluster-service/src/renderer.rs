use cluster_proto::{Bundle, ClusterConfig};
use tracing::info;

/// What a host must provide to drive the cluster: its capabilities, and a
/// sink for navigation events.
///
/// Methods run on the host's dispatch thread, never on the client's.
pub trait NavigationRenderer: Send + Sync {
    fn navigation_properties(&self) -> ClusterConfig;

    /// Handles one navigation event. Errors are logged by the host and never
    /// reach the sender.
    fn on_event(&self, event_type: i32, payload: &Bundle) -> anyhow::Result<()>;
}

/// Renderer that advertises a fixed configuration and logs every event.
#[derive(Debug, Clone)]
pub struct LoggingRenderer {
    config: ClusterConfig,
}

impl LoggingRenderer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }
}

impl Default for LoggingRenderer {
    fn default() -> Self {
        Self::new(ClusterConfig::enum_only(1000))
    }
}

impl NavigationRenderer for LoggingRenderer {
    fn navigation_properties(&self) -> ClusterConfig {
        info!(target = "cluster::renderer", config = %self.config, "navigation properties requested");
        self.config.clone()
    }

    fn on_event(&self, event_type: i32, payload: &Bundle) -> anyhow::Result<()> {
        info!(
            target = "cluster::renderer",
            event_type,
            payload = %payload.summary(),
            "navigation event"
        );
        Ok(())
    }
}
