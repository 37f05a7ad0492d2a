use std::env;
use std::path::PathBuf;

use cluster_proto::ClusterConfig;
use tracing::warn;

pub const SOCKET_ENV: &str = "CLUSTER_SOCKET";
pub const MIN_INTERVAL_ENV: &str = "CLUSTER_MIN_INTERVAL_MS";
pub const IMAGE_ENV: &str = "CLUSTER_IMAGE";

const DEFAULT_MIN_INTERVAL_MS: u32 = 1000;
const DEFAULT_SOCKET_NAME: &str = "cluster-renderer.sock";

/// Geometry advertised by an image-capable cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
    pub width: u32,
    pub height: u32,
    pub color_depth_bits: u32,
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Path of the host's IPC socket
    pub socket: PathBuf,
    /// Minimum interval between cluster updates the demo renderer advertises
    pub min_interval_millis: u32,
    /// When set, the demo renderer advertises an image-capable cluster
    pub image: Option<ImageGeometry>,
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let socket = lookup(SOCKET_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.socket);

        let min_interval_millis = match lookup(MIN_INTERVAL_ENV) {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                warn!(target = "cluster::config", value = %raw, "invalid {MIN_INTERVAL_ENV}; using default");
                defaults.min_interval_millis
            }),
            None => defaults.min_interval_millis,
        };

        let image = lookup(IMAGE_ENV).and_then(|raw| {
            let parsed = parse_geometry(&raw)
                .filter(|geometry| geometry.to_cluster_config(min_interval_millis).is_some());
            if parsed.is_none() {
                warn!(target = "cluster::config", value = %raw, "invalid {IMAGE_ENV}; advertising enum-only cluster");
            }
            parsed
        });

        Self {
            socket,
            min_interval_millis,
            image,
        }
    }

    /// The configuration the demo renderer advertises.
    pub fn cluster_config(&self) -> ClusterConfig {
        self.image
            .and_then(|geometry| geometry.to_cluster_config(self.min_interval_millis))
            .unwrap_or_else(|| ClusterConfig::enum_only(self.min_interval_millis))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket: env::temp_dir().join(DEFAULT_SOCKET_NAME),
            min_interval_millis: DEFAULT_MIN_INTERVAL_MS,
            image: None,
        }
    }
}

impl ImageGeometry {
    fn to_cluster_config(self, min_interval_millis: u32) -> Option<ClusterConfig> {
        ClusterConfig::image_capable(
            min_interval_millis,
            self.width,
            self.height,
            self.color_depth_bits,
        )
        .ok()
    }
}

/// Parses `WIDTHxHEIGHTxDEPTH`, e.g. `800x480x16`.
fn parse_geometry(raw: &str) -> Option<ImageGeometry> {
    let mut parts = raw.trim().split(['x', 'X']).map(|part| part.trim().parse::<u32>());
    let geometry = ImageGeometry {
        width: parts.next()?.ok()?,
        height: parts.next()?.ok()?,
        color_depth_bits: parts.next()?.ok()?,
    };
    parts.next().is_none().then_some(geometry)
}
