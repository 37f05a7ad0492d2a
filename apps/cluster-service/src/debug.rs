//! Typed diagnostic commands run against a live host.

use std::sync::Arc;

use clap::Subcommand;
use cluster_proto::{ActivityPlacementState, InvalidConfiguration, Rect};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use crate::host::ClusterRenderingHost;
use crate::input::emulate_press;
use crate::proxy::ActivityStateTarget;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    /// Emulate a single press (down then up) of a key
    InjectKey {
        #[arg(value_name = "KEY_CODE")]
        key_code: i32,
    },
    /// Create overlay displays from a spec such as "1280x720/160"
    CreateOverlayDisplay {
        #[arg(value_name = "SPEC")]
        spec: String,
    },
    /// Remove every overlay display
    DestroyOverlayDisplay,
    /// Report an activity as unobscured within the given rectangle
    SetUnobscuredArea {
        category: String,
        #[arg(allow_negative_numbers = true)]
        left: i32,
        #[arg(allow_negative_numbers = true)]
        top: i32,
        #[arg(allow_negative_numbers = true)]
        right: i32,
        #[arg(allow_negative_numbers = true)]
        bottom: i32,
    },
}

/// Simulated displays layered over the main screen.
pub trait OverlayDisplays: Send + Sync {
    /// Replaces the overlay configuration. An empty spec removes all overlays.
    fn set_overlay_devices(&self, spec: &str) -> anyhow::Result<()>;
}

/// Keeps the overlay spec in memory and logs changes.
#[derive(Debug, Default)]
pub struct InMemoryOverlays {
    spec: Mutex<String>,
}

impl InMemoryOverlays {
    pub fn current(&self) -> String {
        self.spec.lock().clone()
    }
}

impl OverlayDisplays for InMemoryOverlays {
    fn set_overlay_devices(&self, spec: &str) -> anyhow::Result<()> {
        info!(target = "cluster::debug", spec, "overlay displays updated");
        *self.spec.lock() = spec.to_owned();
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("invalid unobscured area: {0}")]
    InvalidArea(#[from] InvalidConfiguration),
    #[error("overlay display update failed: {0}")]
    Overlay(String),
}

pub struct DebugConsole {
    host: Arc<ClusterRenderingHost>,
    overlays: Arc<dyn OverlayDisplays>,
    activity_state: Arc<dyn ActivityStateTarget>,
}

impl DebugConsole {
    pub fn new(
        host: Arc<ClusterRenderingHost>,
        overlays: Arc<dyn OverlayDisplays>,
        activity_state: Arc<dyn ActivityStateTarget>,
    ) -> Self {
        Self {
            host,
            overlays,
            activity_state,
        }
    }

    pub fn execute(&self, command: DebugCommand) -> Result<(), DebugError> {
        info!(target = "cluster::debug", ?command, "executing debug command");
        match command {
            DebugCommand::InjectKey { key_code } => {
                for event in emulate_press(key_code) {
                    self.host.on_key_event(&event);
                }
            }
            DebugCommand::CreateOverlayDisplay { spec } => self
                .overlays
                .set_overlay_devices(&spec)
                .map_err(overlay_error)?,
            DebugCommand::DestroyOverlayDisplay => self
                .overlays
                .set_overlay_devices("")
                .map_err(overlay_error)?,
            DebugCommand::SetUnobscuredArea {
                category,
                left,
                top,
                right,
                bottom,
            } => {
                let area = Rect::new(left, top, right, bottom)?;
                let state = ActivityPlacementState::create(true, area);
                if let Err(err) = self.activity_state.set_activity_state(&category, state) {
                    info!(target = "cluster::debug", %category, error = %err, "failed to set activity state");
                }
            }
        }
        Ok(())
    }
}

fn overlay_error(err: anyhow::Error) -> DebugError {
    DebugError::Overlay(format!("{err:#}"))
}
